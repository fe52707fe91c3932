// Host loop: walk the server list, attach each source and watch it until it
// proves healthy, fails or runs out of time.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use playgate_engine::{
    EndpointResolver, EngineEvent, EngineFactory, PlaybackPath, ProbeTransport, Server,
    ServerManager, ServerStatus, SessionState, StreamSession,
};
use tracing::{error, info, warn};

use crate::surface::HeadlessSurface;

pub struct WatchOptions {
    /// Fragments to load while healthy before a server is accepted
    pub segments: u64,
    /// Time a server gets to reach the threshold
    pub deadline: Duration,
    /// Delivery proxy endpoints for proxied servers
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Reached the fragment threshold, or bound for native playback
    Healthy,
    /// Presentation ended while healthy
    Finished,
    Failed,
    TimedOut,
    Interrupted,
}

impl WatchOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, WatchOutcome::Healthy | WatchOutcome::Finished)
    }
}

/// Try servers in order until one succeeds.
///
/// Returns the index of the server the walk stopped on and why, or `None`
/// once every server has failed.
pub async fn watch_servers<F, T>(
    session: &mut StreamSession<F, HeadlessSurface>,
    servers: &Mutex<ServerManager>,
    resolver: &EndpointResolver<T>,
    options: &WatchOptions,
) -> Option<(usize, WatchOutcome)>
where
    F: EngineFactory,
    T: ProbeTransport,
{
    loop {
        let next = servers.lock().next_candidate().cloned();
        let Some(server) = next else {
            let count = servers.lock().count();
            error!(servers = count, "Every server failed");
            return None;
        };
        let index = server.source.server_index;

        let outcome = watch_server(session, &server, resolver, options).await;
        info!(server_index = index, server = %server.name, ?outcome, "Server watch finished");

        if outcome.is_success() || outcome == WatchOutcome::Interrupted {
            session.detach();
            return Some((index, outcome));
        }

        // attach rejections and timeouts are not reported by the session
        session.detach();
        servers.lock().update_status(index, ServerStatus::Failed);
    }
}

async fn watch_server<F, T>(
    session: &mut StreamSession<F, HeadlessSurface>,
    server: &Server,
    resolver: &EndpointResolver<T>,
    options: &WatchOptions,
) -> WatchOutcome
where
    F: EngineFactory,
    T: ProbeTransport,
{
    let index = server.source.server_index;
    let source = if server.proxied {
        let target = &server.source.link;
        match resolver.resolve(target, &options.endpoints).await.into_endpoint() {
            Some(endpoint) => server
                .source
                .with_link(resolver.proxied_url(&endpoint, target)),
            None => {
                warn!(server_index = index, "No delivery endpoint for server");
                return WatchOutcome::Failed;
            }
        }
    } else {
        server.source.clone()
    };

    info!(server_index = index, server = %server.name, url = %source.link, "Attaching");
    if let Err(e) = session.attach(source) {
        warn!(server_index = index, error = %e, "Attach rejected");
        return WatchOutcome::Failed;
    }
    if session.playback_path() != Some(PlaybackPath::Adaptive) {
        return WatchOutcome::Healthy;
    }

    let started = Instant::now();
    let deadline = tokio::time::sleep(options.deadline);
    tokio::pin!(deadline);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut loaded: u64 = 0;

    loop {
        tokio::select! {
            event = session.next_event() => {
                let Some(event) = event else {
                    return match session.state() {
                        SessionState::Healthy => WatchOutcome::Finished,
                        _ => WatchOutcome::Failed,
                    };
                };
                let fragment = matches!(event, EngineEvent::FragmentLoaded { .. });
                session.handle_event(event);

                match session.state() {
                    SessionState::Failed => return WatchOutcome::Failed,
                    SessionState::Healthy if fragment => {
                        loaded += 1;
                        info!(
                            server_index = index,
                            loaded,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Fragment loaded"
                        );
                        if loaded >= options.segments {
                            return WatchOutcome::Healthy;
                        }
                    }
                    _ => {}
                }
            }
            _ = &mut deadline => {
                warn!(server_index = index, loaded, "Server did not become healthy in time");
                return WatchOutcome::TimedOut;
            }
            _ = &mut interrupt => {
                info!("Interrupted");
                return WatchOutcome::Interrupted;
            }
        }
    }
}
