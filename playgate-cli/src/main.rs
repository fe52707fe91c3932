use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use error::AppError;
use parking_lot::Mutex;
use playgate_engine::{
    EndpointResolver, HeadlessHlsFactory, HttpConfig, HttpProbeTransport, OutboundProxy,
    ProxyConfig, ResolverConfig, ServerManager, ServerStatus, SessionConfig, Source,
    StatusCallback, StreamSession,
};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cli;
mod error;
mod surface;
mod utils;
mod watch;

use cli::CliArgs;
use surface::HeadlessSurface;
use watch::{WatchOptions, WatchOutcome, watch_servers};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("playgate.log")?;

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("playgate {}", env!("CARGO_PKG_VERSION"));

    let http_config = HttpConfig::builder()
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_headers(crate::utils::parse_headers(&args.headers))
        .with_outbound_proxy(outbound_proxy(&args))
        .build();

    let session_config = SessionConfig::builder()
        .with_load_timeout(Duration::from_secs(args.load_timeout))
        .with_fragment_timeout(Duration::from_secs(args.fragment_timeout))
        .with_preferred_audio_language(args.audio_lang.clone())
        .with_segment_retry_limit(args.segment_retries)
        .build();

    let resolver = EndpointResolver::with_config(
        HttpProbeTransport::from_config(&http_config)?,
        ResolverConfig {
            probe_timeout: Duration::from_secs(args.probe_timeout),
            ..ResolverConfig::default()
        },
    );

    let servers = Arc::new(Mutex::new(ServerManager::new()));
    {
        let mut manager = servers.lock();
        for (i, link) in args.servers.iter().enumerate() {
            manager.add_server(
                format!("server-{}", i + 1),
                Source::new(link.clone(), args.kind, 0),
                !args.proxies.is_empty(),
            );
        }
    }
    info!(
        servers = args.servers.len(),
        proxies = args.proxies.len(),
        kind = %args.kind,
        "Watching stream"
    );

    let on_status: StatusCallback = {
        let servers = servers.clone();
        Arc::new(move |index: usize, status: ServerStatus| {
            servers.lock().update_status(index, status);
        })
    };

    let mut session = StreamSession::new(
        HeadlessHlsFactory::from_config(&http_config)?,
        HeadlessSurface::default(),
        session_config,
    )
    .with_status_callback(on_status);
    session.set_quality(args.quality);

    let options = WatchOptions {
        segments: args.segments,
        deadline: Duration::from_secs(args.watch_timeout),
        endpoints: args.proxies.clone(),
    };

    let result = watch_servers(&mut session, &servers, &resolver, &options).await;

    for server in servers.lock().servers() {
        info!(server = %server.name, url = %server.source.link, status = ?server.status);
    }

    match result {
        Some((index, WatchOutcome::Interrupted)) => {
            info!(server_index = index, "Stopped by user");
            Ok(())
        }
        Some((index, outcome)) => {
            info!(server_index = index, ?outcome, "Stream is playable");
            Ok(())
        }
        None => Err(AppError::AllServersFailed(args.servers.len())),
    }
}

fn outbound_proxy(args: &CliArgs) -> OutboundProxy {
    let Some(url) = args.http_proxy.as_ref() else {
        return if args.no_system_proxy {
            OutboundProxy::Direct
        } else {
            OutboundProxy::System
        };
    };

    let proxy = ProxyConfig::new(url.clone(), args.http_proxy_type);
    match (&args.proxy_user, &args.proxy_pass) {
        (Some(username), Some(password)) => {
            OutboundProxy::Explicit(proxy.with_auth(username.clone(), password.clone()))
        }
        (None, None) => OutboundProxy::Explicit(proxy),
        _ => {
            warn!("Proxy credentials need both --proxy-user and --proxy-pass, ignoring them");
            OutboundProxy::Explicit(proxy)
        }
    }
}
