use reqwest::{Client, Proxy};
use tracing::{debug, info};

use crate::{HttpConfig, OutboundProxy, PlaygateError, ProxyConfig, ProxyScheme};

/// Create a reqwest Client with the provided configuration.
///
/// No overall timeout is set on the client: every request carries its own
/// bound (probe timeout, manifest/level/fragment load timeout).
pub fn create_client(config: &HttpConfig) -> Result<Client, PlaygateError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder = match &config.outbound_proxy {
        OutboundProxy::System => {
            debug!("Using system proxy settings");
            client_builder
        }
        OutboundProxy::Direct => {
            debug!("Outbound proxy disabled");
            client_builder.no_proxy()
        }
        OutboundProxy::Explicit(proxy) => {
            info!(
                proxy_url = %proxy.url,
                scheme = %proxy.scheme,
                has_auth = proxy.auth.is_some(),
                "Using outbound proxy"
            );
            client_builder.proxy(outbound_proxy(proxy)?)
        }
    };

    client_builder.build().map_err(PlaygateError::from)
}

fn outbound_proxy(config: &ProxyConfig) -> Result<Proxy, PlaygateError> {
    let endpoint = config.endpoint();
    let proxy = match config.scheme {
        ProxyScheme::Http => Proxy::http(&endpoint),
        ProxyScheme::Https => Proxy::https(&endpoint),
        ProxyScheme::Socks5 => Proxy::all(&endpoint),
    }
    .map_err(|e| {
        PlaygateError::ProxyError(format!("{} proxy '{}': {e}", config.scheme, config.url))
    })?;

    Ok(match &config.auth {
        Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
        None => proxy,
    })
}
