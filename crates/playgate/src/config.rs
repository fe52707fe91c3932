use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Language tag preferred when picking an audio rendition
pub const DEFAULT_AUDIO_LANGUAGE: &str = "en";

/// Query parameter the delivery proxies read the target URL from
pub const DEFAULT_PROXY_QUERY_PARAM: &str = "m3u8-proxy";

/// HTTP client options shared by endpoint probing and the headless engine
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    pub outbound_proxy: OutboundProxy,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HttpConfig::get_default_headers(),
            outbound_proxy: OutboundProxy::System,
        }
    }
}

impl HttpConfig {
    pub fn builder() -> crate::builder::HttpConfigBuilder {
        crate::builder::HttpConfigBuilder::new()
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("*/*"),
        );

        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );
        default_headers
    }
}

/// How the HTTP client reaches the network.
///
/// Unrelated to delivery endpoints, which fetch media on the client's
/// behalf (see [`crate::resolver`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutboundProxy {
    /// Proxies from the environment (`HTTPS_PROXY` and friends)
    #[default]
    System,
    /// Connect directly, ignoring the environment
    Direct,
    Explicit(ProxyConfig),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ProxyScheme {
    /// Proxies plain `http://` requests only
    #[default]
    Http,
    /// Proxies `https://` requests only
    Https,
    /// Tunnels every request
    Socks5,
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyScheme::Http => f.write_str("http"),
            ProxyScheme::Https => f.write_str("https"),
            ProxyScheme::Socks5 => f.write_str("socks5"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// e.g. `http://proxy.example.com:8080`, or `host:port` for SOCKS5
    pub url: String,
    pub scheme: ProxyScheme,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>, scheme: ProxyScheme) -> Self {
        Self {
            url: url.into(),
            scheme,
            auth: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(ProxyAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Proxy URL as handed to the client; bare SOCKS5 `host:port` gets its scheme
    pub fn endpoint(&self) -> String {
        match self.scheme {
            ProxyScheme::Socks5 if !self.url.contains("://") => format!("socks5://{}", self.url),
            _ => self.url.clone(),
        }
    }
}

/// Knobs handed to the playback engine when a session builds one.
///
/// Retry counts default to zero: the session owns retry policy, so the
/// engine must surface every load failure instead of retrying on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub manifest_loading_max_retry: u32,
    pub level_loading_max_retry: u32,
    pub frag_loading_max_retry: u32,

    pub manifest_loading_timeout: Duration,
    pub level_loading_timeout: Duration,
    pub frag_loading_timeout: Duration,

    /// How much already played media the engine keeps buffered
    pub back_buffer_length: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manifest_loading_max_retry: 0,
            level_loading_max_retry: 0,
            frag_loading_max_retry: 0,
            manifest_loading_timeout: Duration::from_secs(8),
            level_loading_timeout: Duration::from_secs(8),
            frag_loading_timeout: Duration::from_secs(8),
            back_buffer_length: Duration::from_secs(90),
        }
    }
}

/// Stream session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    pub preferred_audio_language: String,
    /// Number of fragment reloads allowed per attachment before failing
    pub segment_retry_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            preferred_audio_language: DEFAULT_AUDIO_LANGUAGE.to_owned(),
            segment_retry_limit: 1,
        }
    }
}

impl SessionConfig {
    pub fn builder() -> crate::builder::SessionConfigBuilder {
        crate::builder::SessionConfigBuilder::new()
    }
}

/// Endpoint resolver configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Upper bound for a single probe
    pub probe_timeout: Duration,
    pub query_param: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            query_param: DEFAULT_PROXY_QUERY_PARAM.to_owned(),
        }
    }
}
