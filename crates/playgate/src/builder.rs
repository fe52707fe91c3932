//! # Configuration builders
//!
//! Fluent builders for [`HttpConfig`] and [`SessionConfig`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use playgate_engine::{HttpConfig, OutboundProxy, ProxyConfig, ProxyScheme, SessionConfig};
//!
//! let http = HttpConfig::builder()
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_header("Referer", "https://example.com")
//!     .with_outbound_proxy(OutboundProxy::Explicit(ProxyConfig::new(
//!         "127.0.0.1:1080",
//!         ProxyScheme::Socks5,
//!     )))
//!     .build();
//!
//! let session = SessionConfig::builder()
//!     .with_load_timeout(Duration::from_secs(6))
//!     .with_preferred_audio_language("de")
//!     .build();
//! # let _ = (http, session);
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::{HttpConfig, OutboundProxy, SessionConfig};

/// Builder for [`HttpConfig`]
#[derive(Debug, Clone, Default)]
pub struct HttpConfigBuilder {
    config: HttpConfig,
}

impl HttpConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set one header; names or values that are not valid HTTP are skipped
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (name.parse::<HeaderName>(), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.config.headers.insert(name, value);
            }
            _ => tracing::warn!(header = name, "Skipping invalid header"),
        }
        self
    }

    /// Overlay `headers` on the defaults. Every value given for a name replaces
    /// the default one; repeated names are all kept.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for name in headers.keys() {
            self.config.headers.remove(name);
        }
        for (name, value) in &headers {
            self.config.headers.append(name.clone(), value.clone());
        }
        self
    }

    pub fn with_outbound_proxy(mut self, outbound_proxy: OutboundProxy) -> Self {
        self.config.outbound_proxy = outbound_proxy;
        self
    }

    pub fn build(self) -> HttpConfig {
        self.config
    }
}

/// Builder for [`SessionConfig`]
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
        }
    }

    /// Set the manifest, level and fragment load timeouts at once
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.manifest_loading_timeout = timeout;
        self.config.engine.level_loading_timeout = timeout;
        self.config.engine.frag_loading_timeout = timeout;
        self
    }

    pub fn with_fragment_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.frag_loading_timeout = timeout;
        self
    }

    pub fn with_back_buffer(mut self, length: Duration) -> Self {
        self.config.engine.back_buffer_length = length;
        self
    }

    pub fn with_preferred_audio_language(mut self, lang: impl Into<String>) -> Self {
        self.config.preferred_audio_language = lang.into();
        self
    }

    pub fn with_segment_retry_limit(mut self, limit: u32) -> Self {
        self.config.segment_retry_limit = limit;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
