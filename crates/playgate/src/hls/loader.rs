// Resource loading for the headless engine: per-class timeouts and retry budgets.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use m3u8_rs::ByteRange;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::EngineConfig;
use crate::events::{EngineError, ErrorDetails, ErrorType};

const RETRY_DELAY_BASE: Duration = Duration::from_millis(500);

/// What kind of resource a request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    Manifest,
    Level,
    Key,
    Fragment,
}

impl ResourceClass {
    fn load_error(self) -> ErrorDetails {
        match self {
            ResourceClass::Manifest => ErrorDetails::ManifestLoadError,
            ResourceClass::Level => ErrorDetails::LevelLoadError,
            ResourceClass::Key => ErrorDetails::KeyLoadError,
            ResourceClass::Fragment => ErrorDetails::FragLoadError,
        }
    }

    fn load_timeout(self) -> ErrorDetails {
        match self {
            ResourceClass::Manifest => ErrorDetails::ManifestLoadTimeout,
            ResourceClass::Level => ErrorDetails::LevelLoadTimeout,
            ResourceClass::Key => ErrorDetails::KeyLoadTimeout,
            ResourceClass::Fragment => ErrorDetails::FragLoadTimeout,
        }
    }

    fn timeout(self, config: &EngineConfig) -> Duration {
        match self {
            ResourceClass::Manifest => config.manifest_loading_timeout,
            ResourceClass::Level => config.level_loading_timeout,
            // keys share the fragment budget
            ResourceClass::Key | ResourceClass::Fragment => config.frag_loading_timeout,
        }
    }

    fn max_retry(self, config: &EngineConfig) -> u32 {
        match self {
            ResourceClass::Manifest => config.manifest_loading_max_retry,
            ResourceClass::Level => config.level_loading_max_retry,
            ResourceClass::Key | ResourceClass::Fragment => config.frag_loading_max_retry,
        }
    }
}

/// Fetches the resources a playback pipeline needs.
///
/// Failures come back already shaped as fatal network engine errors.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(
        &self,
        class: ResourceClass,
        url: &Url,
        byte_range: Option<&ByteRange>,
    ) -> Result<Bytes, EngineError>;
}

/// `Range` header value for an `EXT-X-BYTERANGE`.
///
/// Expects the offset already resolved (see [`super::playlist::fragments`]);
/// a missing one reads from the start of the resource.
pub fn range_header(range: &ByteRange) -> String {
    let start = range.offset.unwrap_or(0);
    format!("bytes={}-{}", start, start + range.length.saturating_sub(1))
}

/// Send the request; a non-2xx status is returned as the inner error
async fn read_body(
    request: reqwest::RequestBuilder,
) -> Result<Result<Bytes, StatusCode>, reqwest::Error> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Ok(Err(status));
    }
    Ok(Ok(response.bytes().await?))
}

/// Backoff before the attempt following `attempts` failures
fn retry_delay(attempts: u32) -> Duration {
    let factor = 2_u32
        .checked_pow(attempts.saturating_sub(1))
        .unwrap_or(u32::MAX);
    RETRY_DELAY_BASE.saturating_mul(factor)
}

pub struct HttpLoader {
    http_client: Client,
    config: EngineConfig,
}

impl HttpLoader {
    pub fn new(http_client: Client, config: EngineConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    async fn fetch_once(
        &self,
        class: ResourceClass,
        url: &Url,
        byte_range: Option<&ByteRange>,
    ) -> Result<Bytes, EngineError> {
        let mut request = self.http_client.get(url.clone());
        if let Some(range) = byte_range {
            request = request.header(reqwest::header::RANGE, range_header(range));
        }

        let timeout = class.timeout(&self.config);
        let fetch = read_body(request);

        let fail = |details: ErrorDetails, reason: String| {
            EngineError::fatal(ErrorType::Network, details)
                .with_url(url.as_str())
                .with_reason(reason)
        };

        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(Ok(bytes))) => Ok(bytes),
            Ok(Ok(Err(status))) => Err(fail(class.load_error(), format!("HTTP {status}"))),
            Ok(Err(e)) if e.is_timeout() => Err(fail(class.load_timeout(), e.to_string())),
            Ok(Err(e)) => Err(fail(class.load_error(), e.to_string())),
            Err(_) => Err(fail(
                class.load_timeout(),
                format!("no response within {timeout:?}"),
            )),
        }
    }
}

#[async_trait]
impl ResourceLoader for HttpLoader {
    async fn load(
        &self,
        class: ResourceClass,
        url: &Url,
        byte_range: Option<&ByteRange>,
    ) -> Result<Bytes, EngineError> {
        let max_retry = class.max_retry(&self.config);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.fetch_once(class, url, byte_range).await {
                Ok(bytes) => {
                    debug!("Loaded {:?} {} ({} bytes)", class, url, bytes.len());
                    return Ok(bytes);
                }
                Err(e) if attempts > max_retry => return Err(e),
                Err(e) => {
                    warn!(
                        "{:?} load attempt {}/{} failed: {}",
                        class,
                        attempts,
                        max_retry + 1,
                        e
                    );
                }
            }

            tokio::time::sleep(retry_delay(attempts)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header() {
        let range = ByteRange {
            length: 1000,
            offset: Some(500),
        };
        assert_eq!(range_header(&range), "bytes=500-1499");
    }

    #[test]
    fn test_range_headers_for_consecutive_sub_ranges() {
        let playlist = "#EXTM3U
#EXT-X-TARGETDURATION:6
#EXTINF:6.0,
#EXT-X-BYTERANGE:1000@0
all.ts
#EXTINF:6.0,
#EXT-X-BYTERANGE:1000
all.ts
#EXTINF:6.0,
#EXT-X-BYTERANGE:1000
all.ts
#EXT-X-ENDLIST
";
        let media = super::super::playlist::parse_media_playlist(playlist.as_bytes()).unwrap();
        let base = Url::parse("https://cdn.example/vod/index.m3u8").unwrap();
        let headers: Vec<String> = super::super::playlist::fragments(&media, &base)
            .iter()
            .filter_map(|f| f.byte_range.as_ref().map(range_header))
            .collect();

        assert_eq!(
            headers,
            vec!["bytes=0-999", "bytes=1000-1999", "bytes=2000-2999"]
        );
    }

    #[test]
    fn test_retry_delay_saturates() {
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(3), Duration::from_secs(2));
        assert_eq!(retry_delay(40), RETRY_DELAY_BASE.saturating_mul(u32::MAX));
        assert_eq!(retry_delay(u32::MAX), RETRY_DELAY_BASE.saturating_mul(u32::MAX));
    }

    #[test]
    fn test_class_mapping() {
        let config = EngineConfig {
            frag_loading_timeout: Duration::from_secs(4),
            frag_loading_max_retry: 2,
            ..EngineConfig::default()
        };

        assert_eq!(
            ResourceClass::Fragment.load_timeout(),
            ErrorDetails::FragLoadTimeout
        );
        assert_eq!(ResourceClass::Key.load_error(), ErrorDetails::KeyLoadError);
        assert_eq!(
            ResourceClass::Manifest.load_error(),
            ErrorDetails::ManifestLoadError
        );
        assert_eq!(ResourceClass::Key.timeout(&config), Duration::from_secs(4));
        assert_eq!(
            ResourceClass::Level.timeout(&config),
            Duration::from_secs(8)
        );
        assert_eq!(ResourceClass::Fragment.max_retry(&config), 2);
        assert_eq!(ResourceClass::Manifest.max_retry(&config), 0);
    }
}
