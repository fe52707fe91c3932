use clap::Parser;
use playgate_engine::{DeliveryKind, ProxyScheme};

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Watch a stream across fallback servers",
    long_about = "Attaches a stream from each server in order until one plays.\n\
                  \n\
                  Adaptive (HLS) sources are walked by a headless engine: manifest,\n\
                  playlists and fragments are fetched and checked, nothing is decoded.\n\
                  When delivery proxies are given, each source is routed through the\n\
                  first proxy that answers."
)]
pub struct CliArgs {
    /// Source URLs, in priority order
    #[arg(
        short = 's',
        long = "server",
        required = true,
        value_name = "URL",
        help = "Source URL of a server (repeat for fallbacks, tried in order)"
    )]
    pub servers: Vec<String>,

    /// How the sources are delivered
    #[arg(
        long,
        value_enum,
        default_value_t = DeliveryKind::Hls,
        help = "Delivery type of every source"
    )]
    pub kind: DeliveryKind,

    /// Delivery proxy endpoints
    #[arg(
        short = 'p',
        long = "proxy",
        value_name = "ENDPOINT",
        help = "Delivery proxy endpoint (repeatable). When set, sources are fetched as ENDPOINT?m3u8-proxy=URL"
    )]
    pub proxies: Vec<String>,

    /// Fragments that must load before a server counts as healthy
    #[arg(long, default_value = "3", help = "Healthy threshold in loaded fragments")]
    pub segments: u64,

    /// Quality index, -1 for automatic
    #[arg(
        short = 'q',
        long,
        default_value = "-1",
        allow_hyphen_values = true,
        help = "Quality level index (-1 for automatic)"
    )]
    pub quality: i32,

    /// Preferred audio language
    #[arg(long, default_value = "en", help = "Preferred audio language tag")]
    pub audio_lang: String,

    /// Fragment retries per server
    #[arg(long, default_value = "1", help = "Fragment reloads allowed per server")]
    pub segment_retries: u32,

    #[arg(
        long,
        default_value = "8",
        help = "Timeout in seconds for manifest and level playlist loads"
    )]
    pub load_timeout: u64,

    #[arg(long, default_value = "8", help = "Timeout in seconds for fragment and key loads")]
    pub fragment_timeout: u64,

    #[arg(long, default_value = "3", help = "Timeout in seconds for one proxy probe")]
    pub probe_timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    #[arg(
        long,
        default_value = "60",
        help = "Seconds a server gets to reach the healthy threshold"
    )]
    pub watch_timeout: u64,

    /// Custom HTTP headers
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Outbound proxy for every request (e.g., "http://proxy.example.com:8080")
    #[arg(long, help = "Outbound proxy URL for all requests")]
    pub http_proxy: Option<String>,

    /// Outbound proxy scheme
    #[arg(
        long,
        value_enum,
        default_value_t = ProxyScheme::Http,
        help = "Outbound proxy type"
    )]
    pub http_proxy_type: ProxyScheme,

    #[arg(long, help = "Username for outbound proxy authentication")]
    pub proxy_user: Option<String>,

    #[arg(long, help = "Password for outbound proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable system proxy detection
    #[arg(long, help = "Ignore system proxy settings")]
    pub no_system_proxy: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["playgate", "-s", "https://a.example/master.m3u8"]);
        assert_eq!(args.servers.len(), 1);
        assert_eq!(args.kind, DeliveryKind::Hls);
        assert_eq!(args.quality, -1);
        assert_eq!(args.segments, 3);
        assert!(args.proxies.is_empty());
        assert_eq!(args.http_proxy_type, ProxyScheme::Http);
    }

    #[test]
    fn test_outbound_proxy_type() {
        let args = CliArgs::parse_from([
            "playgate",
            "-s",
            "https://a.example/master.m3u8",
            "--http-proxy",
            "127.0.0.1:1080",
            "--http-proxy-type",
            "socks5",
        ]);
        assert_eq!(args.http_proxy.as_deref(), Some("127.0.0.1:1080"));
        assert_eq!(args.http_proxy_type, ProxyScheme::Socks5);

        assert!(
            CliArgs::try_parse_from([
                "playgate",
                "-s",
                "https://a.example/master.m3u8",
                "--http-proxy-type",
                "ftp",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_repeated_servers_and_proxies() {
        let args = CliArgs::parse_from([
            "playgate",
            "--server",
            "https://a.example/master.m3u8",
            "--server",
            "https://b.example/master.m3u8",
            "--proxy",
            "https://edge1.example/",
            "--proxy",
            "https://edge2.example/",
            "--kind",
            "progressive",
            "-q",
            "2",
        ]);
        assert_eq!(args.servers.len(), 2);
        assert_eq!(args.proxies.len(), 2);
        assert_eq!(args.kind, DeliveryKind::Progressive);
        assert_eq!(args.quality, 2);
    }
}
