// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : trail_signal_bot — social-signal entry + trailing-stop exit engine
Module  : config.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Watches a social stream for a signal author, buys a fixed notional
          of one instrument on a keyword trigger, and exits on a trailing
          stop driven by live trade ticks. Mock/Binance feeds and venues,
          JSONL audit trail, Prometheus metrics.
=============================================================================
*/
use clap::Parser;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::OrderMode;
use crate::gateway_binance::BinanceCreds;
use crate::signal::{Authors, DEFAULT_KEYWORD_PATTERN};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Parse { key: &'static str, value: String },
    #[error("TRAILING_FRACTION must be in (0, 1), got {0}")]
    TrailingFraction(Decimal),
    #[error("ENTRY_NOTIONAL must be positive, got {0}")]
    Notional(Decimal),
    #[error("{0} is required for the selected mode")]
    Missing(&'static str),
    #[error("SIGNAL_AUTHOR_ID and COMMENTARY_AUTHOR_ID must differ")]
    SameAuthors,
}

/// Sumber market data
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedMode { Mock, Binance }

/// Sumber post sosial
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocialMode { Mock, Ws }

/// Venue eksekusi order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VenueMode { Mock, Binance }

impl FeedMode {
    fn parse(s: Option<String>) -> FeedMode {
        match s.unwrap_or_default().to_ascii_lowercase().as_str() {
            "binance" | "binance_sandbox" | "binance_mainnet" => FeedMode::Binance,
            _ => FeedMode::Mock,
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMode::Mock => "mock",
            FeedMode::Binance => "binance",
        }
    }
}

impl SocialMode {
    fn parse(s: Option<String>) -> SocialMode {
        match s.unwrap_or_default().to_ascii_lowercase().as_str() {
            "ws" | "websocket" => SocialMode::Ws,
            _ => SocialMode::Mock,
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialMode::Mock => "mock",
            SocialMode::Ws => "ws",
        }
    }
}

impl VenueMode {
    fn parse(s: Option<String>) -> VenueMode {
        match s.unwrap_or_default().to_ascii_lowercase().as_str() {
            "binance" | "binance_sandbox" | "binance_mainnet" => VenueMode::Binance,
            _ => VenueMode::Mock,
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueMode::Mock => "mock",
            VenueMode::Binance => "binance",
        }
    }
}

/// Command-line overrides; everything else comes from env / `.env`.
#[derive(Parser, Debug, Default)]
#[command(name = "trail_signal_bot", version, about = "Social-signal entry, trailing-stop exit")]
pub struct Cli {
    /// Kirim order sungguhan (default: test order saja)
    #[arg(long)]
    pub live: bool,
    #[arg(long)]
    pub symbol: Option<String>,
    #[arg(long)]
    pub trailing_fraction: Option<Decimal>,
    #[arg(long)]
    pub entry_notional: Option<Decimal>,
    #[arg(long)]
    pub record_file: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Args {
    pub symbol: String,
    pub trailing_fraction: Decimal,
    pub entry_notional: Decimal,
    pub authors: Authors,
    pub keyword_pattern: String,
    pub order_mode: OrderMode,

    pub feed_mode: FeedMode,
    pub social_mode: SocialMode,
    pub venue_mode: VenueMode,
    pub binance_ws_url: String,
    pub binance_rest_url: String,
    pub binance_creds: Option<BinanceCreds>,
    pub binance_recv_window: u64,
    pub social_ws_url: Option<String>,
    pub mock_post_delays: (Duration, Duration),

    pub order_timeout: Duration,
    pub paper_fill_ms: u64,
    pub queue_capacity: usize,
    pub record_file: Option<String>,
    pub metrics_port: u16,
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Parse { key, value: v }),
        _ => Ok(default),
    }
}

/// Baca `.env` + environment, lalu terapkan override CLI.
pub fn load(cli: &Cli) -> Result<Args, ConfigError> {
    let _ = dotenv();
    from_lookup(|k| env::var(k).ok(), cli)
}

#[cfg(test)]
pub fn from_map(vars: &std::collections::HashMap<String, String>, cli: &Cli) -> Result<Args, ConfigError> {
    from_lookup(|k| vars.get(k).cloned(), cli)
}

fn from_lookup(get: impl Fn(&str) -> Option<String>, cli: &Cli) -> Result<Args, ConfigError> {
    // ===== Strategy =====
    let symbol = cli
        .symbol
        .clone()
        .or_else(|| get("SYMBOL"))
        .unwrap_or_else(|| "DOGEUSDT".to_string())
        .trim()
        .to_ascii_uppercase();

    let trailing_fraction = match cli.trailing_fraction {
        Some(f) => f,
        None => parse_or(&get, "TRAILING_FRACTION", Decimal::new(3, 3))?, // 0.003 = 0.3%
    };
    if trailing_fraction <= Decimal::ZERO || trailing_fraction >= Decimal::ONE {
        return Err(ConfigError::TrailingFraction(trailing_fraction));
    }

    let entry_notional = match cli.entry_notional {
        Some(n) => n,
        None => parse_or(&get, "ENTRY_NOTIONAL", Decimal::from(5_000))?,
    };
    if entry_notional <= Decimal::ZERO {
        return Err(ConfigError::Notional(entry_notional));
    }

    let authors = Authors {
        signal_source: parse_or(&get, "SIGNAL_AUTHOR_ID", 44_196_397u64)?,
        commentary: parse_or(&get, "COMMENTARY_AUTHOR_ID", 412_833_880u64)?,
    };
    if authors.signal_source == authors.commentary {
        return Err(ConfigError::SameAuthors);
    }
    let keyword_pattern = get("KEYWORD_PATTERN").unwrap_or_else(|| DEFAULT_KEYWORD_PATTERN.to_string());

    let order_mode = if cli.live {
        OrderMode::Live
    } else {
        match get("ORDER_MODE").unwrap_or_default().to_ascii_lowercase().as_str() {
            "live" => OrderMode::Live,
            _ => OrderMode::Test,
        }
    };

    // ===== Mode =====
    let feed_mode = FeedMode::parse(get("FEED_MODE"));
    let social_mode = SocialMode::parse(get("SOCIAL_MODE"));
    let venue_mode = VenueMode::parse(get("VENUE_MODE"));

    let binance_ws_url = get("BINANCE_WS_URL").unwrap_or_else(|| match order_mode {
        OrderMode::Live => "wss://stream.binance.com:9443/ws".to_string(),
        OrderMode::Test => "wss://testnet.binance.vision/ws".to_string(),
    });
    let binance_rest_url = get("BINANCE_REST_URL").unwrap_or_else(|| match order_mode {
        OrderMode::Live => "https://api.binance.com".to_string(),
        OrderMode::Test => "https://testnet.binance.vision".to_string(),
    });

    let binance_creds = match (get("BINANCE_API_KEY"), get("BINANCE_API_SECRET")) {
        (Some(api_key), Some(api_secret)) if !api_key.is_empty() && !api_secret.is_empty() => {
            Some(BinanceCreds { api_key, api_secret })
        }
        _ => None,
    };
    if venue_mode == VenueMode::Binance && binance_creds.is_none() {
        return Err(ConfigError::Missing("BINANCE_API_KEY / BINANCE_API_SECRET"));
    }

    let social_ws_url = get("SOCIAL_WS_URL").filter(|s| !s.is_empty());
    if social_mode == SocialMode::Ws && social_ws_url.is_none() {
        return Err(ConfigError::Missing("SOCIAL_WS_URL"));
    }

    let mock_post_delays = (
        Duration::from_millis(parse_or(&get, "MOCK_POST_FIRST_MS", 2_000u64)?),
        Duration::from_millis(parse_or(&get, "MOCK_POST_REPEAT_MS", 120_000u64)?),
    );

    Ok(Args {
        symbol,
        trailing_fraction,
        entry_notional,
        authors,
        keyword_pattern,
        order_mode,
        feed_mode,
        social_mode,
        venue_mode,
        binance_ws_url,
        binance_rest_url,
        binance_creds,
        binance_recv_window: parse_or(&get, "BINANCE_RECV_WINDOW", 5_000u64)?,
        social_ws_url,
        mock_post_delays,
        order_timeout: Duration::from_millis(parse_or(&get, "ORDER_TIMEOUT_MS", 5_000u64)?),
        paper_fill_ms: parse_or(&get, "PAPER_FILL_MS", 20u64)?,
        queue_capacity: parse_or(&get, "QUEUE_CAPACITY", 1_024usize)?.max(1),
        record_file: cli.record_file.clone().or_else(|| get("RECORD_FILE")),
        metrics_port: parse_or(&get, "METRICS_PORT", 9898u16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_are_the_dry_run_doge_setup() {
        let a = from_map(&HashMap::new(), &Cli::default()).unwrap();
        assert_eq!(a.symbol, "DOGEUSDT");
        assert_eq!(a.trailing_fraction, dec!(0.003));
        assert_eq!(a.entry_notional, dec!(5000));
        assert_eq!(a.order_mode, OrderMode::Test);
        assert_eq!(a.feed_mode, FeedMode::Mock);
        assert_eq!(a.venue_mode, VenueMode::Mock);
        assert_eq!(a.authors, Authors { signal_source: 44196397, commentary: 412833880 });
        assert_eq!(a.order_timeout, Duration::from_secs(5));
        assert_eq!(a.mock_post_delays, (Duration::from_secs(2), Duration::from_secs(120)));
    }

    #[test]
    fn env_values_are_parsed() {
        let a = from_map(
            &vars(&[
                ("SYMBOL", "btcusdt"),
                ("TRAILING_FRACTION", "0.05"),
                ("ENTRY_NOTIONAL", "250.5"),
                ("ORDER_MODE", "LIVE"),
                ("ORDER_TIMEOUT_MS", "750"),
                ("RECORD_FILE", "/tmp/audit.jsonl"),
            ]),
            &Cli::default(),
        )
        .unwrap();
        assert_eq!(a.symbol, "BTCUSDT");
        assert_eq!(a.trailing_fraction, dec!(0.05));
        assert_eq!(a.entry_notional, dec!(250.5));
        assert_eq!(a.order_mode, OrderMode::Live);
        assert_eq!(a.binance_rest_url, "https://api.binance.com");
        assert_eq!(a.order_timeout, Duration::from_millis(750));
        assert_eq!(a.record_file.as_deref(), Some("/tmp/audit.jsonl"));
    }

    #[test]
    fn cli_overrides_env() {
        let cli = Cli {
            live: true,
            symbol: Some("ethusdt".into()),
            trailing_fraction: Some(dec!(0.01)),
            entry_notional: None,
            record_file: None,
        };
        let a = from_map(&vars(&[("SYMBOL", "BTCUSDT"), ("TRAILING_FRACTION", "0.2")]), &cli).unwrap();
        assert_eq!(a.symbol, "ETHUSDT");
        assert_eq!(a.trailing_fraction, dec!(0.01));
        assert_eq!(a.order_mode, OrderMode::Live);
    }

    #[test]
    fn trailing_fraction_outside_unit_interval_is_rejected() {
        for bad in ["0", "1", "1.5", "-0.1"] {
            let err = from_map(&vars(&[("TRAILING_FRACTION", bad)]), &Cli::default()).unwrap_err();
            assert!(matches!(err, ConfigError::TrailingFraction(_)), "{bad}");
        }
    }

    #[test]
    fn garbage_numbers_are_reported_with_key() {
        let err = from_map(&vars(&[("ENTRY_NOTIONAL", "lots")]), &Cli::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { key: "ENTRY_NOTIONAL", .. }));
        let err = from_map(&vars(&[("ENTRY_NOTIONAL", "0")]), &Cli::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Notional(_)));
    }

    #[test]
    fn binance_venue_needs_credentials() {
        let err = from_map(&vars(&[("VENUE_MODE", "binance")]), &Cli::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        let a = from_map(
            &vars(&[("VENUE_MODE", "binance"), ("BINANCE_API_KEY", "k"), ("BINANCE_API_SECRET", "s")]),
            &Cli::default(),
        )
        .unwrap();
        assert_eq!(a.venue_mode, VenueMode::Binance);
        assert!(a.binance_creds.is_some());
    }

    #[test]
    fn ws_social_mode_needs_url() {
        let err = from_map(&vars(&[("SOCIAL_MODE", "ws")]), &Cli::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SOCIAL_WS_URL")));
    }

    #[test]
    fn identical_authors_are_rejected() {
        let err = from_map(
            &vars(&[("SIGNAL_AUTHOR_ID", "7"), ("COMMENTARY_AUTHOR_ID", "7")]),
            &Cli::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::SameAuthors));
    }
}
