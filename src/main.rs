// ===============================
// src/main.rs
// ===============================
/*
 # dry-run lokal (mock feed, mock social, paper venue)
 cargo run

 # feed Binance asli + test order ke testnet
 FEED_MODE=binance VENUE_MODE=binance BINANCE_API_KEY=.. BINANCE_API_SECRET=.. cargo run

 # posisi & stop saat ini
 curl -s localhost:9898/metrics | egrep '^(position_qty|stop_price|max_price_seen|last_price)'
*/
/*
=============================================================================
Project : trail_signal_bot — social-signal entry + trailing-stop exit engine
Module  : main.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Watches a social stream for a signal author, buys a fixed notional
          of one instrument on a keyword trigger, and exits on a trailing
          stop driven by live trade ticks. Mock/Binance feeds and venues,
          JSONL audit trail, Prometheus metrics.
=============================================================================
*/
mod binance;          // signer + wire models Binance
mod config;
mod domain;
mod engine;
mod feed;             // price stream adapters
mod gateway;          // OrderExecutor + paper venue
mod gateway_binance;  // Binance Spot REST (test / live)
mod metrics;
mod recorder;
mod signal;
mod social;           // social stream adapters
mod trailing;

use anyhow::Context;
use clap::Parser;
use tokio::{
    sync::mpsc,
    time::{interval, Duration},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{FeedMode, SocialMode, VenueMode};
use crate::domain::{AuditRecord, OrderMode, PriceTick, SocialEvent};
use crate::engine::{Engine, EngineCfg};
use crate::gateway::{OrderExecutor, PaperGateway};
use crate::gateway_binance::BinanceGateway;
use crate::signal::SignalDetector;

const RECORDER_DRAIN: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Load config ----
    let cli = config::Cli::parse();
    let args = config::load(&cli).context("invalid configuration")?;

    // ---- Metrics ----
    metrics::init();
    if let Err(e) = metrics::serve_metrics(args.metrics_port) {
        warn!(?e, port = args.metrics_port, "metrics server not started");
    }

    let order_mode_str = match args.order_mode {
        OrderMode::Test => "test",
        OrderMode::Live => "live",
    };
    info!(
        symbol = %args.symbol,
        trailing_fraction = %args.trailing_fraction,
        entry_notional = %args.entry_notional,
        signal_author = args.authors.signal_source,
        commentary_author = args.authors.commentary,
        order_mode = order_mode_str,
        feed_mode = args.feed_mode.as_str(),
        social_mode = args.social_mode.as_str(),
        venue_mode = args.venue_mode.as_str(),
        binance_ws = %args.binance_ws_url,
        binance_rest = %args.binance_rest_url,
        "startup config"
    );
    if args.order_mode == OrderMode::Live && args.venue_mode == VenueMode::Mock {
        warn!("ORDER_MODE=live with VENUE_MODE=mock: orders still go to the paper venue");
    }

    metrics::CONFIG_FEED_MODE.with_label_values(&[args.feed_mode.as_str()]).set(1);
    metrics::CONFIG_VENUE_MODE.with_label_values(&[args.venue_mode.as_str()]).set(1);
    metrics::CONFIG_ORDER_MODE.with_label_values(&[order_mode_str]).set(1);
    metrics::CONFIG_SYMBOL.with_label_values(&[&args.symbol]).set(1);

    // ---- Queues ----
    let (price_tx, price_rx) = mpsc::channel::<PriceTick>(args.queue_capacity);
    let (social_tx, social_rx) = mpsc::channel::<SocialEvent>(args.queue_capacity);

    // ---- Audit recorder (optional) ----
    let (audit_tx, mut recorder_task) = match args.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<AuditRecord>(4096);
            (Some(tx), Some(tokio::spawn(recorder::run(rx, path))))
        }
        None => (None, None),
    };

    // ---- Price feed ----
    match args.feed_mode {
        FeedMode::Mock => {
            tokio::spawn(feed::run_mock(price_tx, args.symbol.clone()));
        }
        FeedMode::Binance => {
            tokio::spawn(feed::run_binance(price_tx, args.symbol.clone(), args.binance_ws_url.clone()));
        }
    }

    // ---- Social feed ----
    match (&args.social_mode, args.social_ws_url.clone()) {
        (SocialMode::Ws, Some(url)) => {
            tokio::spawn(social::run_ws(social_tx, url));
        }
        _ => {
            let (first, repeat) = args.mock_post_delays;
            let script = social::default_script(args.authors.signal_source, first, repeat);
            tokio::spawn(social::run_mock(social_tx, script));
        }
    }

    // ---- Order executor ----
    let executor: Box<dyn OrderExecutor> = match (&args.venue_mode, args.binance_creds.clone()) {
        (VenueMode::Binance, Some(creds)) => Box::new(
            BinanceGateway::new(
                args.binance_rest_url.clone(),
                creds,
                args.binance_recv_window,
                args.order_timeout,
            )
            .context("building binance gateway")?,
        ),
        _ => Box::new(PaperGateway::new("paper", args.paper_fill_ms)),
    };

    // ---- Engine ----
    let detector = SignalDetector::new(args.authors, &args.keyword_pattern)
        .with_context(|| format!("bad KEYWORD_PATTERN {:?}", args.keyword_pattern))?;
    let cfg = EngineCfg {
        symbol: args.symbol.clone(),
        entry_notional: args.entry_notional,
        order_mode: args.order_mode,
        order_timeout: args.order_timeout,
    };
    let mut engine = Engine::new(cfg, detector, executor, args.trailing_fraction);
    if let Some(tx) = audit_tx {
        engine = engine.with_audit(tx);
    }
    let mut engine_task = tokio::spawn(engine.run(social_rx, price_rx));

    // ---- Heartbeat ----
    let mut beat = interval(Duration::from_secs(1));
    let mut last_ticks = metrics::TICKS.get();
    loop {
        tokio::select! {
            res = &mut engine_task => {
                // engine (dan audit sender-nya) sudah selesai; tunggu sisa audit ditulis
                if let Some(task) = recorder_task.take() {
                    recorder::drain(task, RECORDER_DRAIN).await;
                }
                return match res {
                    Ok(Ok(pos)) => {
                        info!(phase = ?pos.phase(), qty = pos.quantity_held(), "engine finished");
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        error!(error = %e, "engine aborted");
                        Err(e.into())
                    }
                    Err(e) => Err(anyhow::anyhow!("engine task panicked: {e}")),
                };
            }
            _ = beat.tick() => {
                let ticks = metrics::TICKS.get();
                info!(
                    ticks = ticks - last_ticks,
                    qty = metrics::POSITION_QTY.get(),
                    stop = metrics::STOP_PRICE.get(),
                    "heartbeat"
                );
                last_ticks = ticks;
            }
        }
    }
}
