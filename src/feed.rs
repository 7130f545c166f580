// ===============================
// src/feed.rs
// ===============================
//
// Price stream adapters (satu symbol):
// - run_mock      : random-walk trade generator (~20 ticks/s)
// - run_binance   : Binance WS `<symbol>@trade` (Testnet & Mainnet)
//
// Notes:
// - Tick dikirim dengan `send().await` (bounded mpsc): kalau engine lambat,
//   adapter ikut menunggu. Tick tidak boleh dibuang diam-diam, gap membuat
//   trailing stop tidak valid.
// - Tick rusak (harga tak bisa di-parse) dibuang + dicatat di log & metrics.
//
use chrono::Utc;
use futures_util::StreamExt; // for .next()
use rand::Rng;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::{sync::mpsc, time::sleep};
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::binance::TradeMsg;
use crate::domain::PriceTick;
use crate::metrics::TICKS_DROPPED;

/// Exponential backoff + jitter: 0.5s, 1s, 2s ... capped at 32s (+0..250ms).
pub fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.min(6);
    let base_ms = 500u64.saturating_mul(1u64 << shift);
    let jitter = rand::thread_rng().gen_range(0..=250);
    Duration::from_millis(base_ms + jitter)
}

/// Random-walk trades around 0.25 with 5 decimals.
pub async fn run_mock(tx: mpsc::Sender<PriceTick>, symbol: String) {
    let mut px: i64 = 25_000; // 0.25000
    loop {
        // jangan simpan ThreadRng melewati .await
        let (step, qty) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(-40..=40), rng.gen_range(1..=5_000))
        };
        px = (px + step).max(1_000);
        let tick = PriceTick {
            symbol: symbol.clone(),
            price: Decimal::new(px, 5),
            quantity: Decimal::from(qty),
            ts_ms: Utc::now().timestamp_millis(),
        };
        if tx.send(tick).await.is_err() {
            info!("mock feed: engine gone, stopping");
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

/// Parse one text frame from the trade stream.
pub fn parse_trade_frame(txt: &str) -> Result<PriceTick, String> {
    let msg: TradeMsg = serde_json::from_str(txt).map_err(|e| e.to_string())?;
    msg.into_tick()
}

/// Adapter ke Binance WS `<symbol>@trade`
///
/// - `ws_base` diteruskan dari config:
///     * Testnet: wss://testnet.binance.vision/ws
///     * Mainnet: wss://stream.binance.com:9443/ws
/// - Reconnect otomatis dengan backoff.
pub async fn run_binance(tx: mpsc::Sender<PriceTick>, symbol: String, ws_base: String) {
    let topic = format!("{}@trade", symbol.to_lowercase());
    let ws_url = format!("{}/{}", ws_base.trim_end_matches('/'), topic);

    let url = match Url::parse(&ws_url) {
        Ok(u) => u,
        Err(e) => {
            error!(?e, %ws_url, "bad ws url");
            return;
        }
    };

    let mut attempt: u32 = 0;
    loop {
        info!(%ws_url, "connecting binance trade stream");
        match connect_async(url.clone()).await {
            Ok((mut ws, _resp)) => {
                info!(%symbol, "connected to trade stream");
                attempt = 0; // reset backoff

                while let Some(frame) = ws.next().await {
                    match frame {
                        Ok(m) if m.is_text() => {
                            let txt = match m.into_text() {
                                Ok(t) => t,
                                Err(e) => {
                                    warn!(?e, "failed to read text frame");
                                    continue;
                                }
                            };
                            match parse_trade_frame(&txt) {
                                Ok(tick) => {
                                    debug!(symbol = %tick.symbol, price = %tick.price, qty = %tick.quantity, ts = tick.ts_ms, "trade");
                                    if tx.send(tick).await.is_err() {
                                        info!("binance feed: engine gone, stopping");
                                        return;
                                    }
                                }
                                Err(reason) => {
                                    warn!(%reason, frame = %txt, "dropping malformed trade");
                                    TICKS_DROPPED.with_label_values(&["malformed"]).inc();
                                }
                            }
                        }
                        Ok(_) => {
                            // ping/pong/binary diabaikan
                        }
                        Err(e) => {
                            error!(?e, "ws read error");
                            break;
                        }
                    }
                }
                warn!("trade stream disconnected, will reconnect…");
            }
            Err(e) => {
                error!(?e, "connect failed");
            }
        }

        attempt = attempt.saturating_add(1);
        sleep(backoff_delay(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn backoff_grows_and_caps() {
        let d1 = backoff_delay(1);
        assert!(d1 >= Duration::from_millis(1_000) && d1 <= Duration::from_millis(1_250));
        let d_cap = backoff_delay(50);
        assert!(d_cap >= Duration::from_millis(32_000) && d_cap <= Duration::from_millis(32_250));
    }

    #[test]
    fn trade_frame_parses() {
        let tick = parse_trade_frame(
            r#"{"e":"trade","E":1,"s":"DOGEUSDT","t":2,"p":"0.30120","q":"10","T":3,"m":false}"#,
        )
        .unwrap();
        assert_eq!(tick.price, dec!(0.3012));
    }

    #[test]
    fn garbage_frame_is_an_error() {
        assert!(parse_trade_frame("{\"result\":null,\"id\":1}").is_err());
        assert!(parse_trade_frame(r#"{"s":"DOGEUSDT","p":"NaN","q":"1","T":3}"#).is_err());
    }

    #[tokio::test]
    async fn mock_feed_emits_positive_prices_for_symbol() {
        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(run_mock(tx, "DOGEUSDT".into()));
        for _ in 0..3 {
            let t = rx.recv().await.unwrap();
            assert_eq!(t.symbol, "DOGEUSDT");
            assert!(t.price > Decimal::ZERO);
        }
        drop(rx);
        task.await.unwrap();
    }
}
