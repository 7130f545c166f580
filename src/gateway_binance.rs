// ===============================
// src/gateway_binance.rs
// ===============================
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use tokio::time::Duration;

use crate::binance::{encode_params, sign_query, timestamp_ms, OrderResponse};
use crate::domain::{now_ms, OrderFill, OrderInstruction, OrderMode};
use crate::gateway::{ExecError, OrderExecutor};
use crate::metrics::EXECS;

#[derive(Clone, Debug)]
pub struct BinanceCreds {
    pub api_key: String,
    pub api_secret: String,
}

/// Binance Spot gateway (REST, MARKET orders only).
/// Test mode hits `/api/v3/order/test`, yang hanya memvalidasi order.
pub struct BinanceGateway {
    http: reqwest::Client,
    rest_base: String,
    creds: BinanceCreds,
    recv_window: u64,
    timeout: Duration,
    venue: String,
}

impl BinanceGateway {
    pub fn new(
        rest_base: String,
        creds: BinanceCreds,
        recv_window: u64,
        timeout: Duration,
    ) -> Result<Self, ExecError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            rest_base: rest_base.trim_end_matches('/').to_string(),
            creds,
            recv_window,
            timeout,
            venue: "binance".to_string(),
        })
    }

    fn endpoint(&self, mode: OrderMode) -> String {
        match mode {
            OrderMode::Test => format!("{}/api/v3/order/test", self.rest_base),
            OrderMode::Live => format!("{}/api/v3/order", self.rest_base),
        }
    }

    fn signed_query(&self, o: &OrderInstruction) -> String {
        let params = [
            ("symbol", o.symbol.to_ascii_uppercase()),
            ("side", o.side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", o.quantity.to_string()),
            ("newClientOrderId", o.cl_id.clone()),
            ("newOrderRespType", "FULL".to_string()),
            ("recvWindow", self.recv_window.to_string()),
            ("timestamp", timestamp_ms().to_string()),
        ];
        let query = encode_params(&params);
        let sig = sign_query(&self.creds.api_secret, &query);
        format!("{query}&signature={sig}")
    }

    fn map_send_err(&self, e: reqwest::Error) -> ExecError {
        if e.is_timeout() {
            ExecError::Timeout(self.timeout)
        } else {
            ExecError::Transport(e.to_string())
        }
    }

    async fn submit(&self, o: &OrderInstruction) -> Result<OrderFill, ExecError> {
        let url = format!("{}?{}", self.endpoint(o.mode), self.signed_query(o));
        let rsp = self
            .http
            .post(url)
            .header("X-MBX-APIKEY", &self.creds.api_key)
            .send()
            .await
            .map_err(|e| self.map_send_err(e))?;

        let status = rsp.status();
        let body = rsp.text().await.map_err(|e| self.map_send_err(e))?;
        if !status.is_success() {
            return Err(ExecError::Rejected { status: status.as_u16(), reason: body });
        }

        if o.mode == OrderMode::Test {
            // order/test balas `{}`: anggap terisi di harga referensi
            tracing::info!(cl_id = %o.cl_id, side = o.side.as_str(), qty = o.quantity, "test order validated");
            return Ok(OrderFill {
                cl_id: o.cl_id.clone(),
                filled_price: o.reference_price,
                filled_quantity: o.quantity,
                ts_ms: now_ms(),
            });
        }

        let parsed: OrderResponse =
            serde_json::from_str(&body).map_err(|e| ExecError::Decode(format!("{e}: {body}")))?;
        let (avg_px, executed) = parsed.fill_summary().map_err(ExecError::Decode)?;
        let filled_quantity = executed.trunc().to_u64().unwrap_or(0);
        match avg_px {
            Some(px) if filled_quantity > 0 => {
                tracing::info!(cl_id = %o.cl_id, status = %parsed.status, %px, qty = filled_quantity, "order filled");
                Ok(OrderFill {
                    cl_id: o.cl_id.clone(),
                    filled_price: px,
                    filled_quantity,
                    ts_ms: now_ms(),
                })
            }
            _ => Err(ExecError::Rejected {
                status: status.as_u16(),
                reason: format!("not filled (status {})", parsed.status),
            }),
        }
    }
}

#[async_trait]
impl OrderExecutor for BinanceGateway {
    fn venue(&self) -> &str {
        &self.venue
    }

    async fn place(&self, order: &OrderInstruction) -> Result<OrderFill, ExecError> {
        let res = self.submit(order).await;
        let label = match &res {
            Ok(_) => "filled",
            Err(e) => e.label(),
        };
        EXECS.with_label_values(&[label, &self.venue]).inc();
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use rust_decimal_macros::dec;

    fn gateway() -> BinanceGateway {
        BinanceGateway::new(
            "https://testnet.binance.vision/".into(),
            BinanceCreds { api_key: "k".into(), api_secret: "s".into() },
            5000,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn order(mode: OrderMode) -> OrderInstruction {
        OrderInstruction {
            cl_id: "CL-7".into(),
            side: Side::Sell,
            symbol: "dogeusdt".into(),
            quantity: 42,
            reference_price: dec!(0.1),
            mode,
        }
    }

    #[test]
    fn endpoint_follows_order_mode() {
        let gw = gateway();
        assert_eq!(gw.endpoint(OrderMode::Test), "https://testnet.binance.vision/api/v3/order/test");
        assert_eq!(gw.endpoint(OrderMode::Live), "https://testnet.binance.vision/api/v3/order");
    }

    #[test]
    fn query_is_signed_market_order() {
        let gw = gateway();
        let q = gw.signed_query(&order(OrderMode::Live));
        assert!(q.starts_with("symbol=DOGEUSDT&side=SELL&type=MARKET&quantity=42&newClientOrderId=CL-7"));
        let (unsigned, sig) = q.rsplit_once("&signature=").unwrap();
        assert_eq!(sig, sign_query("s", unsigned));
    }
}
