// ===============================
// src/gateway.rs (order executor + paper venue)
// ===============================
use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{sleep, Duration};

use crate::domain::{now_ms, OrderFill, OrderInstruction};
use crate::metrics::EXECS;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("order rejected ({status}): {reason}")]
    Rejected { status: u16, reason: String },
    #[error("order timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("cannot decode venue response: {0}")]
    Decode(String),
}

impl ExecError {
    pub fn label(&self) -> &'static str {
        match self {
            ExecError::Rejected { .. } => "rejected",
            ExecError::Timeout(_) => "timeout",
            ExecError::Transport(_) => "transport",
            ExecError::Decode(_) => "decode",
        }
    }
}

/// Places one instruction and waits for the outcome. No retries happen
/// behind this call; each failure goes back to the engine as-is.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    fn venue(&self) -> &str;
    async fn place(&self, order: &OrderInstruction) -> Result<OrderFill, ExecError>;
}

/// Mock venue: fills everything at the reference price after `fill_ms`.
pub struct PaperGateway {
    venue: String,
    fill_ms: u64,
}

impl PaperGateway {
    pub fn new(venue: impl Into<String>, fill_ms: u64) -> Self {
        Self { venue: venue.into(), fill_ms }
    }
}

#[async_trait]
impl OrderExecutor for PaperGateway {
    fn venue(&self) -> &str {
        &self.venue
    }

    async fn place(&self, order: &OrderInstruction) -> Result<OrderFill, ExecError> {
        if order.quantity == 0 {
            EXECS.with_label_values(&["rejected", &self.venue]).inc();
            return Err(ExecError::Rejected { status: 400, reason: "quantity must be positive".into() });
        }
        sleep(Duration::from_millis(self.fill_ms)).await;
        EXECS.with_label_values(&["filled", &self.venue]).inc();
        Ok(OrderFill {
            cl_id: order.cl_id.clone(),
            filled_price: order.reference_price,
            filled_quantity: order.quantity,
            ts_ms: now_ms(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderMode, Side};
    use rust_decimal_macros::dec;

    fn order(qty: u64) -> OrderInstruction {
        OrderInstruction {
            cl_id: "CL-1".into(),
            side: Side::Buy,
            symbol: "DOGEUSDT".into(),
            quantity: qty,
            reference_price: dec!(0.25),
            mode: OrderMode::Test,
        }
    }

    #[tokio::test]
    async fn paper_fills_at_reference_price() {
        let gw = PaperGateway::new("paper", 0);
        let fill = gw.place(&order(20)).await.unwrap();
        assert_eq!(fill.cl_id, "CL-1");
        assert_eq!(fill.filled_price, dec!(0.25));
        assert_eq!(fill.filled_quantity, 20);
    }

    #[tokio::test]
    async fn paper_rejects_zero_quantity() {
        let gw = PaperGateway::new("paper", 0);
        let err = gw.place(&order(0)).await.unwrap_err();
        assert_eq!(err.label(), "rejected");
    }
}
