// ===============================
// src/engine.rs
// ===============================
//
// Strategy engine: satu task kontrol yang memiliki PositionState secara
// eksklusif. Producer (feed harga & feed sosial) hanya mengirim nilai lewat
// mpsc; tidak ada shared state.
//
// Transisi:
//   Flat   + tick            -> update last_price, bookkeeping max (tanpa breach)
//   Flat   + EnterLong       -> Buy floor(notional / last_price) -> Active saat fill
//   Active + tick            -> ratchet stop; breach -> Sell semua -> Flat saat fill
//   Active + EnterLong       -> diabaikan (no pyramiding)
//   *      + Info / Ignore   -> tidak ada efek state
//
// Order di-await langsung (serial) dengan timeout. Gagal = state tidak
// berubah; kondisi dievaluasi lagi di event berikutnya.
//
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::domain::{
    now_ms, AuditEvent, AuditRecord, OrderFill, OrderInstruction, OrderMode, Phase, PriceTick,
    Side, SocialEvent, TriggerDecision,
};
use crate::gateway::{ExecError, OrderExecutor};
use crate::metrics::{
    BREACHES, LAST_PRICE, MAX_PRICE, ORDERS, POSITION_QTY, POSTS, STOP_PRICE, TICKS, TICKS_DROPPED,
};
use crate::signal::SignalDetector;
use crate::trailing::{self, InvariantError, PositionState};

#[derive(Debug, Clone)]
pub struct EngineCfg {
    pub symbol: String,
    pub entry_notional: Decimal,
    pub order_mode: OrderMode,
    pub order_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("position invariant violated: {0}")]
    Invariant(#[from] InvariantError),
}

pub struct Engine {
    cfg: EngineCfg,
    detector: SignalDetector,
    executor: Box<dyn OrderExecutor>,
    position: PositionState,
    last_price: Option<Decimal>,
    audit_tx: Option<mpsc::Sender<AuditRecord>>,
    audit_lost: bool,
    seq: u64,
}

fn gauge_value(v: Option<Decimal>) -> f64 {
    v.and_then(|d| d.to_f64()).unwrap_or(0.0)
}

impl Engine {
    pub fn new(
        cfg: EngineCfg,
        detector: SignalDetector,
        executor: Box<dyn OrderExecutor>,
        trailing_fraction: Decimal,
    ) -> Self {
        Self {
            cfg,
            detector,
            executor,
            position: PositionState::new(trailing_fraction),
            last_price: None,
            audit_tx: None,
            audit_lost: false,
            seq: 0,
        }
    }

    pub fn with_audit(mut self, tx: mpsc::Sender<AuditRecord>) -> Self {
        self.audit_tx = Some(tx);
        self
    }

    /// Drain both queues until both producers are gone. `select!` picks a
    /// ready branch at random, so neither queue can starve the other.
    pub async fn run(
        mut self,
        mut social_rx: mpsc::Receiver<SocialEvent>,
        mut price_rx: mpsc::Receiver<PriceTick>,
    ) -> Result<PositionState, EngineError> {
        info!(
            symbol = %self.cfg.symbol,
            venue = self.executor.venue(),
            mode = ?self.cfg.order_mode,
            notional = %self.cfg.entry_notional,
            trailing = %self.position.trailing_fraction(),
            "engine started"
        );
        loop {
            tokio::select! {
                Some(ev) = social_rx.recv() => self.on_social(ev).await?,
                Some(tick) = price_rx.recv() => self.on_tick(tick).await?,
                else => break,
            }
        }
        info!(phase = ?self.position.phase(), qty = self.position.quantity_held(), "engine: input queues closed");
        Ok(self.position)
    }

    pub async fn on_tick(&mut self, tick: PriceTick) -> Result<(), EngineError> {
        if !tick.symbol.eq_ignore_ascii_case(&self.cfg.symbol) {
            warn!(symbol = %tick.symbol, expected = %self.cfg.symbol, "dropping tick for foreign symbol");
            TICKS_DROPPED.with_label_values(&["foreign_symbol"]).inc();
            self.audit(AuditEvent::TickDropped { symbol: tick.symbol, reason: "foreign symbol".into() }).await;
            return Ok(());
        }
        if tick.price <= Decimal::ZERO {
            warn!(symbol = %tick.symbol, price = %tick.price, "dropping tick with non-positive price");
            TICKS_DROPPED.with_label_values(&["malformed"]).inc();
            self.audit(AuditEvent::TickDropped { symbol: tick.symbol, reason: format!("price {}", tick.price) }).await;
            return Ok(());
        }
        if self.position.stop_for(tick.price).is_none() {
            warn!(symbol = %tick.symbol, price = %tick.price, "dropping tick outside the stop range");
            TICKS_DROPPED.with_label_values(&["malformed"]).inc();
            self.audit(AuditEvent::TickDropped { symbol: tick.symbol, reason: format!("price {} out of range", tick.price) }).await;
            return Ok(());
        }

        TICKS.inc();
        debug!(symbol = %tick.symbol, price = %tick.price, qty = %tick.quantity, ts = tick.ts_ms, "tick");
        self.last_price = Some(tick.price);

        let before = self.position;
        let (next, breached) = trailing::update(self.position, tick.price);
        self.position = next;
        if next.stop_price() != before.stop_price() {
            if let Some(stop) = next.stop_price() {
                debug!(symbol = %self.cfg.symbol, %stop, "[Trailing Price Updated]");
            }
        }
        self.publish_gauges();

        if breached {
            self.exit_position(tick.price).await?;
        }
        Ok(())
    }

    pub async fn on_social(&mut self, ev: SocialEvent) -> Result<(), EngineError> {
        let decision = self.detector.detect(&ev, self.position.phase());
        let label = match decision {
            TriggerDecision::EnterLong => "enter_long",
            TriggerDecision::Informational => "informational",
            TriggerDecision::Ignore => "ignore",
        };
        POSTS.with_label_values(&[label]).inc();

        let text = ev.full_text().to_string();
        let last_price = self.last_price.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        match decision {
            TriggerDecision::EnterLong => {
                info!(author = %ev.screen_name, %text, %last_price, "entry trigger");
            }
            TriggerDecision::Informational => {
                info!(author = %ev.screen_name, %text, %last_price, "commentary post");
            }
            TriggerDecision::Ignore if self.detector.authors().contains(ev.author_id) => {
                info!(author = %ev.screen_name, %text, phase = ?self.position.phase(), "signal post ignored");
            }
            TriggerDecision::Ignore => {
                debug!(author_id = ev.author_id, "post from unwatched author");
            }
        }
        if ev.has_media() {
            info!(author = %ev.screen_name, media = ?ev.media_urls, "post carries media");
        }

        self.audit(AuditEvent::Trigger {
            author_id: ev.author_id,
            decision,
            text,
            last_price: self.last_price,
        })
        .await;

        if decision == TriggerDecision::EnterLong {
            self.enter_long().await?;
        }
        Ok(())
    }

    async fn enter_long(&mut self) -> Result<(), EngineError> {
        if self.position.is_active() {
            debug!("already in a position, trigger ignored");
            return Ok(());
        }
        let Some(px) = self.last_price else {
            warn!(symbol = %self.cfg.symbol, "entry trigger dropped: no price observed yet");
            self.audit(AuditEvent::EntrySkipped { reason: "no price observed yet".into() }).await;
            return Ok(());
        };
        let Some(qty) = self.cfg.entry_notional.checked_div(px).and_then(|q| q.floor().to_u64()) else {
            warn!(notional = %self.cfg.entry_notional, price = %px, "entry trigger dropped: order size overflows");
            self.audit(AuditEvent::EntrySkipped { reason: format!("size overflow at {px}") }).await;
            return Ok(());
        };
        if qty == 0 {
            warn!(notional = %self.cfg.entry_notional, price = %px, "entry trigger dropped: notional buys zero units");
            self.audit(AuditEvent::EntrySkipped { reason: format!("zero units at {px}") }).await;
            return Ok(());
        }

        let order = self.instruction(Side::Buy, qty, px);
        let Ok(fill) = self.place(&order).await else {
            return Ok(());
        };

        if fill.filled_quantity > order.quantity {
            return Err(InvariantError::BuyOverfill {
                ordered: order.quantity,
                filled: fill.filled_quantity,
            }
            .into());
        }
        let from = self.position.phase();
        self.position.open(fill.filled_price, fill.filled_quantity)?;
        self.position.check_invariants()?;
        info!(
            qty = fill.filled_quantity,
            price = %fill.filled_price,
            stop = %gauge_value(self.position.stop_price()),
            "[Market Buy Completed]"
        );
        self.record_transition(from).await;
        Ok(())
    }

    async fn exit_position(&mut self, price: Decimal) -> Result<(), EngineError> {
        let held = self.position.quantity_held();
        if held == 0 {
            return Err(InvariantError::SellWhileFlat.into());
        }
        let stop_price = self.position.stop_price().unwrap_or(price);
        let max_price = self.position.max_price_seen().unwrap_or(price);
        BREACHES.inc();
        info!(%price, stop = %stop_price, max = %max_price, qty = held, "trailing stop breached");
        self.audit(AuditEvent::Breach { price, stop_price, max_price }).await;

        let order = self.instruction(Side::Sell, held, price);
        let Ok(fill) = self.place(&order).await else {
            return Ok(());
        };

        let from = self.position.phase();
        let phase = self.position.reduce(fill.filled_quantity)?;
        self.position.check_invariants()?;
        info!(
            qty = fill.filled_quantity,
            price = %fill.filled_price,
            entry = %gauge_value(self.position.entry_price()),
            remaining = self.position.quantity_held(),
            "[Market Sell Complete]"
        );
        if phase == Phase::Active {
            warn!(remaining = self.position.quantity_held(), "partial sell, position still open");
        }
        self.publish_gauges();
        self.record_transition(from).await;
        Ok(())
    }

    fn instruction(&mut self, side: Side, quantity: u64, reference_price: Decimal) -> OrderInstruction {
        self.seq += 1;
        OrderInstruction {
            cl_id: format!("TSB-{}-{}", now_ms(), self.seq),
            side,
            symbol: self.cfg.symbol.clone(),
            quantity,
            reference_price,
            mode: self.cfg.order_mode,
        }
    }

    /// One attempt, bounded by `order_timeout`. Failures are logged and
    /// audited here; callers only decide whether state moves.
    async fn place(&mut self, order: &OrderInstruction) -> Result<OrderFill, ExecError> {
        info!(cl_id = %order.cl_id, side = order.side.as_str(), symbol = %order.symbol, qty = order.quantity, px = %order.reference_price, "placing order");
        self.audit(AuditEvent::OrderSent { order: order.clone() }).await;

        let res = match timeout(self.cfg.order_timeout, self.executor.place(order)).await {
            Ok(Ok(fill)) if fill.filled_quantity == 0 => Err(ExecError::Rejected {
                status: 0,
                reason: "venue reported zero filled quantity".into(),
            }),
            Ok(r) => r,
            Err(_) => Err(ExecError::Timeout(self.cfg.order_timeout)),
        };

        let side = match order.side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        match &res {
            Ok(fill) => {
                ORDERS.with_label_values(&[side, "filled"]).inc();
                self.audit(AuditEvent::OrderFilled { side: order.side, fill: fill.clone() }).await;
            }
            Err(e) => {
                ORDERS.with_label_values(&[side, e.label()]).inc();
                warn!(
                    error = %e,
                    cl_id = %order.cl_id,
                    side,
                    symbol = %order.symbol,
                    qty = order.quantity,
                    px = %order.reference_price,
                    "order failed, position unchanged"
                );
                self.audit(AuditEvent::OrderFailed { order: order.clone(), reason: e.to_string() }).await;
            }
        }
        res
    }

    async fn record_transition(&mut self, from: Phase) {
        let p = self.position;
        self.audit(AuditEvent::Transition {
            from,
            to: p.phase(),
            quantity_held: p.quantity_held(),
            entry_price: p.entry_price(),
            stop_price: p.stop_price(),
        })
        .await;
        self.publish_gauges();
    }

    fn publish_gauges(&self) {
        POSITION_QTY.set(self.position.quantity_held().min(i64::MAX as u64) as i64);
        LAST_PRICE.set(gauge_value(self.last_price));
        MAX_PRICE.set(gauge_value(self.position.max_price_seen()));
        STOP_PRICE.set(gauge_value(self.position.stop_price()));
    }

    async fn audit(&mut self, event: AuditEvent) {
        let Some(tx) = &self.audit_tx else {
            return;
        };
        if tx.send(AuditRecord::now(event)).await.is_err() {
            if self.audit_lost {
                debug!("audit sink closed, record dropped");
            } else {
                error!("audit sink closed: audit trail is incomplete from here on");
                self.audit_lost = true;
            }
        }
    }
}
