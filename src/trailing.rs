// ===============================
// src/trailing.rs
// ===============================
//
// Trailing stop + position state untuk satu instrumen.
//
// - `max_price_seen` / `stop_price` = None artinya -inf (belum ada anchor).
// - Stop hanya naik (ratchet): dihitung ulang dari max, dan max tidak pernah turun.
// - Breach: price <= stop saat Active. State tidak diubah oleh breach;
//   reset baru terjadi setelah sell terkonfirmasi (`reduce`).
//
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::domain::Phase;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantError {
    #[error("sell confirmed while no quantity is held")]
    SellWhileFlat,
    #[error("sell fill of {filled} exceeds held quantity {held}")]
    Overfill { held: u64, filled: u64 },
    #[error("buy fill while a position of {0} is already open")]
    BuyWhileActive(u64),
    #[error("fill quantity must be positive")]
    ZeroFill,
    #[error("phase {phase:?} does not agree with quantity {quantity}")]
    PhaseMismatch { phase: Phase, quantity: u64 },
    #[error("buy fill of {filled} exceeds ordered quantity {ordered}")]
    BuyOverfill { ordered: u64, filled: u64 },
    #[error("price {0} is outside the representable stop range")]
    PriceOutOfRange(Decimal),
    #[error("stop {stop:?} is not derived from max {max:?}")]
    StopDrift { stop: Option<Decimal>, max: Option<Decimal> },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionState {
    phase: Phase,
    quantity_held: u64,
    entry_price: Option<Decimal>,
    max_price_seen: Option<Decimal>,
    stop_price: Option<Decimal>,
    trailing_fraction: Decimal,
}

impl PositionState {
    /// `trailing_fraction` must lie in (0, 1); config validation enforces it.
    pub fn new(trailing_fraction: Decimal) -> Self {
        Self {
            phase: Phase::Flat,
            quantity_held: 0,
            entry_price: None,
            max_price_seen: None,
            stop_price: None,
            trailing_fraction,
        }
    }

    pub fn phase(&self) -> Phase { self.phase }
    pub fn quantity_held(&self) -> u64 { self.quantity_held }
    pub fn entry_price(&self) -> Option<Decimal> { self.entry_price }
    pub fn max_price_seen(&self) -> Option<Decimal> { self.max_price_seen }
    pub fn stop_price(&self) -> Option<Decimal> { self.stop_price }
    pub fn trailing_fraction(&self) -> Decimal { self.trailing_fraction }

    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    /// `None` when `max * (1 - f)` does not fit in a `Decimal`.
    pub fn stop_for(&self, max: Decimal) -> Option<Decimal> {
        max.checked_mul(Decimal::ONE - self.trailing_fraction)
    }

    /// Buy confirmed: anchor max and stop at the fill price.
    pub fn open(&mut self, fill_price: Decimal, quantity: u64) -> Result<(), InvariantError> {
        if self.is_active() {
            return Err(InvariantError::BuyWhileActive(self.quantity_held));
        }
        if quantity == 0 {
            return Err(InvariantError::ZeroFill);
        }
        let stop = self
            .stop_for(fill_price)
            .ok_or(InvariantError::PriceOutOfRange(fill_price))?;
        self.phase = Phase::Active;
        self.quantity_held = quantity;
        self.entry_price = Some(fill_price);
        self.max_price_seen = Some(fill_price);
        self.stop_price = Some(stop);
        Ok(())
    }

    /// Sell confirmed for `filled` units. Returns the phase afterwards; a
    /// partial fill keeps the position (and its stop) alive.
    pub fn reduce(&mut self, filled: u64) -> Result<Phase, InvariantError> {
        if !self.is_active() || self.quantity_held == 0 {
            return Err(InvariantError::SellWhileFlat);
        }
        if filled == 0 {
            return Err(InvariantError::ZeroFill);
        }
        if filled > self.quantity_held {
            return Err(InvariantError::Overfill { held: self.quantity_held, filled });
        }
        self.quantity_held -= filled;
        if self.quantity_held == 0 {
            self.phase = Phase::Flat;
            self.entry_price = None;
            self.max_price_seen = None;
            self.stop_price = None;
        }
        Ok(self.phase)
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let flat = self.phase == Phase::Flat;
        if flat != (self.quantity_held == 0) {
            return Err(InvariantError::PhaseMismatch {
                phase: self.phase,
                quantity: self.quantity_held,
            });
        }
        if !flat {
            let ok = match (self.max_price_seen, self.stop_price) {
                (Some(max), Some(stop)) => self.stop_for(max) == Some(stop) && stop <= max,
                _ => false,
            };
            if !ok {
                return Err(InvariantError::StopDrift {
                    stop: self.stop_price,
                    max: self.max_price_seen,
                });
            }
        }
        Ok(())
    }
}

/// Feed one price into the calculator. Returns the next state and whether
/// the stop was breached. On breach the state comes back unchanged, and so
/// does a price whose stop cannot be represented.
pub fn update(state: PositionState, price: Decimal) -> (PositionState, bool) {
    if state.is_active() {
        if let Some(stop) = state.stop_price {
            if price <= stop {
                return (state, true);
            }
        }
    }

    let mut next = state;
    let raised = match state.max_price_seen {
        Some(max) => price > max,
        None => true,
    };
    if raised {
        let Some(stop) = state.stop_for(price) else {
            return (state, false);
        };
        next.max_price_seen = Some(price);
        // Flat: bookkeeping saja, stop tetap -inf
        if next.is_active() {
            next.stop_price = Some(stop);
        }
    }
    (next, false)
}
