// ===============================
// src/domain.rs
// ===============================
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Test = divalidasi exchange tanpa dieksekusi, Live = order sungguhan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderMode { Test, Live }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase { Flat, Active }

/// One trade print from the market data stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub ts_ms: i64,
}

/// A post from a watched social account.
///
/// `extended_text` holds the untruncated body when the source sends one; it
/// wins over `text` whenever it is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialEvent {
    pub author_id: u64,
    pub screen_name: String,
    pub text: String,
    pub extended_text: Option<String>,
    pub media_urls: Vec<String>,
}

impl SocialEvent {
    pub fn full_text(&self) -> &str {
        match self.extended_text.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => &self.text,
        }
    }

    pub fn has_media(&self) -> bool {
        !self.media_urls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerDecision { EnterLong, Informational, Ignore }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInstruction {
    pub cl_id: String,
    pub side: Side,
    pub symbol: String,
    pub quantity: u64,
    pub reference_price: Decimal,
    pub mode: OrderMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub cl_id: String,
    pub filled_price: Decimal,
    pub filled_quantity: u64,
    pub ts_ms: i64,
}

// ---- Audit trail (JSONL via recorder) ----
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts_ms: i64,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn now(event: AuditEvent) -> Self {
        Self { ts_ms: now_ms(), event }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    Trigger {
        author_id: u64,
        decision: TriggerDecision,
        text: String,
        last_price: Option<Decimal>,
    },
    EntrySkipped { reason: String },
    OrderSent { order: OrderInstruction },
    OrderFilled { side: Side, fill: OrderFill },
    OrderFailed { order: OrderInstruction, reason: String },
    Breach { price: Decimal, stop_price: Decimal, max_price: Decimal },
    Transition {
        from: Phase,
        to: Phase,
        quantity_held: u64,
        entry_price: Option<Decimal>,
        stop_price: Option<Decimal>,
    },
    TickDropped { symbol: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: &str, extended: Option<&str>) -> SocialEvent {
        SocialEvent {
            author_id: 1,
            screen_name: "someone".into(),
            text: text.into(),
            extended_text: extended.map(str::to_string),
            media_urls: vec![],
        }
    }

    #[test]
    fn extended_text_wins_over_truncated_text() {
        let ev = post("blah blah... Doge", Some("blah blah Dogecoin to the moon!!!"));
        assert_eq!(ev.full_text(), "blah blah Dogecoin to the moon!!!");
    }

    #[test]
    fn empty_extended_text_falls_back() {
        assert_eq!(post("short", Some("")).full_text(), "short");
        assert_eq!(post("short", None).full_text(), "short");
    }

    #[test]
    fn audit_record_serializes_flat_with_kind_tag() {
        let rec = AuditRecord {
            ts_ms: 7,
            event: AuditEvent::EntrySkipped { reason: "no price".into() },
        };
        let v: serde_json::Value = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["ts_ms"], 7);
        assert_eq!(v["kind"], "entry_skipped");
        assert_eq!(v["reason"], "no price");
    }
}
