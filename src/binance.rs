// ===============================
// src/binance.rs
// ===============================
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;

use crate::domain::PriceTick;

pub fn timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

pub fn sign_query(secret: &str, query: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC key");
    mac.update(query.as_bytes());
    let sig = mac.finalize().into_bytes();
    hex::encode(sig)
}

pub fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// ---- `<symbol>@trade` stream ----
// {"e":"trade","E":123456789,"s":"BNBBTC","t":12345,"p":"0.001","q":"100","T":123456785,"m":true}
#[derive(Debug, Deserialize)]
pub struct TradeMsg {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
}

impl TradeMsg {
    /// Decimal parse of the string fields. Non-positive prices are refused.
    pub fn into_tick(self) -> Result<PriceTick, String> {
        let price = Decimal::from_str(&self.price).map_err(|e| format!("price {:?}: {e}", self.price))?;
        let quantity =
            Decimal::from_str(&self.quantity).map_err(|e| format!("quantity {:?}: {e}", self.quantity))?;
        if price <= Decimal::ZERO {
            return Err(format!("non-positive price {price}"));
        }
        Ok(PriceTick { symbol: self.symbol, price, quantity, ts_ms: self.trade_time })
    }
}

// ---- REST order response (newOrderRespType=FULL) ----
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default)]
    pub status: String,
    pub executed_qty: String,
    #[serde(default)]
    pub cummulative_quote_qty: Option<String>,
    #[serde(default)]
    pub fills: Vec<OrderFillPart>,
}

#[derive(Debug, Deserialize)]
pub struct OrderFillPart {
    pub price: String,
    pub qty: String,
}

impl OrderResponse {
    /// (volume-weighted price, executed quantity). `None` price when nothing
    /// traded.
    pub fn fill_summary(&self) -> Result<(Option<Decimal>, Decimal), String> {
        let dec = |s: &str| Decimal::from_str(s).map_err(|e| format!("{s:?}: {e}"));
        let executed = dec(&self.executed_qty)?;
        if executed.is_zero() {
            return Ok((None, executed));
        }

        let mut notional = Decimal::ZERO;
        let mut qty = Decimal::ZERO;
        for f in &self.fills {
            let q = dec(&f.qty)?;
            notional += dec(&f.price)? * q;
            qty += q;
        }
        if !qty.is_zero() {
            return Ok((Some(notional / qty), executed));
        }
        // tanpa detail fills: pakai cummulativeQuoteQty / executedQty
        match self.cummulative_quote_qty.as_deref() {
            Some(cq) => Ok((Some(dec(cq)? / executed), executed)),
            None => Ok((None, executed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signature_matches_binance_docs_example() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            sign_query(secret, query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn params_are_url_encoded_in_order() {
        let q = encode_params(&[("symbol", "DOGEUSDT".into()), ("newClientOrderId", "a b".into())]);
        assert_eq!(q, "symbol=DOGEUSDT&newClientOrderId=a%20b");
    }

    #[test]
    fn trade_message_becomes_tick() {
        let txt = r#"{"e":"trade","E":123456789,"s":"DOGEUSDT","t":12345,"p":"0.07215","q":"1500","T":123456785,"m":true}"#;
        let tick = serde_json::from_str::<TradeMsg>(txt).unwrap().into_tick().unwrap();
        assert_eq!(tick.symbol, "DOGEUSDT");
        assert_eq!(tick.price, dec!(0.07215));
        assert_eq!(tick.quantity, dec!(1500));
        assert_eq!(tick.ts_ms, 123456785);
    }

    #[test]
    fn malformed_trade_price_is_refused() {
        let bad = TradeMsg { symbol: "X".into(), price: "abc".into(), quantity: "1".into(), trade_time: 0 };
        assert!(bad.into_tick().is_err());
        let zero = TradeMsg { symbol: "X".into(), price: "0.0".into(), quantity: "1".into(), trade_time: 0 };
        assert!(zero.into_tick().is_err());
    }

    #[test]
    fn fill_summary_is_volume_weighted() {
        let txt = r#"{
            "symbol":"DOGEUSDT","orderId":1,"clientOrderId":"CL-1","status":"FILLED",
            "executedQty":"200","cummulativeQuoteQty":"23.0",
            "fills":[{"price":"0.10","qty":"100","commission":"0","commissionAsset":"DOGE"},
                     {"price":"0.13","qty":"100","commission":"0","commissionAsset":"DOGE"}]
        }"#;
        let rsp: OrderResponse = serde_json::from_str(txt).unwrap();
        let (px, qty) = rsp.fill_summary().unwrap();
        assert_eq!(qty, dec!(200));
        assert_eq!(px, Some(dec!(0.115)));
    }

    #[test]
    fn fill_summary_without_fills_uses_quote_qty() {
        let txt = r#"{"executedQty":"10","cummulativeQuoteQty":"2.5"}"#;
        let rsp: OrderResponse = serde_json::from_str(txt).unwrap();
        assert_eq!(rsp.fill_summary().unwrap(), (Some(dec!(0.25)), dec!(10)));
    }

    #[test]
    fn unfilled_response_has_no_price() {
        let rsp: OrderResponse = serde_json::from_str(r#"{"executedQty":"0.00000000"}"#).unwrap();
        assert_eq!(rsp.fill_summary().unwrap(), (None, Decimal::ZERO));
    }
}
