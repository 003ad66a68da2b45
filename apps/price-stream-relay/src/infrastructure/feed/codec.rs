//! TrueData Codec
//!
//! Encoding and decoding for the TrueData real-time JSON protocol.
//!
//! # Inbound
//!
//! Every message is a single JSON object. The shape is recognised by its keys:
//!
//! ```json
//! {"trade": ["100000737", "2024-03-15T09:15:01", "128.50", ...]}
//! {"success": true, "symbolsadded": 2, "symbollist": [["100000737", "ITC", "...", "128.45", ...], ...]}
//! {"NSE_EQ": "OPEN"}
//! ```
//!
//! Trade ticks carry the price at index 2, snapshot rows at index 3. Prices may
//! be strings or numbers; `null`, `""` or a missing element mean "no price".
//!
//! # Outbound
//!
//! ```json
//! {"method": "addsymbol", "symbols": ["ITC", "TCS"]}
//! {"method": "getmarketstatus"}
//! ```

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::application::ports::{CodecError, FeedEvent, FeedTick};
use crate::domain::market::MarketStatus;
use crate::domain::symbols::{Symbol, UpstreamId};

const TRADE_KEY: &str = "trade";
const SNAPSHOT_KEY: &str = "symbolsadded";
const SNAPSHOT_LIST_KEY: &str = "symbollist";
const TRADE_PRICE_INDEX: usize = 2;
const SNAPSHOT_PRICE_INDEX: usize = 3;

#[derive(Serialize)]
struct Request<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbols: Option<&'a [Symbol]>,
}

/// JSON codec for the TrueData feed.
#[derive(Debug, Clone)]
pub struct TrueDataCodec {
    market_status_key: String,
}

impl Default for TrueDataCodec {
    fn default() -> Self {
        Self::new("NSE_EQ")
    }
}

impl TrueDataCodec {
    /// Create a codec that reads market status from `market_status_key`.
    #[must_use]
    pub fn new(market_status_key: impl Into<String>) -> Self {
        Self {
            market_status_key: market_status_key.into(),
        }
    }

    /// Encode the subscription request for `symbols`.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_subscribe(&self, symbols: &[Symbol]) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Request {
            method: "addsymbol",
            symbols: Some(symbols),
        })
    }

    /// Encode the market status poll.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_market_status_request(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Request {
            method: "getmarketstatus",
            symbols: None,
        })
    }

    /// Decode one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON, not a recognised message, or
    /// a trade tick is malformed.
    pub fn decode(&self, text: &str) -> Result<FeedEvent, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;
        let Value::Object(map) = value else {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}",
                preview(text)
            )));
        };

        if let Some(trade) = map.get(TRADE_KEY) {
            return decode_trade(trade).map(FeedEvent::Trade);
        }

        if map.contains_key(SNAPSHOT_KEY) {
            return match map.get(SNAPSHOT_LIST_KEY) {
                Some(rows) => decode_snapshot(rows).map(FeedEvent::Snapshot),
                None => Ok(FeedEvent::Snapshot(Vec::new())),
            };
        }

        if let Some(status) = map.get(&self.market_status_key) {
            return Ok(FeedEvent::Status(MarketStatus::new(status.clone())));
        }

        Err(CodecError::Unrecognised(preview(text)))
    }
}

fn decode_trade(value: &Value) -> Result<FeedTick, CodecError> {
    let fields = value
        .as_array()
        .ok_or_else(|| CodecError::InvalidFormat("trade is not an array".to_string()))?;

    let upstream_id = fields
        .first()
        .and_then(upstream_id)
        .ok_or_else(|| CodecError::InvalidFormat("trade has no instrument id".to_string()))?;

    let price = match fields.get(TRADE_PRICE_INDEX) {
        Some(raw) => parse_price(raw)
            .ok_or_else(|| CodecError::InvalidFormat(format!("invalid trade price: {raw}")))?,
        None => None,
    };

    Ok(FeedTick { upstream_id, price })
}

/// Malformed rows are skipped; a malformed list is an error.
fn decode_snapshot(value: &Value) -> Result<Vec<FeedTick>, CodecError> {
    let rows = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(rows) => rows,
        _ => {
            return Err(CodecError::InvalidFormat(
                "symbollist is not an array".to_string(),
            ));
        }
    };

    let ticks = rows
        .iter()
        .filter_map(Value::as_array)
        .filter_map(|fields| {
            let upstream_id = fields.first().and_then(upstream_id)?;
            let price = fields
                .get(SNAPSHOT_PRICE_INDEX)
                .and_then(parse_price)
                .flatten();
            Some(FeedTick { upstream_id, price })
        })
        .collect();

    Ok(ticks)
}

fn upstream_id(value: &Value) -> Option<UpstreamId> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(UpstreamId::new(s.trim())),
        Value::Number(n) => Some(UpstreamId::new(n.to_string())),
        _ => None,
    }
}

/// `Some(None)` means "no price"; `None` means the value is not a price.
fn parse_price(value: &Value) -> Option<Option<Decimal>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) if s.trim().is_empty() => Some(None),
        Value::String(s) => parse_decimal(s.trim()).map(Some),
        Value::Number(n) => parse_decimal(&n.to_string()).map(Some),
        _ => None,
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn preview(text: &str) -> String {
    text.trim().chars().take(80).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn codec() -> TrueDataCodec {
        TrueDataCodec::default()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test_case(r#"{"trade":["100000737",null,"128.50"]}"#, Some("128.50") ; "string price")]
    #[test_case(r#"{"trade":["100000737","2024-03-15T09:15:01",128.5,"1200"]}"#, Some("128.5") ; "numeric price")]
    #[test_case(r#"{"trade":["100000737","ts",null]}"#, None ; "null price")]
    #[test_case(r#"{"trade":["100000737","ts",""]}"#, None ; "empty price")]
    #[test_case(r#"{"trade":["100000737"]}"#, None ; "missing price")]
    fn decodes_trade(text: &str, price: Option<&str>) {
        let event = codec().decode(text).unwrap();
        assert_eq!(
            event,
            FeedEvent::Trade(FeedTick {
                upstream_id: UpstreamId::new("100000737"),
                price: price.map(dec),
            })
        );
    }

    #[test]
    fn string_price_keeps_scale() {
        let FeedEvent::Trade(tick) = codec().decode(r#"{"trade":["1",null,"128.50"]}"#).unwrap() else {
            panic!("expected trade");
        };
        assert_eq!(tick.price.unwrap().to_string(), "128.50");
    }

    #[test]
    fn numeric_upstream_id() {
        let FeedEvent::Trade(tick) = codec().decode(r#"{"trade":[100000737,null,"1"]}"#).unwrap() else {
            panic!("expected trade");
        };
        assert_eq!(tick.upstream_id.as_str(), "100000737");
    }

    #[test_case(r#"{"trade":"oops"}"# ; "trade not array")]
    #[test_case(r#"{"trade":[]}"# ; "trade without id")]
    #[test_case(r#"{"trade":["1",null,"abc"]}"# ; "trade with garbage price")]
    #[test_case(r#"{"trade":["1",null,{"p":1}]}"# ; "trade with object price")]
    #[test_case(r#"{"symbolsadded":1,"symbollist":"oops"}"# ; "snapshot list not array")]
    #[test_case(r#"["trade"]"# ; "top level array")]
    fn rejects_malformed(text: &str) {
        assert!(matches!(
            codec().decode(text),
            Err(CodecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(codec().decode("{not json"), Err(CodecError::Json(_))));
    }

    #[test]
    fn unrecognised_object() {
        let text = r#"{"success":true,"message":"TrueData Real Time Data Service"}"#;
        assert!(matches!(
            codec().decode(text),
            Err(CodecError::Unrecognised(_))
        ));
    }

    #[test]
    fn decodes_snapshot() {
        let text = json!({
            "success": true,
            "symbolsadded": 3,
            "symbollist": [
                ["100000737", "ITC", "2024-03-15T09:15:00", "128.45"],
                ["100002285", "TCS", "2024-03-15T09:15:00", null],
                ["100001262", "INFY", "2024-03-15T09:15:00", 1520.1],
                "not a row",
                [null, "BROKEN"]
            ]
        })
        .to_string();

        let FeedEvent::Snapshot(ticks) = codec().decode(&text).unwrap() else {
            panic!("expected snapshot");
        };

        assert_eq!(
            ticks,
            vec![
                FeedTick {
                    upstream_id: UpstreamId::new("100000737"),
                    price: Some(dec("128.45")),
                },
                FeedTick {
                    upstream_id: UpstreamId::new("100002285"),
                    price: None,
                },
                FeedTick {
                    upstream_id: UpstreamId::new("100001262"),
                    price: Some(dec("1520.1")),
                },
            ]
        );
    }

    #[test]
    fn snapshot_without_list_is_empty() {
        assert_eq!(
            codec().decode(r#"{"symbolsadded":0}"#).unwrap(),
            FeedEvent::Snapshot(vec![])
        );
    }

    #[test_case(r#"{"NSE_EQ":"OPEN"}"#, &json!("OPEN") ; "string status")]
    #[test_case(r#"{"NSE_EQ":{"status":"CLOSED","time":"15:30"},"NSE_FO":"CLOSED"}"#, &json!({"status":"CLOSED","time":"15:30"}) ; "object status")]
    fn decodes_status(text: &str, expected: &Value) {
        assert_eq!(
            codec().decode(text).unwrap(),
            FeedEvent::Status(MarketStatus::new(expected.clone()))
        );
    }

    #[test]
    fn custom_market_status_key() {
        let codec = TrueDataCodec::new("NSE_FO");
        assert_eq!(
            codec.decode(r#"{"NSE_FO":"OPEN"}"#).unwrap(),
            FeedEvent::Status(MarketStatus::new(json!("OPEN")))
        );
        assert!(codec.decode(r#"{"NSE_EQ":"OPEN"}"#).is_err());
    }

    #[test]
    fn trade_takes_precedence_over_status() {
        let text = r#"{"NSE_EQ":"OPEN","trade":["1",null,"2"]}"#;
        assert!(matches!(codec().decode(text).unwrap(), FeedEvent::Trade(_)));
    }

    #[test]
    fn encodes_requests() {
        let symbols = vec![Symbol::from("ITC"), Symbol::from("TCS")];
        assert_eq!(
            codec().encode_subscribe(&symbols).unwrap(),
            r#"{"method":"addsymbol","symbols":["ITC","TCS"]}"#
        );
        assert_eq!(
            codec().encode_market_status_request().unwrap(),
            r#"{"method":"getmarketstatus"}"#
        );
    }
}
