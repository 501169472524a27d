//! User-data stream events
//!
//! Frames on the listen-key stream carry their event type in the `"e"`
//! field. Known types are routed to dedicated variants; anything else is
//! surfaced as [`UserDataEvent::Unrecognized`] so protocol drift is visible.

use binance_types::{BinanceError, BinanceResult, FlatRecord, KeyedRecord};
use serde_json::{Map, Value};

/// An event from the private user-data stream
#[derive(Debug, Clone, PartialEq)]
pub enum UserDataEvent {
    /// Order placed, filled, cancelled, or expired
    OrderUpdate {
        event_time: i64,
        transaction_time: i64,
        /// Fields of the `"o"` object (`s`, `S`, `o`, `X`, `i`, ...)
        order: FlatRecord,
    },
    /// Balance and position changes
    AccountUpdate {
        event_time: i64,
        transaction_time: i64,
        /// Why the account changed (`ORDER`, `FUNDING_FEE`, ...)
        reason: String,
        /// Balance rows keyed by asset
        balances: KeyedRecord,
        /// Position rows; hedge mode reports one row per side
        positions: Vec<FlatRecord>,
    },
    /// Margin ratio too high for the listed positions
    MarginCall {
        event_time: i64,
        cross_wallet_balance: String,
        positions: Vec<FlatRecord>,
    },
    /// Leverage or multi-assets mode changed
    AccountConfigUpdate {
        event_time: i64,
        transaction_time: i64,
        fields: FlatRecord,
    },
    /// The listen key is no longer valid; the stream will go quiet
    ListenKeyExpired { event_time: i64 },
    /// Event type this version does not know
    Unrecognized {
        event_type: String,
        fields: FlatRecord,
    },
}

impl UserDataEvent {
    pub const ORDER_TRADE_UPDATE: &'static str = "ORDER_TRADE_UPDATE";
    pub const ACCOUNT_UPDATE: &'static str = "ACCOUNT_UPDATE";
    pub const MARGIN_CALL: &'static str = "MARGIN_CALL";
    pub const ACCOUNT_CONFIG_UPDATE: &'static str = "ACCOUNT_CONFIG_UPDATE";
    pub const LISTEN_KEY_EXPIRED: &'static str = "listenKeyExpired";

    /// Route a parsed frame by its `"e"` discriminator
    ///
    /// # Errors
    /// Returns [`BinanceError::Protocol`] if the frame is not an object, has
    /// no discriminator, or a known event lacks its payload.
    pub fn parse(value: &Value) -> BinanceResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| BinanceError::protocol("user-data frame is not an object", Some(&value.to_string())))?;

        let event_type = object
            .get("e")
            .and_then(Value::as_str)
            .ok_or_else(|| BinanceError::protocol("user-data frame has no event type", Some(&value.to_string())))?;

        let event_time = millis(object, "E");
        let transaction_time = millis(object, "T");

        let event = match event_type {
            Self::ORDER_TRADE_UPDATE => Self::OrderUpdate {
                event_time,
                transaction_time,
                order: FlatRecord::from_object(child(object, "o", value)?),
            },
            Self::ACCOUNT_UPDATE => {
                let account = child(object, "a", value)?;
                Self::AccountUpdate {
                    event_time,
                    transaction_time,
                    reason: account.get("m").and_then(Value::as_str).unwrap_or_default().to_string(),
                    balances: KeyedRecord::from_objects(rows(account, "B"), "a")?,
                    positions: flat_rows(rows(account, "P"))?,
                }
            }
            Self::MARGIN_CALL => Self::MarginCall {
                event_time,
                cross_wallet_balance: object
                    .get("cw")
                    .map(binance_types::stringify)
                    .unwrap_or_default(),
                positions: flat_rows(rows(object, "p"))?,
            },
            Self::ACCOUNT_CONFIG_UPDATE => {
                let config = object
                    .get("ac")
                    .or_else(|| object.get("ai"))
                    .and_then(Value::as_object)
                    .ok_or_else(|| {
                        BinanceError::protocol("config update has no payload", Some(&value.to_string()))
                    })?;
                Self::AccountConfigUpdate {
                    event_time,
                    transaction_time,
                    fields: FlatRecord::from_object(config),
                }
            }
            Self::LISTEN_KEY_EXPIRED => Self::ListenKeyExpired { event_time },
            other => Self::Unrecognized {
                event_type: other.to_string(),
                fields: FlatRecord::from_object(object),
            },
        };

        Ok(event)
    }

    /// The `"e"` value this event was routed on
    pub fn event_type(&self) -> &str {
        match self {
            Self::OrderUpdate { .. } => Self::ORDER_TRADE_UPDATE,
            Self::AccountUpdate { .. } => Self::ACCOUNT_UPDATE,
            Self::MarginCall { .. } => Self::MARGIN_CALL,
            Self::AccountConfigUpdate { .. } => Self::ACCOUNT_CONFIG_UPDATE,
            Self::ListenKeyExpired { .. } => Self::LISTEN_KEY_EXPIRED,
            Self::Unrecognized { event_type, .. } => event_type,
        }
    }

    /// Returns true if the event type was not recognized
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized { .. })
    }
}

/// Epoch millis from a numeric or string field; 0 when absent
fn millis(object: &Map<String, Value>, key: &str) -> i64 {
    match object.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

fn child<'a>(object: &'a Map<String, Value>, key: &str, frame: &Value) -> BinanceResult<&'a Map<String, Value>> {
    object.get(key).and_then(Value::as_object).ok_or_else(|| {
        BinanceError::protocol(format!("event payload '{}' missing", key), Some(&frame.to_string()))
    })
}

fn rows<'a>(object: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn flat_rows(rows: &[Value]) -> BinanceResult<Vec<FlatRecord>> {
    rows.iter().map(FlatRecord::from_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_update() {
        let frame = json!({
            "e": "ORDER_TRADE_UPDATE", "E": 1568879465651u64, "T": 1568879465650u64,
            "o": {"s": "BTCUSDT", "c": "TEST", "S": "SELL", "o": "TRAILING_STOP_MARKET", "q": "0.001", "X": "NEW", "i": 8886774}
        });

        match UserDataEvent::parse(&frame).unwrap() {
            UserDataEvent::OrderUpdate { event_time, transaction_time, order } => {
                assert_eq!(event_time, 1568879465651);
                assert_eq!(transaction_time, 1568879465650);
                assert_eq!(order.get("X"), Some("NEW"));
                assert_eq!(order.get("i"), Some("8886774"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_account_update_keeps_hedge_positions() {
        let frame = json!({
            "e": "ACCOUNT_UPDATE", "E": 1564745798939u64, "T": 1564745798938u64,
            "a": {
                "m": "ORDER",
                "B": [{"a": "USDT", "wb": "122624.12345678", "cw": "100.12345678", "bc": "50.12345678"}],
                "P": [
                    {"s": "BTCUSDT", "pa": "20", "ps": "LONG"},
                    {"s": "BTCUSDT", "pa": "-10", "ps": "SHORT"}
                ]
            }
        });

        match UserDataEvent::parse(&frame).unwrap() {
            UserDataEvent::AccountUpdate { reason, balances, positions, .. } => {
                assert_eq!(reason, "ORDER");
                assert_eq!(balances.get("USDT").and_then(|b| b.get("wb")), Some("122624.12345678"));
                assert_eq!(positions.len(), 2);
                assert_eq!(positions[1].get("ps"), Some("SHORT"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_supplementary_events() {
        let expired = json!({"e": "listenKeyExpired", "E": "1736996475556", "listenKey": "abc"});
        assert_eq!(
            UserDataEvent::parse(&expired).unwrap(),
            UserDataEvent::ListenKeyExpired { event_time: 1736996475556 }
        );

        let margin = json!({"e": "MARGIN_CALL", "E": 1587727187525u64, "cw": "3.16812045", "p": [{"s": "ETHUSDT", "ps": "LONG"}]});
        match UserDataEvent::parse(&margin).unwrap() {
            UserDataEvent::MarginCall { cross_wallet_balance, positions, .. } => {
                assert_eq!(cross_wallet_balance, "3.16812045");
                assert_eq!(positions.len(), 1);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let config = json!({"e": "ACCOUNT_CONFIG_UPDATE", "E": 1611646737479u64, "T": 1611646737476u64, "ac": {"s": "BTCUSDT", "l": 25}});
        match UserDataEvent::parse(&config).unwrap() {
            UserDataEvent::AccountConfigUpdate { fields, .. } => assert_eq!(fields.get("l"), Some("25")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_event_is_surfaced() {
        let frame = json!({"e": "STRATEGY_UPDATE", "E": 1, "su": {"si": 1}});
        let event = UserDataEvent::parse(&frame).unwrap();

        assert!(event.is_unrecognized());
        assert_eq!(event.event_type(), "STRATEGY_UPDATE");
    }

    #[test]
    fn test_missing_discriminator_or_payload() {
        assert!(UserDataEvent::parse(&json!({"E": 1})).unwrap_err().is_protocol_error());
        assert!(UserDataEvent::parse(&json!({"e": "ORDER_TRADE_UPDATE"})).is_err());
        assert!(UserDataEvent::parse(&json!([1])).is_err());
    }
}
