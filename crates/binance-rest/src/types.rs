//! Typed REST results
//!
//! Every result carries `valid` and `raw_error`. A successful status maps the
//! JSON body through [`RestRecord::from_json`]; any other status produces
//! [`RestRecord::invalid`] with the raw error body.

use binance_types::{stringify, BinanceError, BinanceResult, FlatRecord, KeyedRecord};
use serde_json::{Map, Value};

/// A result type the gateway can materialize from a response
pub trait RestRecord: Sized {
    /// Map the JSON body of a successful response
    ///
    /// # Errors
    /// Returns [`BinanceError::Protocol`] if the body has the wrong shape.
    fn from_json(value: Value) -> BinanceResult<Self>;

    /// Result for a rejected call, carrying the raw error payload
    fn invalid(raw_error: String) -> Self;

    /// Returns true if the exchange accepted the call
    fn is_valid(&self) -> bool;
}

/// Names for the positional fields of a kline row
pub const KLINE_FIELDS: [&str; 11] = [
    "openTime",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "closeTime",
    "quoteAssetVolume",
    "numberOfTrades",
    "takerBuyBaseVolume",
    "takerBuyQuoteVolume",
];

fn into_object(value: Value, what: &str) -> BinanceResult<Map<String, Value>> {
    match value {
        Value::Object(object) => Ok(object),
        other => Err(BinanceError::protocol(
            format!("{} response is not a JSON object", what),
            Some(&other.to_string()),
        )),
    }
}

fn into_array(value: Value, what: &str) -> BinanceResult<Vec<Value>> {
    match value {
        Value::Array(array) => Ok(array),
        other => Err(BinanceError::protocol(
            format!("{} response is not a JSON array", what),
            Some(&other.to_string()),
        )),
    }
}

fn flat_records(values: &[Value]) -> BinanceResult<Vec<FlatRecord>> {
    values.iter().map(FlatRecord::from_value).collect()
}

macro_rules! impl_validity {
    ($ty:ty) => {
        impl $ty {
            fn rejected(raw_error: String) -> Self {
                Self {
                    valid: false,
                    raw_error,
                    ..Default::default()
                }
            }
        }
    };
}

/// Account information: top-level fields, per-asset rows, positions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountInformation {
    pub valid: bool,
    pub raw_error: String,
    /// Scalar fields (totals, flags, update time)
    pub fields: FlatRecord,
    /// Asset rows keyed by asset name
    pub assets: KeyedRecord,
    /// Position rows; hedge mode reports one row per side
    pub positions: Vec<FlatRecord>,
}

impl_validity!(AccountInformation);

impl RestRecord for AccountInformation {
    fn from_json(value: Value) -> BinanceResult<Self> {
        let mut object = into_object(value, "account information")?;

        let assets = match object.remove("assets") {
            Some(Value::Array(rows)) => KeyedRecord::from_objects(&rows, "asset")?,
            Some(other) => {
                return Err(BinanceError::protocol("assets is not an array", Some(&other.to_string())))
            }
            None => KeyedRecord::new(),
        };
        let positions = match object.remove("positions") {
            Some(Value::Array(rows)) => flat_records(&rows)?,
            Some(other) => {
                return Err(BinanceError::protocol("positions is not an array", Some(&other.to_string())))
            }
            None => Vec::new(),
        };

        Ok(Self {
            valid: true,
            raw_error: String::new(),
            fields: FlatRecord::from_object(&object),
            assets,
            positions,
        })
    }

    fn invalid(raw_error: String) -> Self {
        Self::rejected(raw_error)
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Account balances keyed by asset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountBalance {
    pub valid: bool,
    pub raw_error: String,
    pub balances: KeyedRecord,
}

impl_validity!(AccountBalance);

impl RestRecord for AccountBalance {
    fn from_json(value: Value) -> BinanceResult<Self> {
        let rows = into_array(value, "account balance")?;
        Ok(Self {
            valid: true,
            raw_error: String::new(),
            balances: KeyedRecord::from_objects(&rows, "asset")?,
        })
    }

    fn invalid(raw_error: String) -> Self {
        Self::rejected(raw_error)
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Acknowledgement of a new order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewOrderResult {
    pub valid: bool,
    pub raw_error: String,
    pub order: FlatRecord,
}

impl_validity!(NewOrderResult);

impl RestRecord for NewOrderResult {
    fn from_json(value: Value) -> BinanceResult<Self> {
        let object = into_object(value, "new order")?;
        Ok(Self {
            valid: true,
            raw_error: String::new(),
            order: FlatRecord::from_object(&object),
        })
    }

    fn invalid(raw_error: String) -> Self {
        Self::rejected(raw_error)
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// State of a cancelled order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CancelOrderResult {
    pub valid: bool,
    pub raw_error: String,
    pub order: FlatRecord,
}

impl_validity!(CancelOrderResult);

impl RestRecord for CancelOrderResult {
    fn from_json(value: Value) -> BinanceResult<Self> {
        let object = into_object(value, "cancel order")?;
        Ok(Self {
            valid: true,
            raw_error: String::new(),
            order: FlatRecord::from_object(&object),
        })
    }

    fn invalid(raw_error: String) -> Self {
        Self::rejected(raw_error)
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Order history, oldest first as returned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllOrdersResult {
    pub valid: bool,
    pub raw_error: String,
    pub orders: Vec<FlatRecord>,
}

impl_validity!(AllOrdersResult);

impl RestRecord for AllOrdersResult {
    fn from_json(value: Value) -> BinanceResult<Self> {
        let rows = into_array(value, "all orders")?;
        Ok(Self {
            valid: true,
            raw_error: String::new(),
            orders: flat_records(&rows)?,
        })
    }

    fn invalid(raw_error: String) -> Self {
        Self::rejected(raw_error)
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Kline history
///
/// The exchange sends each candle as a positional array; rows are mapped to
/// the names in [`KLINE_FIELDS`]. Trailing positions without a name are
/// dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KlineCandlestick {
    pub valid: bool,
    pub raw_error: String,
    pub candles: Vec<FlatRecord>,
}

impl_validity!(KlineCandlestick);

impl RestRecord for KlineCandlestick {
    fn from_json(value: Value) -> BinanceResult<Self> {
        let rows = into_array(value, "klines")?;
        let candles = rows
            .iter()
            .map(|row| match row {
                Value::Array(columns) => Ok(KLINE_FIELDS
                    .iter()
                    .zip(columns)
                    .map(|(name, column)| (*name, stringify(column)))
                    .collect()),
                other => Err(BinanceError::protocol(
                    "kline row is not an array",
                    Some(&other.to_string()),
                )),
            })
            .collect::<BinanceResult<Vec<FlatRecord>>>()?;

        Ok(Self {
            valid: true,
            raw_error: String::new(),
            candles,
        })
    }

    fn invalid(raw_error: String) -> Self {
        Self::rejected(raw_error)
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Taker buy/sell volume entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TakerBuySellVolume {
    pub valid: bool,
    pub raw_error: String,
    pub entries: Vec<FlatRecord>,
}

impl_validity!(TakerBuySellVolume);

impl RestRecord for TakerBuySellVolume {
    fn from_json(value: Value) -> BinanceResult<Self> {
        let rows = into_array(value, "taker buy/sell volume")?;
        Ok(Self {
            valid: true,
            raw_error: String::new(),
            entries: flat_records(&rows)?,
        })
    }

    fn invalid(raw_error: String) -> Self {
        Self::rejected(raw_error)
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// A freshly created listen key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListenKeyResult {
    pub valid: bool,
    pub raw_error: String,
    pub listen_key: String,
}

impl_validity!(ListenKeyResult);

impl RestRecord for ListenKeyResult {
    fn from_json(value: Value) -> BinanceResult<Self> {
        let object = into_object(value, "listen key")?;
        let listen_key = object
            .get("listenKey")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if listen_key.is_empty() {
            return Err(BinanceError::protocol(
                "listen key response has no listenKey",
                Some(&Value::Object(object).to_string()),
            ));
        }

        Ok(Self {
            valid: true,
            raw_error: String::new(),
            listen_key,
        })
    }

    fn invalid(raw_error: String) -> Self {
        Self::rejected(raw_error)
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}
