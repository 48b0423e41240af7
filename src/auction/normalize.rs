//! Store record normalization
//!
//! Records coming from the store are loosely typed: amounts may be numbers or
//! numeric-looking strings, display fields may be missing or null. This is the
//! only place where such records are coerced into the canonical shapes; the
//! rest of the crate only sees [`ItemChange`] and [`AuctionItem`].
use super::*;
use serde_json::Value;

/// An item record exactly as the store reported it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawItem {
    pub id: Option<Value>,
    pub title: Option<Value>,
    pub name: Option<Value>,
    pub description: Option<Value>,
    pub category: Option<Value>,
    #[serde(alias = "startingPrice")]
    pub starting_price: Option<Value>,
    #[serde(alias = "currentBid")]
    pub current_bid: Option<Value>,
    #[serde(alias = "highBidder")]
    pub high_bidder: Option<Value>,
    #[serde(alias = "tableNumber")]
    pub table_number: Option<Value>,
    #[serde(alias = "updatedAt")]
    pub updated_at: Option<Value>,
}

impl From<&AuctionItem> for RawItem {
    fn from(item: &AuctionItem) -> Self {
        Self {
            id: Some(Value::from(item.id.clone())),
            title: Some(Value::from(item.title.clone())),
            name: None,
            description: Some(Value::from(item.description.clone())),
            category: Some(Value::from(item.category.clone())),
            starting_price: Some(Value::from(item.starting_price)),
            current_bid: Some(Value::from(item.current_bid)),
            high_bidder: Some(Value::from(item.high_bidder.clone())),
            table_number: item.table_number.map(Value::from),
            updated_at: item.updated_at.map(|t| Value::from(t.to_rfc3339())),
        }
    }
}

/// Normalize a raw record into a partial change
///
/// Returns `None` for records that can't be keyed (no usable id).
pub fn normalize_change(raw: RawItem) -> Option<ItemChange> {
    let id = text(&raw.id)?;

    Some(ItemChange {
        id,
        title: text(&raw.title).or_else(|| text(&raw.name)),
        description: text(&raw.description),
        category: text(&raw.category),
        starting_price: amount(&raw.starting_price),
        current_bid: amount(&raw.current_bid),
        high_bidder: text(&raw.high_bidder),
        table_number: table_number(&raw.table_number),
        updated_at: timestamp(&raw.updated_at),
    })
}

/// Normalize a change-stream record, which may not even be an object
pub fn normalize_record(record: Value) -> Option<ItemChange> {
    serde_json::from_value::<RawItem>(record)
        .ok()
        .and_then(normalize_change)
}

/// Normalize a raw record into a full item with display defaults applied
pub fn normalize_item(raw: RawItem) -> Option<AuctionItem> {
    normalize_change(raw).map(ItemChange::into_item)
}

/// Normalize a full listing, dropping records that can't be used
pub fn normalize_items(raws: Vec<RawItem>) -> Vec<AuctionItem> {
    raws.into_iter()
        .filter_map(|raw| {
            let item = normalize_item(raw.clone());
            if item.is_none() {
                tracing::warn!(record = ?raw, "dropping store record without an id");
            }
            item
        })
        .collect()
}

pub(crate) fn text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_owned())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn number(value: &Option<Value>) -> Option<f64> {
    let n = match value.as_ref()? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n >= 0.0).then_some(n)
}

fn amount(value: &Option<Value>) -> Option<Amount> {
    number(value).map(|n| n.round() as Amount)
}

fn table_number(value: &Option<Value>) -> Option<TableNumber> {
    number(value)
        .map(|n| n.round())
        .filter(|n| *n >= 1.0 && *n <= f64::from(TableNumber::MAX))
        .map(|n| n as TableNumber)
}

fn timestamp(value: &Option<Value>) -> Option<DateTime<Utc>> {
    let Value::String(s) = value.as_ref()? else {
        return None;
    };
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    // `timestamp without time zone` columns serialize without an offset
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}
