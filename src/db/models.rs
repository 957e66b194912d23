use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::markets::MarketCategory;
use crate::models::RatingFeatures;

/// Whether an opportunity inserts a row or revokes a prior pending bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    Insert,
    Delete,
}

/// The unit written to the intelligence log: one recommended bet.
#[derive(Debug, Clone)]
pub struct Opportunity {
    /// Deterministic `<game_id>_<selection-slug>`.
    pub event_id: String,
    pub game_id: String,
    pub timestamp: DateTime<Utc>,
    pub kickoff: DateTime<Utc>,
    pub sport: String,
    /// `"<away> @ <home>"`.
    pub teams: String,
    pub selection: String,
    /// Bookmaker the price was taken from.
    pub book: String,
    /// Odds-feed market key (`h2h`, `totals`, ...).
    pub market_key: String,
    pub category: MarketCategory,
    /// Decimal odds.
    pub odds: f64,
    pub true_prob: f64,
    /// `true_prob − 1/odds`.
    pub edge: f64,
    pub stake: f64,
    /// `model`, `sharp_signal`, `PRO:<systems>`, `stale_update`, `model_v2`.
    pub trigger_type: String,
    pub sharp_score: i32,
    pub ticket_pct: Option<f64>,
    pub money_pct: Option<f64>,
    pub home_rest: Option<i64>,
    pub away_rest: Option<i64>,
    /// Up to three assigned referees.
    pub referees: Vec<String>,
    pub features: RatingFeatures,
    pub metadata: Map<String, Value>,
    pub op_type: OpType,
}

/// A currently-PENDING bet loaded from the intelligence log at fetch time.
#[derive(Debug, Clone)]
pub struct PendingBet {
    pub event_id: String,
    pub game_id: String,
    pub selection: String,
    pub teams: String,
    pub sport: String,
    pub odds: f64,
    pub edge: f64,
    pub category: MarketCategory,
}

/// Summary returned by the transactional persist.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistStats {
    pub inserted: usize,
    pub deleted: usize,
    pub calibration_rows: usize,
    pub calibration_failures: usize,
}

/// JSON number that is safe to persist: NaN/Inf become null instead of
/// poisoning the metadata blob.
pub fn json_num(x: f64) -> Value {
    serde_json::Number::from_f64(x).map_or(Value::Null, Value::Number)
}

/// Recursively replace any non-finite leaf with null. Numbers built through
/// serde_json are already finite; this guards values arriving from source
/// payloads deserialized elsewhere.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_json(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}
