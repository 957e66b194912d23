//! Market-key and selection classification.
//!
//! Everything downstream of the process stage keys conflict resolution on a
//! `MarketCategory`: at most one pending bet per (game, category), and the
//! Swap Rule compares candidates within a category.

use serde::{Deserialize, Serialize};

/// Logical bet category. First-half variants are distinct categories: a 1H
/// total never conflicts with a full-game total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketCategory {
    Spread,
    Moneyline,
    Total,
    FirstHalfSpread,
    FirstHalfMoneyline,
    FirstHalfTotal,
}

impl MarketCategory {
    /// Map an odds-feed market key (The Odds API taxonomy) to a category.
    /// Player-prop keys return `None`; they are handled separately.
    pub fn from_market_key(key: &str) -> Option<Self> {
        match key {
            "h2h" => Some(Self::Moneyline),
            "spreads" => Some(Self::Spread),
            "totals" | "alternate_totals" => Some(Self::Total),
            "h2h_h1" => Some(Self::FirstHalfMoneyline),
            "spreads_h1" => Some(Self::FirstHalfSpread),
            "totals_h1" => Some(Self::FirstHalfTotal),
            _ => None,
        }
    }

    /// Classify a stored selection string ("Over 138.5", "Celtics -3.5",
    /// "1H Sixers ML", "Draw"). Used to categorize pending bets loaded from
    /// the intelligence log, where only the selection survives.
    pub fn from_selection(selection: &str) -> Self {
        let (first_half, body) = match selection.strip_prefix("1H ") {
            Some(rest) => (true, rest),
            None => (false, selection),
        };
        let body = body.trim();
        let is_total = body.starts_with("Over ") || body.starts_with("Under ");
        let is_spread = !is_total
            && body.split_whitespace().last().is_some_and(|tok| {
                (tok.starts_with('+') || tok.starts_with('-'))
                    && tok[1..].parse::<f64>().is_ok()
            });
        match (first_half, is_total, is_spread) {
            (false, true, _) => Self::Total,
            (false, false, true) => Self::Spread,
            (false, false, false) => Self::Moneyline,
            (true, true, _) => Self::FirstHalfTotal,
            (true, false, true) => Self::FirstHalfSpread,
            (true, false, false) => Self::FirstHalfMoneyline,
        }
    }

    pub fn is_first_half(&self) -> bool {
        matches!(
            self,
            Self::FirstHalfSpread | Self::FirstHalfMoneyline | Self::FirstHalfTotal
        )
    }

    pub fn is_total(&self) -> bool {
        matches!(self, Self::Total | Self::FirstHalfTotal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spread => "SPREAD",
            Self::Moneyline => "ML",
            Self::Total => "TOTAL",
            Self::FirstHalfSpread => "1H_SPREAD",
            Self::FirstHalfMoneyline => "1H_ML",
            Self::FirstHalfTotal => "1H_TOTAL",
        }
    }
}

/// Whether an odds-feed market key is a player prop.
pub fn is_player_prop(market_key: &str) -> bool {
    market_key.starts_with("player_")
}

/// Lowercase alnum slug for a selection, used in deterministic event ids.
pub fn selection_slug(selection: &str) -> String {
    selection
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Deterministic event id: `<game_id>_<selection-slug>`.
pub fn event_id(game_id: &str, selection: &str) -> String {
    format!("{}_{}", game_id, selection_slug(selection))
}

/// Recover the game id from an event id given its selection.
pub fn game_id_from_event(event_id: &str, selection: &str) -> Option<String> {
    let suffix = format!("_{}", selection_slug(selection));
    event_id.strip_suffix(&suffix).map(str::to_string)
}

/// Cross-run bet signature: `"<away> @ <home> [<selection>]"`.
pub fn bet_signature(away: &str, home: &str, selection: &str) -> String {
    format!("{} @ {} [{}]", away, home, selection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_key_classification() {
        assert_eq!(
            MarketCategory::from_market_key("h2h"),
            Some(MarketCategory::Moneyline)
        );
        assert_eq!(
            MarketCategory::from_market_key("alternate_totals"),
            Some(MarketCategory::Total)
        );
        assert_eq!(
            MarketCategory::from_market_key("spreads_h1"),
            Some(MarketCategory::FirstHalfSpread)
        );
        assert_eq!(MarketCategory::from_market_key("player_points"), None);
        assert!(is_player_prop("player_points"));
    }

    #[test]
    fn selection_classification() {
        assert_eq!(
            MarketCategory::from_selection("Over 138.5"),
            MarketCategory::Total
        );
        assert_eq!(
            MarketCategory::from_selection("Celtics -3.5"),
            MarketCategory::Spread
        );
        assert_eq!(
            MarketCategory::from_selection("Celtics ML"),
            MarketCategory::Moneyline
        );
        assert_eq!(
            MarketCategory::from_selection("Draw"),
            MarketCategory::Moneyline
        );
        assert_eq!(
            MarketCategory::from_selection("1H Under 70.5"),
            MarketCategory::FirstHalfTotal
        );
        assert_eq!(
            MarketCategory::from_selection("1H Sixers +2.0"),
            MarketCategory::FirstHalfSpread
        );
    }

    #[test]
    fn event_id_round_trip() {
        let id = event_id("abc123", "Over 138.5");
        assert_eq!(id, "abc123_over_138_5");
        assert_eq!(
            game_id_from_event(&id, "Over 138.5").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn signature_format() {
        assert_eq!(
            bet_signature("Sixers", "Celtics", "Over 139.5"),
            "Sixers @ Celtics [Over 139.5]"
        );
    }
}
