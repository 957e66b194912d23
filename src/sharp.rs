//! Sharp-money scoring and Pro-system triggers.
//!
//! The sharp score measures how strongly the money% diverges from the
//! ticket% on a side: a minority of tickets carrying a majority of money is
//! the classic sharp footprint. Pro systems are named situational rules
//! that each add a fixed boost when they apply to a candidate selection.

use crate::markets::MarketCategory;
use crate::sources::{MarketSplit, TeamRating};

/// Boost added to the sharp score for each triggered Pro system.
pub const PRO_SYSTEM_BOOST: i32 = 15;

/// Sharp score in [0, 100] from money% and ticket% (both 0–100).
///
/// 60% weight on the money/ticket gap, 30% on ticket minority, 10% on
/// outright money majority.
pub fn sharp_score(money_pct: f64, ticket_pct: f64) -> i32 {
    let clamp01 = |x: f64| x.clamp(0.0, 1.0);
    let gap_score = clamp01((money_pct - ticket_pct) / 15.0);
    let minority_score = clamp01((55.0 - ticket_pct) / 25.0);
    let money_majority = clamp01((money_pct - 50.0) / 20.0);
    let score = 100.0 * (0.60 * gap_score + 0.30 * minority_score + 0.10 * money_majority);
    score.round() as i32
}

/// Display tier for a sharp score.
pub fn tier(score: i32) -> &'static str {
    match score {
        s if s >= 70 => "SHARP",
        s if s >= 45 => "LEAN",
        s if s >= 25 => "NEUTRAL",
        _ => "PUBLIC",
    }
}

/// Everything a Pro-system rule may look at for one candidate selection.
pub struct ProInputs<'a> {
    pub sport: &'a str,
    pub category: MarketCategory,
    /// True when the selection is the Under side of a total.
    pub is_under: bool,
    /// Decimal odds of the selection.
    pub odds: f64,
    /// Total line, when the candidate is a totals market.
    pub total_line: Option<f64>,
    /// Splits for this selection's side, when matched.
    pub splits: Option<&'a MarketSplit>,
    pub home_rating: Option<&'a TeamRating>,
    pub away_rating: Option<&'a TeamRating>,
}

fn combined_tempo(inputs: &ProInputs) -> Option<f64> {
    match (inputs.home_rating, inputs.away_rating) {
        (
            Some(TeamRating::Basketball { tempo: th, .. }),
            Some(TeamRating::Basketball { tempo: ta, .. }),
        ) => Some(th + ta),
        _ => None,
    }
}

fn net_rating_gap(inputs: &ProInputs) -> Option<f64> {
    match (inputs.home_rating, inputs.away_rating) {
        (Some(h), Some(a)) => match (h.adj_em(), a.adj_em()) {
            (Some(he), Some(ae)) => Some((he - ae).abs()),
            _ => None,
        },
        _ => None,
    }
}

/// Evaluate the Pro-system rule set for one candidate. Returns the names of
/// all triggered systems; each is worth [`PRO_SYSTEM_BOOST`] points.
pub fn triggered_systems(inputs: &ProInputs) -> Vec<&'static str> {
    let mut systems = Vec::new();
    let is_side_market = matches!(
        inputs.category,
        MarketCategory::Spread | MarketCategory::Moneyline
    );

    // Sharp money against a lopsided public side in college basketball.
    if inputs.sport == "basketball_ncaab" && is_side_market {
        if let Some(s) = inputs.splits {
            if s.tickets_pct <= 35.0 && s.money_pct >= s.tickets_pct + 15.0 {
                systems.push("Fade Public in Big Conf");
            }
        }
    }

    // Two slow college teams with an inflated total.
    if inputs.sport == "basketball_ncaab"
        && inputs.category == MarketCategory::Total
        && inputs.is_under
    {
        if let (Some(tempo), Some(line)) = (combined_tempo(inputs), inputs.total_line) {
            if tempo <= 132.0 && line >= 140.0 {
                systems.push("Neutral Court Unders");
            }
        }
    }

    // Big NBA favorites against bottom-tier teams late in the season.
    if inputs.sport == "basketball_nba"
        && inputs.category == MarketCategory::Spread
        && inputs.odds <= 2.00
    {
        if let Some(gap) = net_rating_gap(inputs) {
            if gap >= 10.0 {
                systems.push("NBA Tanking System");
            }
        }
    }

    // Slow-pace NBA unders when the market hangs a high number anyway.
    if inputs.sport == "basketball_nba"
        && inputs.category == MarketCategory::Total
        && inputs.is_under
    {
        if let (Some(tempo), Some(line)) = (combined_tempo(inputs), inputs.total_line) {
            if tempo <= 196.0 && line >= 225.0 {
                systems.push("Slow Pace Unders");
            }
        }
    }

    // NFL underdog moneylines that sharps keep buying.
    if inputs.sport == "americanfootball_nfl"
        && inputs.category == MarketCategory::Moneyline
        && inputs.odds > 2.40
    {
        if let Some(s) = inputs.splits {
            if s.money_pct >= 60.0 && s.money_pct > s.tickets_pct {
                systems.push("Live Dog Money");
            }
        }
    }

    systems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_sharp_divergence() {
        // gap=1.0, minority=0.6, money=1.0 → 100·(0.6 + 0.18 + 0.1) = 88
        assert_eq!(sharp_score(80.0, 40.0), 88);
    }

    #[test]
    fn score_no_divergence() {
        // gap=0, minority=(55−50)/25=0.2, money=0 → 100·0.06 = 6
        assert_eq!(sharp_score(50.0, 50.0), 6);
    }

    #[test]
    fn score_public_side_floors_at_zero() {
        assert_eq!(sharp_score(40.0, 80.0), 0);
    }

    #[test]
    fn score_is_bounded() {
        assert!(sharp_score(100.0, 0.0) <= 100);
        assert!(sharp_score(0.0, 100.0) >= 0);
    }

    #[test]
    fn tiers() {
        assert_eq!(tier(88), "SHARP");
        assert_eq!(tier(50), "LEAN");
        assert_eq!(tier(30), "NEUTRAL");
        assert_eq!(tier(6), "PUBLIC");
    }

    #[test]
    fn fade_public_triggers_on_lopsided_splits() {
        let split = MarketSplit {
            money_pct: 55.0,
            tickets_pct: 30.0,
        };
        let inputs = ProInputs {
            sport: "basketball_ncaab",
            category: MarketCategory::Spread,
            is_under: false,
            odds: 1.91,
            total_line: None,
            splits: Some(&split),
            home_rating: None,
            away_rating: None,
        };
        assert_eq!(triggered_systems(&inputs), vec!["Fade Public in Big Conf"]);
    }

    #[test]
    fn tanking_system_needs_rating_gap() {
        let strong = TeamRating::Basketball {
            offensive_eff: 118.0,
            defensive_eff: 108.0,
            tempo: 99.0,
        };
        let weak = TeamRating::Basketball {
            offensive_eff: 108.0,
            defensive_eff: 115.0,
            tempo: 97.0,
        };
        let inputs = ProInputs {
            sport: "basketball_nba",
            category: MarketCategory::Spread,
            is_under: false,
            odds: 1.91,
            total_line: None,
            splits: None,
            home_rating: Some(&strong),
            away_rating: Some(&weak),
        };
        assert_eq!(triggered_systems(&inputs), vec!["NBA Tanking System"]);
    }

    #[test]
    fn no_systems_without_data() {
        let inputs = ProInputs {
            sport: "icehockey_nhl",
            category: MarketCategory::Total,
            is_under: true,
            odds: 1.91,
            total_line: Some(6.5),
            splits: None,
            home_rating: None,
            away_rating: None,
        };
        assert!(triggered_systems(&inputs).is_empty());
    }
}
