//! Basketball (NBA / NCAAB) pre-game match model.
//!
//! Pace × efficiency: expected possessions are the average of both tempos,
//! each side's expected points come from the meeting of its offensive
//! efficiency with the opponent's defensive efficiency, and home-court
//! advantage is added to the margin.

use super::probability::sigmoid;
use super::{MatchStats, RatingFeatures};

/// Home-court advantage in points.
pub const NBA_HOME_ADVANTAGE: f64 = 2.5;
pub const NCAAB_HOME_ADVANTAGE: f64 = 3.0;

/// Totals σ relative to margin σ; totals are noisier than margins.
pub const TOTAL_SIGMA_RATIO: f64 = 1.35;

#[derive(Debug, Clone, Copy)]
pub struct BasketballRating {
    pub offensive_eff: f64,
    pub defensive_eff: f64,
    pub tempo: f64,
}

/// Expected margin / total / dispersion for a basketball matchup.
/// `margin_std` comes from config (sport-specific σ).
pub fn match_stats(
    home: &BasketballRating,
    away: &BasketballRating,
    home_advantage: f64,
    margin_std: f64,
) -> MatchStats {
    let possessions = (home.tempo + away.tempo) / 2.0;
    let home_pts = possessions * ((home.offensive_eff + away.defensive_eff) / 2.0) / 100.0;
    let away_pts = possessions * ((away.offensive_eff + home.defensive_eff) / 2.0) / 100.0;
    MatchStats {
        expected_margin: home_pts - away_pts + home_advantage,
        expected_total: home_pts + away_pts,
        margin_std,
        total_std: margin_std * TOTAL_SIGMA_RATIO,
        features: RatingFeatures {
            home_adj_em: Some(home.offensive_eff - home.defensive_eff),
            away_adj_em: Some(away.offensive_eff - away.defensive_eff),
            home_adj_o: Some(home.offensive_eff),
            away_adj_o: Some(away.offensive_eff),
            home_adj_d: Some(home.defensive_eff),
            away_adj_d: Some(away.defensive_eff),
            home_tempo: Some(home.tempo),
            away_tempo: Some(away.tempo),
        },
    }
}

// ── NCAAB V2 override ────────────────────────────────────────────────────────

/// Feature vector for the NCAAB full-game logistic override.
#[derive(Debug, Clone, Copy)]
pub struct NcaabV2Features {
    pub implied_prob: f64,
    pub true_prob: f64,
    pub ticket_pct: f64,
    pub minutes_to_kickoff: f64,
    pub kenpom_diff: f64,
    pub adj_o_diff: f64,
    pub adj_d_diff: f64,
    pub tempo_diff: f64,
}

/// Output clamp for the V2 override; its training data thins out above this.
pub const NCAAB_V2_PROB_CAP: f64 = 0.65;

// Frozen coefficients from the offline logistic-regression fit.
const V2_INTERCEPT: f64 = -0.091;
const V2_W_IMPLIED: f64 = 1.734;
const V2_W_TRUE: f64 = 2.162;
const V2_W_TICKETS: f64 = -0.0065;
const V2_W_MINUTES: f64 = -0.00021;
const V2_W_KENPOM: f64 = 0.0418;
const V2_W_ADJ_O: f64 = 0.0117;
const V2_W_ADJ_D: f64 = -0.0123;
const V2_W_TEMPO: f64 = 0.0031;

/// NCAAB V2 logistic predictor. Replaces the Gaussian `true_prob` on
/// full-game markets; never applied to 1H markets.
pub fn ncaab_v2_predict(f: &NcaabV2Features) -> f64 {
    let z = V2_INTERCEPT
        + V2_W_IMPLIED * (f.implied_prob - 0.5)
        + V2_W_TRUE * (f.true_prob - 0.5)
        + V2_W_TICKETS * (f.ticket_pct - 50.0)
        + V2_W_MINUTES * f.minutes_to_kickoff
        + V2_W_KENPOM * f.kenpom_diff
        + V2_W_ADJ_O * f.adj_o_diff
        + V2_W_ADJ_D * f.adj_d_diff
        + V2_W_TEMPO * f.tempo_diff;
    sigmoid(z).min(NCAAB_V2_PROB_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn strong() -> BasketballRating {
        BasketballRating {
            offensive_eff: 118.0,
            defensive_eff: 108.0,
            tempo: 100.0,
        }
    }

    fn weak() -> BasketballRating {
        BasketballRating {
            offensive_eff: 110.0,
            defensive_eff: 114.0,
            tempo: 98.0,
        }
    }

    #[test]
    fn stronger_home_team_is_favored() {
        let stats = match_stats(&strong(), &weak(), NBA_HOME_ADVANTAGE, 11.5);
        assert!(stats.expected_margin > NBA_HOME_ADVANTAGE);
        assert!(stats.expected_total > 200.0);
    }

    #[test]
    fn even_teams_margin_is_home_advantage() {
        let stats = match_stats(&strong(), &strong(), NBA_HOME_ADVANTAGE, 11.5);
        assert_relative_eq!(stats.expected_margin, NBA_HOME_ADVANTAGE, epsilon = 1e-9);
    }

    #[test]
    fn total_sigma_is_wider_than_margin_sigma() {
        let stats = match_stats(&strong(), &weak(), NBA_HOME_ADVANTAGE, 11.5);
        assert!(stats.total_std > stats.margin_std);
    }

    #[test]
    fn v2_output_is_capped() {
        let f = NcaabV2Features {
            implied_prob: 0.70,
            true_prob: 0.75,
            ticket_pct: 30.0,
            minutes_to_kickoff: 60.0,
            kenpom_diff: 12.0,
            adj_o_diff: 8.0,
            adj_d_diff: -5.0,
            tempo_diff: 3.0,
        };
        let p = ncaab_v2_predict(&f);
        assert!(p <= NCAAB_V2_PROB_CAP);
    }

    #[test]
    fn v2_monotone_in_true_prob() {
        let base = NcaabV2Features {
            implied_prob: 0.50,
            true_prob: 0.50,
            ticket_pct: 50.0,
            minutes_to_kickoff: 120.0,
            kenpom_diff: 0.0,
            adj_o_diff: 0.0,
            adj_d_diff: 0.0,
            tempo_diff: 0.0,
        };
        let mut higher = base;
        higher.true_prob = 0.58;
        assert!(ncaab_v2_predict(&higher) > ncaab_v2_predict(&base));
    }
}
