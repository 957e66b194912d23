//! NFL pre-game match model.
//!
//! Expected points per side blend the offense's scoring rate with the
//! points the defense allows, shifted by the yards-per-play differential
//! against league average. Margins are wide in the NFL; σ comes from
//! config (default 13.5).

use super::{MatchStats, RatingFeatures};

pub const NFL_HOME_ADVANTAGE: f64 = 1.5;

/// League-average yards per play, the baseline for the YPP adjustment.
pub const LEAGUE_AVG_YPP: f64 = 5.4;

/// Points of expected scoring per yard-per-play above league average.
const YPP_POINTS_FACTOR: f64 = 3.0;

pub const TOTAL_SIGMA_RATIO: f64 = 1.25;

#[derive(Debug, Clone, Copy)]
pub struct FootballRating {
    pub off_ypp: f64,
    pub def_ypp: f64,
    pub off_ppg: f64,
    pub def_ppg: f64,
}

pub fn match_stats(
    home: &FootballRating,
    away: &FootballRating,
    margin_std: f64,
) -> MatchStats {
    let home_base = (home.off_ppg + away.def_ppg) / 2.0;
    let away_base = (away.off_ppg + home.def_ppg) / 2.0;
    let home_ypp_adj = YPP_POINTS_FACTOR * ((home.off_ypp + away.def_ypp) / 2.0 - LEAGUE_AVG_YPP);
    let away_ypp_adj = YPP_POINTS_FACTOR * ((away.off_ypp + home.def_ypp) / 2.0 - LEAGUE_AVG_YPP);
    let home_pts = home_base + home_ypp_adj;
    let away_pts = away_base + away_ypp_adj;
    MatchStats {
        expected_margin: home_pts - away_pts + NFL_HOME_ADVANTAGE,
        expected_total: home_pts + away_pts,
        margin_std,
        total_std: margin_std * TOTAL_SIGMA_RATIO,
        features: RatingFeatures::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn league_average() -> FootballRating {
        FootballRating {
            off_ypp: LEAGUE_AVG_YPP,
            def_ypp: LEAGUE_AVG_YPP,
            off_ppg: 22.0,
            def_ppg: 22.0,
        }
    }

    #[test]
    fn even_matchup_margin_is_home_advantage() {
        let stats = match_stats(&league_average(), &league_average(), 13.5);
        assert_relative_eq!(stats.expected_margin, NFL_HOME_ADVANTAGE, epsilon = 1e-9);
        assert_relative_eq!(stats.expected_total, 44.0, epsilon = 1e-9);
    }

    #[test]
    fn efficient_offense_raises_margin_and_total() {
        let mut good = league_average();
        good.off_ypp = 6.2;
        good.off_ppg = 27.0;
        let stats = match_stats(&good, &league_average(), 13.5);
        assert!(stats.expected_margin > NFL_HOME_ADVANTAGE + 2.0);
        assert!(stats.expected_total > 44.0);
    }
}
