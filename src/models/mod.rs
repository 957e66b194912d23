//! Sport-specific probability models and shared staking math.

pub mod basketball;
pub mod football;
pub mod hockey;
pub mod kelly;
pub mod probability;
pub mod soccer;

use anyhow::{bail, Result};

use crate::sources::TeamRating;

/// Rating features carried onto persisted opportunities (basketball only;
/// other sports leave them unset).
#[derive(Debug, Clone, Copy, Default)]
pub struct RatingFeatures {
    pub home_adj_em: Option<f64>,
    pub away_adj_em: Option<f64>,
    pub home_adj_o: Option<f64>,
    pub away_adj_o: Option<f64>,
    pub home_adj_d: Option<f64>,
    pub away_adj_d: Option<f64>,
    pub home_tempo: Option<f64>,
    pub away_tempo: Option<f64>,
}

/// Expected margin/total and dispersion for a binary-outcome matchup.
/// Margin is home-oriented (positive favors home).
#[derive(Debug, Clone, Copy)]
pub struct MatchStats {
    pub expected_margin: f64,
    pub expected_total: f64,
    pub margin_std: f64,
    pub total_std: f64,
    pub features: RatingFeatures,
}

/// First-half scaling factors for US sports.
pub const FIRST_HALF_MARGIN_SCALE: f64 = 0.48;
pub const FIRST_HALF_TOTAL_SCALE: f64 = 0.50;
pub const FIRST_HALF_SIGMA_SCALE: f64 = 0.75;

impl MatchStats {
    /// Derive first-half stats from full-game stats.
    pub fn first_half(&self) -> MatchStats {
        MatchStats {
            expected_margin: self.expected_margin * FIRST_HALF_MARGIN_SCALE,
            expected_total: self.expected_total * FIRST_HALF_TOTAL_SCALE,
            margin_std: self.margin_std * FIRST_HALF_SIGMA_SCALE,
            total_std: self.total_std * FIRST_HALF_SIGMA_SCALE,
            features: self.features,
        }
    }
}

/// Sport-specific margin σ picked off the config snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SigmaConfig {
    pub nba: f64,
    pub ncaab: f64,
    pub nfl: f64,
    pub nhl: f64,
}

/// Compute match stats for a binary-outcome sport from two team ratings.
///
/// Returns `None` when the rating variants do not fit the sport; callers
/// treat that as a data-shape skip (never a fabricated default).
pub fn match_stats(
    sport: &str,
    home: &TeamRating,
    away: &TeamRating,
    sigmas: &SigmaConfig,
) -> Option<MatchStats> {
    match (sport, home, away) {
        (
            "basketball_nba",
            TeamRating::Basketball {
                offensive_eff: ho,
                defensive_eff: hd,
                tempo: ht,
            },
            TeamRating::Basketball {
                offensive_eff: ao,
                defensive_eff: ad,
                tempo: at,
            },
        ) => Some(basketball::match_stats(
            &basketball::BasketballRating {
                offensive_eff: *ho,
                defensive_eff: *hd,
                tempo: *ht,
            },
            &basketball::BasketballRating {
                offensive_eff: *ao,
                defensive_eff: *ad,
                tempo: *at,
            },
            basketball::NBA_HOME_ADVANTAGE,
            sigmas.nba,
        )),
        (
            "basketball_ncaab",
            TeamRating::Basketball {
                offensive_eff: ho,
                defensive_eff: hd,
                tempo: ht,
            },
            TeamRating::Basketball {
                offensive_eff: ao,
                defensive_eff: ad,
                tempo: at,
            },
        ) => Some(basketball::match_stats(
            &basketball::BasketballRating {
                offensive_eff: *ho,
                defensive_eff: *hd,
                tempo: *ht,
            },
            &basketball::BasketballRating {
                offensive_eff: *ao,
                defensive_eff: *ad,
                tempo: *at,
            },
            basketball::NCAAB_HOME_ADVANTAGE,
            sigmas.ncaab,
        )),
        ("americanfootball_nfl", TeamRating::Football { .. }, TeamRating::Football { .. }) => {
            let (h, a) = (football_rating(home)?, football_rating(away)?);
            Some(football::match_stats(&h, &a, sigmas.nfl))
        }
        // NHL flows through the V2 models; the legacy Gaussian path is
        // handled by the process stage behind its config switch.
        ("icehockey_nhl", TeamRating::Hockey { .. }, TeamRating::Hockey { .. }) => {
            let (attack_h, defense_h, _) = hockey_rating(home)?;
            let (attack_a, defense_a, _) = hockey_rating(away)?;
            let margin = (attack_h + defense_a) / 2.0 - (attack_a + defense_h) / 2.0
                + hockey::HOME_ICE_ADVANTAGE;
            let total = (attack_h + defense_a) / 2.0 + (attack_a + defense_h) / 2.0;
            Some(MatchStats {
                expected_margin: margin,
                expected_total: total,
                margin_std: sigmas.nhl,
                total_std: sigmas.nhl * 0.9,
                features: RatingFeatures::default(),
            })
        }
        _ => None,
    }
}

fn football_rating(r: &TeamRating) -> Option<football::FootballRating> {
    match r {
        TeamRating::Football {
            off_ypp,
            def_ypp,
            off_ppg,
            def_ppg,
        } => Some(football::FootballRating {
            off_ypp: *off_ypp,
            def_ypp: *def_ypp,
            off_ppg: *off_ppg,
            def_ppg: *def_ppg,
        }),
        _ => None,
    }
}

fn hockey_rating(r: &TeamRating) -> Option<(f64, f64, f64)> {
    match r {
        TeamRating::Hockey {
            attack,
            defense,
            league_avg_goals,
        } => Some((*attack, *defense, *league_avg_goals)),
        _ => None,
    }
}

/// The sport keys this pipeline knows how to model.
pub const SUPPORTED_SPORTS: &[&str] = &[
    "basketball_nba",
    "basketball_ncaab",
    "americanfootball_nfl",
    "icehockey_nhl",
    "soccer_epl",
];

/// Verify the model layer can serve every target sport. Called at `init`;
/// a failure here is fatal for the run.
pub fn verify_artifacts(sports: &[String]) -> Result<()> {
    for sport in sports {
        if !SUPPORTED_SPORTS.contains(&sport.as_str()) && !sport.starts_with("soccer_") {
            bail!("no model artifact for sport '{}'", sport);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_rating_variant_yields_none() {
        let bb = TeamRating::Basketball {
            offensive_eff: 110.0,
            defensive_eff: 105.0,
            tempo: 99.0,
        };
        let nfl = TeamRating::Football {
            off_ypp: 5.5,
            def_ypp: 5.3,
            off_ppg: 23.0,
            def_ppg: 21.0,
        };
        let sigmas = SigmaConfig {
            nba: 11.5,
            ncaab: 10.5,
            nfl: 13.5,
            nhl: 2.2,
        };
        assert!(match_stats("basketball_nba", &bb, &nfl, &sigmas).is_none());
        assert!(match_stats("americanfootball_nfl", &bb, &bb, &sigmas).is_none());
    }

    #[test]
    fn first_half_scaling() {
        let stats = MatchStats {
            expected_margin: 5.0,
            expected_total: 220.0,
            margin_std: 11.5,
            total_std: 15.0,
            features: RatingFeatures::default(),
        };
        let h1 = stats.first_half();
        assert!((h1.expected_margin - 2.4).abs() < 1e-9);
        assert!((h1.expected_total - 110.0).abs() < 1e-9);
        assert!((h1.margin_std - 8.625).abs() < 1e-9);
    }

    #[test]
    fn artifact_check_rejects_unknown_sport() {
        assert!(verify_artifacts(&["basketball_nba".into()]).is_ok());
        assert!(verify_artifacts(&["cricket_ipl".into()]).is_err());
    }
}
