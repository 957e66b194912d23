//! Soccer match model: three-way probabilities, totals via an implied
//! Poisson rate, and a truncated score grid for first-half and handicap
//! markets.
//!
//! The full-time three-way and 2.5-goal probabilities come from a
//! [`SoccerModel`] implementation (external predictor seam). Everything
//! derived from expected goals (1H markets, spreads, non-2.5 totals) runs
//! on independent home/away Poisson distributions truncated at
//! [`GRID_MAX`] goals.

use std::collections::HashMap;

use super::probability::{poisson_pmf, normalize_coupled};

/// Score-grid truncation. P(goals > 14) is negligible at soccer rates.
pub const GRID_MAX: u32 = 14;

/// Fraction of full-time expected goals scored in the first half.
pub const FIRST_HALF_GOAL_SHARE: f64 = 0.45;

/// Full-match prediction from a soccer predictor.
#[derive(Debug, Clone, Copy)]
pub struct SoccerPrediction {
    pub prob_home: f64,
    pub prob_draw: f64,
    pub prob_away: f64,
    /// Direct model probability for Over 2.5 goals.
    pub prob_over25: f64,
    pub exp_home_goals: f64,
    pub exp_away_goals: f64,
}

/// Pre-game soccer predictor seam. The production implementation wraps the
/// trained league models; [`PoissonSoccerModel`] is the in-crate default.
pub trait SoccerModel: Send + Sync {
    fn predict(&self, home: &str, away: &str) -> Option<SoccerPrediction>;
}

/// Attack/defence multipliers per team, relative to league average.
#[derive(Debug, Clone, Copy)]
pub struct SoccerRating {
    pub attack: f64,
    pub defense: f64,
}

/// Independent-Poisson soccer model from team attack/defence ratings.
pub struct PoissonSoccerModel {
    pub ratings: HashMap<String, SoccerRating>,
    pub league_avg_goals: f64,
    pub home_advantage: f64,
}

impl PoissonSoccerModel {
    pub fn new(ratings: HashMap<String, SoccerRating>, league_avg_goals: f64) -> Self {
        PoissonSoccerModel {
            ratings,
            league_avg_goals,
            home_advantage: 1.18,
        }
    }
}

impl SoccerModel for PoissonSoccerModel {
    fn predict(&self, home: &str, away: &str) -> Option<SoccerPrediction> {
        let home_key = crate::teams::robust_match(
            home,
            self.ratings.keys().map(String::as_str),
            0.85,
        )?;
        let away_key = crate::teams::robust_match(
            away,
            self.ratings.keys().map(String::as_str),
            0.85,
        )?;
        let h = self.ratings[home_key];
        let a = self.ratings[away_key];
        let per_side = self.league_avg_goals / 2.0;
        let lambda_home = per_side * h.attack * a.defense * self.home_advantage;
        let lambda_away = per_side * a.attack * h.defense;
        let (prob_home, prob_draw, prob_away) = grid_outcome_probs(lambda_home, lambda_away);
        let prob_over25 = grid_total_over(lambda_home, lambda_away, 2.5);
        Some(SoccerPrediction {
            prob_home,
            prob_draw,
            prob_away,
            prob_over25,
            exp_home_goals: lambda_home,
            exp_away_goals: lambda_away,
        })
    }
}

/// Win/draw/loss probabilities from two Poisson rates over the truncated
/// score grid, renormalized for the truncation.
pub fn grid_outcome_probs(lambda_home: f64, lambda_away: f64) -> (f64, f64, f64) {
    let mut home = 0.0;
    let mut draw = 0.0;
    let mut away = 0.0;
    for i in 0..=GRID_MAX {
        let p_i = poisson_pmf(i, lambda_home);
        for j in 0..=GRID_MAX {
            let p = p_i * poisson_pmf(j, lambda_away);
            match i.cmp(&j) {
                std::cmp::Ordering::Greater => home += p,
                std::cmp::Ordering::Equal => draw += p,
                std::cmp::Ordering::Less => away += p,
            }
        }
    }
    let mut probs = [home, draw, away];
    normalize_coupled(&mut probs);
    (probs[0], probs[1], probs[2])
}

/// P(home_goals + away_goals > line) over the grid. Half-point lines only;
/// pushes on integer lines are not modelled here.
pub fn grid_total_over(lambda_home: f64, lambda_away: f64, line: f64) -> f64 {
    let mut over = 0.0;
    let mut mass = 0.0;
    for i in 0..=GRID_MAX {
        let p_i = poisson_pmf(i, lambda_home);
        for j in 0..=GRID_MAX {
            let p = p_i * poisson_pmf(j, lambda_away);
            mass += p;
            if (i + j) as f64 > line {
                over += p;
            }
        }
    }
    if mass > 0.0 {
        over / mass
    } else {
        0.0
    }
}

/// P(home covers a handicap of `point` goals), i.e.
/// P(home_goals − away_goals + point > 0). For the away side call with the
/// rates swapped and the away point.
pub fn grid_spread_cover(lambda_home: f64, lambda_away: f64, point: f64) -> f64 {
    let mut cover = 0.0;
    let mut mass = 0.0;
    for i in 0..=GRID_MAX {
        let p_i = poisson_pmf(i, lambda_home);
        for j in 0..=GRID_MAX {
            let p = p_i * poisson_pmf(j, lambda_away);
            mass += p;
            if (i as f64 - j as f64) + point > 0.0 {
                cover += p;
            }
        }
    }
    if mass > 0.0 {
        cover / mass
    } else {
        0.0
    }
}

/// First-half Poisson rates from full-time expected goals.
pub fn first_half_rates(exp_home_goals: f64, exp_away_goals: f64) -> (f64, f64) {
    (
        exp_home_goals * FIRST_HALF_GOAL_SHARE,
        exp_away_goals * FIRST_HALF_GOAL_SHARE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn outcome_probs_sum_to_one() {
        let (h, d, a) = grid_outcome_probs(1.6, 1.1);
        assert_relative_eq!(h + d + a, 1.0, epsilon = 1e-9);
        assert!(h > a, "higher rate should win more often");
    }

    #[test]
    fn symmetric_rates_give_symmetric_outcomes() {
        let (h, d, a) = grid_outcome_probs(1.3, 1.3);
        assert_relative_eq!(h, a, epsilon = 1e-9);
        assert!(d > 0.2);
    }

    #[test]
    fn total_over_monotone_in_line() {
        let over25 = grid_total_over(1.5, 1.2, 2.5);
        let over35 = grid_total_over(1.5, 1.2, 3.5);
        assert!(over25 > over35);
    }

    #[test]
    fn spread_cover_matches_outcome_prob_at_half_goal() {
        // Home −0.5 cover is exactly a home win.
        let (h, _, _) = grid_outcome_probs(1.6, 1.1);
        let cover = grid_spread_cover(1.6, 1.1, -0.5);
        assert_relative_eq!(cover, h, epsilon = 1e-9);
    }

    #[test]
    fn poisson_model_predicts_home_edge_for_stronger_side() {
        let mut ratings = HashMap::new();
        ratings.insert(
            "Arsenal".to_string(),
            SoccerRating {
                attack: 1.3,
                defense: 0.8,
            },
        );
        ratings.insert(
            "Fulham".to_string(),
            SoccerRating {
                attack: 0.9,
                defense: 1.1,
            },
        );
        let model = PoissonSoccerModel::new(ratings, 2.7);
        let pred = model.predict("Arsenal", "Fulham").unwrap();
        assert!(pred.prob_home > pred.prob_away);
        assert_relative_eq!(
            pred.prob_home + pred.prob_draw + pred.prob_away,
            1.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn unknown_team_yields_none() {
        let model = PoissonSoccerModel::new(HashMap::new(), 2.7);
        assert!(model.predict("Arsenal", "Fulham").is_none());
    }
}
