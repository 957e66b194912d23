//! NHL V2 totals and moneyline models.
//!
//! Both models emit a full audit trace: every intermediate needed to
//! reproduce the decision offline. Strategy parameters are locked
//! constants, not config; changing them is a model release, not a knob.
//!
//! The legacy ratings-based Gaussian path for NHL is gated behind
//! `nhl_legacy_ratings_enabled` in config and is off by default.

use serde::Serialize;

use super::probability::normal_cdf;

// Locked strategy constants (offline backtest, 2022–2025 seasons).

/// Additive correction for the model's systematic over-estimate of totals.
pub const TOTALS_BIAS_CORRECTION: f64 = -0.18;
/// Total-goals dispersion.
pub const TOTALS_SIGMA: f64 = 1.90;
/// Minimum expected value to recommend a bet.
pub const EV_THRESHOLD: f64 = 0.03;
/// Longshot guard: never recommend above these decimal odds.
pub const LONGSHOT_ODDS_CAP: f64 = 2.60;
/// Moneyline margin dispersion in goals.
pub const MONEYLINE_SIGMA: f64 = 2.25;
/// Home-ice advantage in goals.
pub const HOME_ICE_ADVANTAGE: f64 = 0.20;
/// Goals prevented per unit of goalie GSAx per game.
const GSAX_WEIGHT: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Recommend,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BetSide {
    Over,
    Under,
    Home,
    Away,
}

impl BetSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetSide::Over => "OVER",
            BetSide::Under => "UNDER",
            BetSide::Home => "HOME",
            BetSide::Away => "AWAY",
        }
    }
}

/// Team-level inputs shared by both NHL models.
#[derive(Debug, Clone, Copy)]
pub struct NhlTeamSnapshot {
    /// Expected goals scored per game.
    pub attack: f64,
    /// Expected goals conceded per game.
    pub defense: f64,
    /// Starting goalie GSAx per game, when known.
    pub goalie_gsax: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct NhlTotalsInput {
    pub home: NhlTeamSnapshot,
    pub away: NhlTeamSnapshot,
    pub league_avg_goals: f64,
    pub line: f64,
    pub over_odds: f64,
    pub under_odds: f64,
}

/// Audit trace for a totals evaluation; serialized into opportunity
/// metadata and the CSV audit artifact.
#[derive(Debug, Clone, Serialize)]
pub struct TotalsTrace {
    pub expected_total: f64,
    pub sigma: f64,
    pub bias_applied: f64,
    pub prob_over: f64,
    pub prob_under: f64,
    pub ev_over: f64,
    pub ev_under: f64,
    pub decision: Decision,
    pub bet_side: Option<BetSide>,
    pub reject_reasons: Vec<String>,
}

/// Weight on the matchup estimate vs the league scoring baseline.
const MATCHUP_WEIGHT: f64 = 0.70;

fn expected_goals_for(
    team: &NhlTeamSnapshot,
    opponent: &NhlTeamSnapshot,
    league_avg_goals: f64,
) -> f64 {
    let matchup = (team.attack + opponent.defense) / 2.0;
    let mut xg = MATCHUP_WEIGHT * matchup + (1.0 - MATCHUP_WEIGHT) * league_avg_goals / 2.0;
    if let Some(gsax) = opponent.goalie_gsax {
        xg -= GSAX_WEIGHT * gsax;
    }
    xg.max(0.5)
}

/// Evaluate an NHL total. Always returns a trace; `decision` says whether
/// the process stage should turn it into an opportunity.
pub fn evaluate_total(input: &NhlTotalsInput) -> TotalsTrace {
    let home_xg = expected_goals_for(&input.home, &input.away, input.league_avg_goals)
        + HOME_ICE_ADVANTAGE / 2.0;
    let away_xg = expected_goals_for(&input.away, &input.home, input.league_avg_goals);
    let raw_total = home_xg + away_xg;
    let expected_total = raw_total + TOTALS_BIAS_CORRECTION;

    let prob_over = 1.0 - normal_cdf((input.line - expected_total) / TOTALS_SIGMA);
    let prob_under = 1.0 - prob_over;
    let ev_over = prob_over * input.over_odds - 1.0;
    let ev_under = prob_under * input.under_odds - 1.0;

    let (side, ev, odds, prob) = if ev_over >= ev_under {
        (BetSide::Over, ev_over, input.over_odds, prob_over)
    } else {
        (BetSide::Under, ev_under, input.under_odds, prob_under)
    };

    let mut reject_reasons = Vec::new();
    if ev < EV_THRESHOLD {
        reject_reasons.push(format!("ev {:.4} below threshold {:.4}", ev, EV_THRESHOLD));
    }
    if odds > LONGSHOT_ODDS_CAP {
        reject_reasons.push(format!(
            "odds {:.2} above longshot cap {:.2}",
            odds, LONGSHOT_ODDS_CAP
        ));
    }
    if !(0.05..=0.95).contains(&prob) {
        reject_reasons.push(format!("probability {:.3} outside sane band", prob));
    }

    let decision = if reject_reasons.is_empty() {
        Decision::Recommend
    } else {
        Decision::Reject
    };

    TotalsTrace {
        expected_total,
        sigma: TOTALS_SIGMA,
        bias_applied: TOTALS_BIAS_CORRECTION,
        prob_over,
        prob_under,
        ev_over,
        ev_under,
        decision,
        bet_side: (decision == Decision::Recommend).then_some(side),
        reject_reasons,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NhlMoneylineInput {
    pub home: NhlTeamSnapshot,
    pub away: NhlTeamSnapshot,
    pub league_avg_goals: f64,
    pub home_odds: f64,
    pub away_odds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoneylineTrace {
    pub expected_margin: f64,
    pub sigma: f64,
    pub prob_home: f64,
    pub prob_away: f64,
    pub ev_home: f64,
    pub ev_away: f64,
    pub decision: Decision,
    pub bet_side: Option<BetSide>,
    pub reject_reasons: Vec<String>,
}

/// Evaluate an NHL moneyline pair. Draws are folded into the margin
/// distribution (regulation ties resolve in OT; the margin σ absorbs it).
pub fn evaluate_moneyline(input: &NhlMoneylineInput) -> MoneylineTrace {
    let home_xg = expected_goals_for(&input.home, &input.away, input.league_avg_goals)
        + HOME_ICE_ADVANTAGE;
    let away_xg = expected_goals_for(&input.away, &input.home, input.league_avg_goals);
    let expected_margin = home_xg - away_xg;

    let prob_home = normal_cdf(expected_margin / MONEYLINE_SIGMA);
    let prob_away = 1.0 - prob_home;
    let ev_home = prob_home * input.home_odds - 1.0;
    let ev_away = prob_away * input.away_odds - 1.0;

    let (side, ev, odds) = if ev_home >= ev_away {
        (BetSide::Home, ev_home, input.home_odds)
    } else {
        (BetSide::Away, ev_away, input.away_odds)
    };

    let mut reject_reasons = Vec::new();
    if ev < EV_THRESHOLD {
        reject_reasons.push(format!("ev {:.4} below threshold {:.4}", ev, EV_THRESHOLD));
    }
    if odds > LONGSHOT_ODDS_CAP {
        reject_reasons.push(format!(
            "odds {:.2} above longshot cap {:.2}",
            odds, LONGSHOT_ODDS_CAP
        ));
    }

    let decision = if reject_reasons.is_empty() {
        Decision::Recommend
    } else {
        Decision::Reject
    };

    MoneylineTrace {
        expected_margin,
        sigma: MONEYLINE_SIGMA,
        prob_home,
        prob_away,
        ev_home,
        ev_away,
        decision,
        bet_side: (decision == Decision::Recommend).then_some(side),
        reject_reasons,
    }
}
