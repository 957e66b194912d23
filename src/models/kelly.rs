//! Kelly staking and edge arithmetic on decimal odds.
//!
//! `edge = true_prob − 1/odds`; the Kelly fraction is `(b·p − q)/b` with
//! `b = odds − 1`. A fractional-Kelly multiplier reduces variance, and the
//! final stake is capped at `bankroll × max_stake_pct`. Prop and first-half
//! bets are staked at half of full-game Kelly.

/// Edge of a bet at decimal odds: `true_prob − 1/odds`.
pub fn edge(true_prob: f64, odds: f64) -> f64 {
    if odds <= 1.0 {
        return 0.0;
    }
    true_prob - 1.0 / odds
}

/// Raw Kelly fraction of bankroll. Zero when there is no edge.
pub fn kelly_fraction(true_prob: f64, odds: f64) -> f64 {
    debug_assert!((0.0..=1.0).contains(&true_prob), "true_prob out of range");
    if odds <= 1.0 {
        return 0.0;
    }
    let b = odds - 1.0;
    let p = true_prob;
    let q = 1.0 - p;
    let f = (b * p - q) / b;
    f.max(0.0)
}

/// Inputs for sizing a single bet.
#[derive(Debug, Clone, Copy)]
pub struct StakeParams {
    pub bankroll: f64,
    pub kelly_frac: f64,
    pub max_stake_pct: f64,
    /// Optional sport/edge-bucket multiplier (1.0 = none).
    pub multiplier: f64,
    /// Prop and 1H markets are staked at half of full-game Kelly.
    pub half_stake: bool,
}

/// Size a bet: fractional Kelly, bucket multiplier, half-stake rule, then
/// the hard bankroll cap. Non-positive edge stakes zero.
pub fn stake(true_prob: f64, odds: f64, params: &StakeParams) -> f64 {
    let f = kelly_fraction(true_prob, odds);
    if f <= 0.0 {
        return 0.0;
    }
    let mut amount = params.bankroll * params.kelly_frac * f * params.multiplier;
    if params.half_stake {
        amount *= 0.5;
    }
    amount.min(params.bankroll * params.max_stake_pct).max(0.0)
}

/// Stake multiplier by edge bucket: outsized edges are usually stale lines,
/// so they are staked down rather than up.
pub fn edge_bucket_multiplier(edge: f64) -> f64 {
    match edge {
        e if e >= 0.10 => 0.50,
        e if e >= 0.07 => 0.75,
        _ => 1.0,
    }
}
