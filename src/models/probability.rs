//! Probability transforms shared by the sport models.
//!
//! Logit-scale calibration follows the same `sigmoid(a · logit(p))` shape as
//! Platt scaling; coupled markets (Over/Under, Home/Draw/Away) are
//! renormalized after calibration so their probabilities sum to one.

const EPS: f64 = 1e-6;

fn clamp_prob(p: f64) -> f64 {
    p.clamp(EPS, 1.0 - EPS)
}

pub fn logit(p: f64) -> f64 {
    let p = clamp_prob(p);
    (p / (1.0 - p)).ln()
}

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// Logit-scale calibration: `sigmoid(scale · logit(p))`.
///
/// `scale > 1` sharpens probabilities toward 0/1, `scale < 1` shrinks them
/// toward 0.5. Scale 1.0 is the identity (up to EPS clamping).
pub fn logit_scale(p: f64, scale: f64) -> f64 {
    sigmoid(scale * logit(p)).clamp(0.0, 1.0)
}

/// Normalize a coupled probability set in place so it sums to 1.0.
/// No-op when the sum is degenerate.
pub fn normalize_coupled(probs: &mut [f64]) {
    let sum: f64 = probs.iter().sum();
    if sum > EPS {
        for p in probs.iter_mut() {
            *p /= sum;
        }
    }
}

/// Standard normal CDF via the Abramowitz–Stegun erf approximation
/// (7.1.26, max abs error 1.5e-7).
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let y = 1.0
        - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t
            + 0.254829592)
            * t
            * (-x * x).exp();
    sign * y
}

/// Poisson probability mass P(X = k).
pub fn poisson_pmf(k: u32, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    let mut ln_fact = 0.0;
    for i in 1..=k {
        ln_fact += (i as f64).ln();
    }
    (k as f64 * lambda.ln() - lambda - ln_fact).exp()
}

/// Poisson CDF P(X ≤ k).
pub fn poisson_cdf(k: u32, lambda: f64) -> f64 {
    (0..=k).map(|i| poisson_pmf(i, lambda)).sum()
}

/// Invert a direct Over probability on an integer goal threshold into an
/// implied Poisson rate via bisection on `1 − CDF(threshold, λ) = p_over`.
///
/// For the common 2.5-goal line, `threshold = 2`. Returns `None` when
/// `p_over` is degenerate.
pub fn implied_poisson_rate(p_over: f64, threshold: u32) -> Option<f64> {
    if !(EPS..=1.0 - EPS).contains(&p_over) {
        return None;
    }
    let mut lo = 0.01_f64;
    let mut hi = 15.0_f64;
    // 1 − CDF is monotone increasing in λ.
    for _ in 0..80 {
        let mid = 0.5 * (lo + hi);
        let over = 1.0 - poisson_cdf(threshold, mid);
        if over < p_over {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}

/// 5%-wide calibration bucket label, e.g. 0.57 → "55-60%".
pub fn probability_bucket(p: f64) -> String {
    let lower = ((p.clamp(0.0, 1.0) * 100.0) / 5.0).floor() as u32 * 5;
    let lower = lower.min(95);
    format!("{}-{}%", lower, lower + 5)
}
