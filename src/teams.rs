//! Team-name normalization and robust cross-source matching.
//!
//! Odds feeds, ratings scrapers and splits providers all spell team names
//! differently ("UConn" / "Connecticut", "Ole Miss" / "Mississippi",
//! "Oklahoma State" / "Ok St"). Everything that joins two sources goes
//! through `normalize` + `robust_match`.

/// Alias replacements applied after lowercasing. Order matters: longer,
/// more specific aliases first.
const ALIASES: &[(&str, &str)] = &[
    ("ole miss", "mississippi"),
    ("uconn", "connecticut"),
    ("ok ", "oklahoma "),
    ("pitt ", "pittsburgh "),
    ("usc ", "southern california "),
    ("smu", "southern methodist"),
    ("lsu", "louisiana st"),
    ("unc ", "north carolina "),
    ("st. ", "st "),
    ("saint ", "st "),
];

/// Mascot-style descriptor tokens that carry no identity information.
const DESCRIPTORS: &[&str] = &[
    "saints",
    "fighting",
    "golden",
    "blue",
    "red",
    "crimson",
    "tar",
    "heels",
    "wildcats",
    "bulldogs",
    "tigers",
    "eagles",
    "aggies",
];

/// Normalize a team name for cross-source joins.
///
/// Lowercase, alias substitution, "university" dropped, "state" collapsed
/// to "st", descriptor tokens stripped, whitespace squashed.
pub fn normalize(name: &str) -> String {
    let mut s = format!(" {} ", name.trim().to_lowercase());
    for (from, to) in ALIASES {
        // Aliases without a trailing space are whole-word substitutions.
        if from.ends_with(' ') {
            s = s.replace(&format!(" {from}"), &format!(" {to}"));
        } else {
            s = s.replace(&format!(" {from} "), &format!(" {to} "));
        }
    }
    s = s.replace(" university", " ");
    s = s.replace(" state", " st");
    let tokens: Vec<&str> = s
        .split_whitespace()
        .filter(|t| !DESCRIPTORS.contains(t))
        .collect();
    tokens.join(" ")
}

fn token_set(s: &str) -> Vec<&str> {
    s.split_whitespace().collect()
}

/// Containment guard: "iowa" must not match "iowa st". Containment is only
/// accepted when every token of the shorter name appears in the longer one
/// and the longer name adds no distinguishing "st"/"state" token.
fn containment_ok(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let short_tokens = token_set(short);
    let long_tokens = token_set(long);
    if short_tokens.is_empty() {
        return false;
    }
    if !short_tokens.iter().all(|t| long_tokens.contains(t)) {
        return false;
    }
    let extra_st = long_tokens.contains(&"st") && !short_tokens.contains(&"st");
    !extra_st
}

/// Dice coefficient over character bigrams, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let bigrams = |s: &str| -> Vec<(char, char)> {
        let chars: Vec<char> = s.chars().collect();
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    };
    let ba = bigrams(a);
    let bb = bigrams(b);
    if ba.is_empty() || bb.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let mut remaining = bb.clone();
    let mut overlap = 0usize;
    for g in &ba {
        if let Some(pos) = remaining.iter().position(|h| h == g) {
            remaining.swap_remove(pos);
            overlap += 1;
        }
    }
    2.0 * overlap as f64 / (ba.len() + bb.len()) as f64
}

/// Find the best candidate matching `target`, or `None`.
///
/// Tries, in order: exact normalized equality; containment in either
/// direction (with the token-overlap guard); bigram similarity at or above
/// `threshold`.
pub fn robust_match<'a>(
    target: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    threshold: f64,
) -> Option<&'a str> {
    let norm_target = normalize(target);
    let candidates: Vec<&'a str> = candidates.into_iter().collect();

    for c in &candidates {
        if normalize(c) == norm_target {
            return Some(c);
        }
    }
    for c in &candidates {
        let norm_c = normalize(c);
        if (norm_c.contains(&norm_target) || norm_target.contains(&norm_c))
            && containment_ok(&norm_target, &norm_c)
        {
            return Some(c);
        }
    }
    let mut best: Option<(&'a str, f64)> = None;
    for c in &candidates {
        let sim = similarity(&normalize(c), &norm_target);
        if sim >= threshold && best.map_or(true, |(_, s)| sim > s) {
            best = Some((c, sim));
        }
    }
    best.map(|(c, _)| c)
}
