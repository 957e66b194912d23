//! Process stage: the selection engine.
//!
//! Walks every future game on the chosen bookmaker, derives true
//! probabilities from the sport models, scores sharp money and Pro
//! systems, applies the V2 overrides, then resolves conflicts against the
//! pending-bet snapshot before emitting INSERT/DELETE ops into the run
//! buffer. A game that errors is recorded and skipped; the stage never
//! aborts the run.

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::db::models::{json_num, OpType, Opportunity, PendingBet};
use crate::markets::{self, MarketCategory};
use crate::models::basketball::{ncaab_v2_predict, NcaabV2Features};
use crate::models::hockey::{
    self, BetSide, Decision, NhlMoneylineInput, NhlTeamSnapshot, NhlTotalsInput,
};
use crate::models::kelly::{self, StakeParams};
use crate::models::probability::{logit_scale, normal_cdf, normalize_coupled, poisson_cdf};
use crate::models::soccer::{
    first_half_rates, grid_outcome_probs, grid_spread_cover, grid_total_over, SoccerPrediction,
};
use crate::models::{self, MatchStats, RatingFeatures};
use crate::sharp::{self, ProInputs, PRO_SYSTEM_BOOST};
use crate::sources::{Bookmaker, Game, GameSplits, MarketSplit, TeamRating};
use crate::teams::{normalize, robust_match};

use super::{Pipeline, RunContext};

/// A pending bet is swapped only when the challenger clears it by more
/// than half a percentage point of edge.
pub const SWAP_EDGE_MARGIN: f64 = 0.005;

/// Soccer three-way candidates reject edges at or above this (stale line).
const SOCCER_H2H_EDGE_CAP: f64 = 0.35;
/// Soccer totals candidates reject edges at or above this.
const SOCCER_TOTALS_EDGE_CAP: f64 = 0.12;

/// Largest lineup/news perturbation applied to a win probability.
const NEWS_IMPACT_CAP: f64 = 0.03;

/// Fuzzy-match threshold for team names against the ratings map.
const RATINGS_MATCH_THRESHOLD: f64 = 0.75;
/// Fuzzy-match threshold against sharp-split keys.
const SHARP_MATCH_THRESHOLD: f64 = 0.85;

pub(super) fn should_swap(new_edge: f64, old_edge: f64) -> bool {
    new_edge > old_edge + SWAP_EDGE_MARGIN
}

/// One evaluated selection before acceptance and conflict resolution.
struct Candidate {
    selection: String,
    category: MarketCategory,
    market_key: String,
    odds: f64,
    point: Option<f64>,
    true_prob: f64,
    edge: f64,
    /// `[lo, hi)` edge band for the value acceptance path.
    value_band: (f64, f64),
    half_stake: bool,
    /// V2 models decide acceptance themselves.
    force_accept: bool,
    v2: bool,
    sharp_score: i32,
    pro_systems: Vec<&'static str>,
    ticket_pct: Option<f64>,
    money_pct: Option<f64>,
    metadata: Map<String, Value>,
}

impl Candidate {
    fn new(
        selection: String,
        category: MarketCategory,
        market_key: &str,
        odds: f64,
        true_prob: f64,
        value_band: (f64, f64),
    ) -> Self {
        Candidate {
            selection,
            category,
            market_key: market_key.to_string(),
            odds,
            point: None,
            true_prob,
            edge: kelly::edge(true_prob, odds),
            value_band,
            half_stake: category.is_first_half(),
            force_accept: false,
            v2: false,
            sharp_score: 0,
            pro_systems: Vec::new(),
            ticket_pct: None,
            money_pct: None,
            metadata: Map::new(),
        }
    }

    fn is_under(&self) -> bool {
        self.selection
            .strip_prefix("1H ")
            .unwrap_or(&self.selection)
            .starts_with("Under")
    }
}

/// Per-game inputs resolved once, before candidate generation.
struct GameData {
    splits: Option<GameSplits>,
    home_rating: Option<TeamRating>,
    away_rating: Option<TeamRating>,
    stats: Option<MatchStats>,
    referees: Vec<String>,
    pending: Vec<PendingBet>,
    home_news: f64,
    away_news: f64,
    home_rest: Option<i64>,
    away_rest: Option<i64>,
}

/// Whole days between a team's last completed game and the kickoff.
fn rest_days(
    last_played: &HashMap<String, chrono::DateTime<chrono::Utc>>,
    team: &str,
    kickoff: chrono::DateTime<chrono::Utc>,
) -> Option<i64> {
    last_played
        .get(team)
        .map(|last| (kickoff - *last).num_days())
        .filter(|d| *d >= 0)
}

impl Pipeline {
    pub(super) fn process(&self, ctx: &mut RunContext) -> Result<()> {
        let sports = ctx.sports.clone();
        for sport in &sports {
            let Some(games) = ctx.odds.get(sport).cloned() else {
                continue;
            };
            for game in &games {
                if let Err(e) = self.process_game(ctx, sport, game) {
                    warn!("⚠️ Skipping {} ({}): {:#}", game.teams(), sport, e);
                    ctx.errors
                        .push(format!("process {} ({}): {:#}", game.teams(), sport, e));
                }
            }
        }
        info!(
            "🧮 Process emitted {} ops across {} sports",
            ctx.opportunities.len(),
            sports.len()
        );
        Ok(())
    }

    fn process_game(&self, ctx: &mut RunContext, sport: &str, game: &Game) -> Result<()> {
        if game.commence_time < ctx.now {
            return Ok(());
        }
        let Some(book) = pick_book(&self.config.preferred_books(), game) else {
            debug!("No preferred book on {}", game.teams());
            return Ok(());
        };
        let book = book.clone();

        let data = self.resolve_game_data(ctx, sport, game);
        let is_soccer = sport.starts_with("soccer_");

        let mut candidates = if is_soccer {
            if !self.config.enable_soccer_v2 {
                return Ok(());
            }
            let Some(pred) = self.soccer.predict(&game.home_team, &game.away_team) else {
                // Name-resolution failure: skip, never fabricate.
                return Ok(());
            };
            self.soccer_candidates(sport, game, &book, &pred, &data)
        } else {
            self.binary_candidates(sport, game, &book, &data)
        };

        self.score_candidates(sport, game, &data, &mut candidates);
        if sport == "basketball_ncaab" {
            self.apply_ncaab_v2(ctx.now, game, &data, &mut candidates);
        }

        self.emit_game(ctx, sport, game, &book, &data, candidates);
        Ok(())
    }

    fn resolve_game_data(&self, ctx: &RunContext, sport: &str, game: &Game) -> GameData {
        let splits = lookup_splits(&ctx.splits, game).cloned();
        let ratings = ctx.ratings.get(sport);
        let home_rating = ratings.and_then(|m| {
            robust_match(
                &game.home_team,
                m.keys().map(String::as_str),
                RATINGS_MATCH_THRESHOLD,
            )
            .map(|k| m[k].clone())
        });
        let away_rating = ratings.and_then(|m| {
            robust_match(
                &game.away_team,
                m.keys().map(String::as_str),
                RATINGS_MATCH_THRESHOLD,
            )
            .map(|k| m[k].clone())
        });
        let stats = match (&home_rating, &away_rating) {
            (Some(h), Some(a)) => models::match_stats(sport, h, a, &self.config.sigmas()),
            _ => None,
        };
        GameData {
            splits,
            home_rating,
            away_rating,
            stats,
            referees: ctx.referees.get(&game.teams()).cloned().unwrap_or_default(),
            pending: ctx.pending.get(&game.id).cloned().unwrap_or_default(),
            home_news: *ctx.news_impact.get(&game.home_team).unwrap_or(&0.0),
            away_news: *ctx.news_impact.get(&game.away_team).unwrap_or(&0.0),
            home_rest: rest_days(&ctx.last_played, &game.home_team, game.commence_time),
            away_rest: rest_days(&ctx.last_played, &game.away_team, game.commence_time),
        }
    }

    // ── Soccer candidate generation ──────────────────────────────────────────

    fn soccer_candidates(
        &self,
        sport: &str,
        game: &Game,
        book: &Bookmaker,
        pred: &SoccerPrediction,
        data: &GameData,
    ) -> Vec<Candidate> {
        let cfg = &self.config;
        let mut out = Vec::new();
        let h2h_band = (cfg.min_edge_for(sport), SOCCER_H2H_EDGE_CAP);
        let totals_band = (cfg.min_edge, SOCCER_TOTALS_EDGE_CAP);
        let grid_band = (cfg.min_edge_for(sport), cfg.max_edge);
        let (lambda_h1_home, lambda_h1_away) =
            first_half_rates(pred.exp_home_goals, pred.exp_away_goals);

        for market in &book.markets {
            if markets::is_player_prop(&market.key) {
                continue;
            }
            match market.key.as_str() {
                "h2h" => {
                    // Three-way with bounded lineup perturbation, calibrated
                    // and renormalized.
                    let mut probs = [
                        (pred.prob_home
                            + data.home_news.clamp(-NEWS_IMPACT_CAP, NEWS_IMPACT_CAP))
                        .max(0.0),
                        pred.prob_draw,
                        (pred.prob_away
                            + data.away_news.clamp(-NEWS_IMPACT_CAP, NEWS_IMPACT_CAP))
                        .max(0.0),
                    ];
                    for p in probs.iter_mut() {
                        *p = logit_scale(*p, cfg.market_weight_soccer);
                    }
                    normalize_coupled(&mut probs);
                    for outcome in &market.outcomes {
                        let (p, selection) = if outcome.name == game.home_team {
                            (probs[0], format!("{} ML", game.home_team))
                        } else if outcome.name == game.away_team {
                            (probs[2], format!("{} ML", game.away_team))
                        } else if outcome.name == "Draw" {
                            (probs[1], "Draw".to_string())
                        } else {
                            continue;
                        };
                        out.push(Candidate::new(
                            selection,
                            MarketCategory::Moneyline,
                            &market.key,
                            outcome.price,
                            p,
                            h2h_band,
                        ));
                    }
                }
                "totals" | "alternate_totals" => {
                    let implied_rate =
                        crate::models::probability::implied_poisson_rate(pred.prob_over25, 2);
                    for (point, over, under) in total_pairs(market) {
                        let p_over_raw = if (point - 2.5).abs() < 1e-9 {
                            pred.prob_over25
                        } else if let Some(lambda) = implied_rate {
                            1.0 - poisson_cdf(point.floor() as u32, lambda)
                        } else {
                            continue;
                        };
                        let mut pair = [
                            logit_scale(p_over_raw, cfg.market_weight_soccer),
                            logit_scale(1.0 - p_over_raw, cfg.market_weight_soccer),
                        ];
                        normalize_coupled(&mut pair);
                        for (p, outcome, label) in
                            [(pair[0], over, "Over"), (pair[1], under, "Under")]
                        {
                            let mut cand = Candidate::new(
                                format!("{} {}", label, point),
                                MarketCategory::Total,
                                &market.key,
                                outcome.price,
                                p,
                                totals_band,
                            );
                            cand.point = Some(point);
                            out.push(cand);
                        }
                    }
                }
                "h2h_h1" => {
                    let (mut ph, mut pd, mut pa) =
                        grid_outcome_probs(lambda_h1_home, lambda_h1_away);
                    ph = ph.min(cfg.max_probability);
                    pd = pd.min(cfg.max_probability);
                    pa = pa.min(cfg.max_probability);
                    for outcome in &market.outcomes {
                        let (p, selection) = if outcome.name == game.home_team {
                            (ph, format!("1H {} ML", game.home_team))
                        } else if outcome.name == game.away_team {
                            (pa, format!("1H {} ML", game.away_team))
                        } else if outcome.name == "Draw" {
                            (pd, "1H Draw".to_string())
                        } else {
                            continue;
                        };
                        out.push(Candidate::new(
                            selection,
                            MarketCategory::FirstHalfMoneyline,
                            &market.key,
                            outcome.price,
                            p,
                            grid_band,
                        ));
                    }
                }
                "totals_h1" => {
                    for (point, over, under) in total_pairs(market) {
                        let p_over = grid_total_over(lambda_h1_home, lambda_h1_away, point)
                            .min(cfg.max_probability);
                        let p_under = (1.0 - p_over).min(cfg.max_probability);
                        for (p, outcome, label) in
                            [(p_over, over, "Over"), (p_under, under, "Under")]
                        {
                            let mut cand = Candidate::new(
                                format!("1H {} {}", label, point),
                                MarketCategory::FirstHalfTotal,
                                &market.key,
                                outcome.price,
                                p,
                                grid_band,
                            );
                            cand.point = Some(point);
                            out.push(cand);
                        }
                    }
                }
                "spreads" | "spreads_h1" => {
                    let first_half = market.key == "spreads_h1";
                    let (lh, la) = if first_half {
                        (lambda_h1_home, lambda_h1_away)
                    } else {
                        (pred.exp_home_goals, pred.exp_away_goals)
                    };
                    let category = if first_half {
                        MarketCategory::FirstHalfSpread
                    } else {
                        MarketCategory::Spread
                    };
                    for outcome in &market.outcomes {
                        let Some(point) = outcome.point else { continue };
                        let p = if outcome.name == game.home_team {
                            grid_spread_cover(lh, la, point)
                        } else if outcome.name == game.away_team {
                            grid_spread_cover(la, lh, point)
                        } else {
                            continue;
                        };
                        let prefix = if first_half { "1H " } else { "" };
                        let mut cand = Candidate::new(
                            format!("{}{} {:+}", prefix, outcome.name, point),
                            category,
                            &market.key,
                            outcome.price,
                            p.min(cfg.max_probability),
                            grid_band,
                        );
                        cand.point = Some(point);
                        out.push(cand);
                    }
                }
                _ => {}
            }
        }
        out
    }

    // ── US binary candidate generation ───────────────────────────────────────

    fn binary_candidates(
        &self,
        sport: &str,
        game: &Game,
        book: &Bookmaker,
        data: &GameData,
    ) -> Vec<Candidate> {
        let cfg = &self.config;
        let mut out = Vec::new();
        let is_nhl = sport == "icehockey_nhl";

        if is_nhl && cfg.nhl_totals_v2_enabled {
            out.extend(self.nhl_v2_candidates(game, book, data));
        }

        // The ratings Gaussian path. For NHL it only runs behind the legacy
        // switch; the V2 models own totals and moneylines otherwise.
        if is_nhl && !cfg.nhl_legacy_ratings_enabled {
            return out;
        }
        let Some(stats) = data.stats else {
            // No rating match for one side: no fabricated defaults.
            return out;
        };
        if sport == "basketball_nba" && !cfg.enable_nba_v2 {
            return out;
        }
        let band = (cfg.min_edge_for(sport), cfg.max_edge);

        for market in &book.markets {
            if markets::is_player_prop(&market.key) {
                continue;
            }
            let Some(category) = MarketCategory::from_market_key(&market.key) else {
                continue;
            };
            let eff = if category.is_first_half() {
                stats.first_half()
            } else {
                stats
            };
            let prefix = if category.is_first_half() { "1H " } else { "" };

            match category {
                MarketCategory::Moneyline | MarketCategory::FirstHalfMoneyline => {
                    let p_home_raw = normal_cdf(eff.expected_margin / eff.margin_std);
                    let mut pair = [
                        logit_scale(p_home_raw, cfg.calibration_scale),
                        logit_scale(1.0 - p_home_raw, cfg.calibration_scale),
                    ];
                    normalize_coupled(&mut pair);
                    for outcome in &market.outcomes {
                        let p = if outcome.name == game.home_team {
                            pair[0]
                        } else if outcome.name == game.away_team {
                            pair[1]
                        } else {
                            continue;
                        };
                        out.push(Candidate::new(
                            format!("{}{} ML", prefix, outcome.name),
                            category,
                            &market.key,
                            outcome.price,
                            p.min(cfg.max_probability),
                            band,
                        ));
                    }
                }
                MarketCategory::Spread | MarketCategory::FirstHalfSpread => {
                    for outcome in &market.outcomes {
                        let Some(point) = outcome.point else { continue };
                        // Home-oriented margin, flipped for the away side.
                        let margin = if outcome.name == game.home_team {
                            eff.expected_margin
                        } else if outcome.name == game.away_team {
                            -eff.expected_margin
                        } else {
                            continue;
                        };
                        let raw = 1.0 - normal_cdf((-point - margin) / eff.margin_std);
                        let p = logit_scale(raw, cfg.calibration_scale).min(cfg.max_probability);
                        let mut cand = Candidate::new(
                            format!("{}{} {:+}", prefix, outcome.name, point),
                            category,
                            &market.key,
                            outcome.price,
                            p,
                            band,
                        );
                        cand.point = Some(point);
                        out.push(cand);
                    }
                }
                MarketCategory::Total | MarketCategory::FirstHalfTotal => {
                    for (point, over, under) in total_pairs(market) {
                        let raw_over =
                            1.0 - normal_cdf((point - eff.expected_total) / eff.total_std);
                        let mut pair = [
                            logit_scale(raw_over, cfg.calibration_scale),
                            logit_scale(1.0 - raw_over, cfg.calibration_scale),
                        ];
                        normalize_coupled(&mut pair);
                        for (p, outcome, label) in
                            [(pair[0], over, "Over"), (pair[1], under, "Under")]
                        {
                            let mut cand = Candidate::new(
                                format!("{}{} {}", prefix, label, point),
                                category,
                                &market.key,
                                outcome.price,
                                p.min(cfg.max_probability),
                                band,
                            );
                            cand.point = Some(point);
                            out.push(cand);
                        }
                    }
                }
            }
        }
        out
    }

    // ── NHL V2 models ────────────────────────────────────────────────────────

    fn nhl_v2_candidates(
        &self,
        game: &Game,
        book: &Bookmaker,
        data: &GameData,
    ) -> Vec<Candidate> {
        let mut out = Vec::new();
        let (Some(home), Some(away)) = (
            nhl_snapshot(data.home_rating.as_ref()),
            nhl_snapshot(data.away_rating.as_ref()),
        ) else {
            return out;
        };
        let league_avg_goals = match data.home_rating {
            Some(TeamRating::Hockey {
                league_avg_goals, ..
            }) => league_avg_goals,
            _ => return out,
        };

        for market in &book.markets {
            match market.key.as_str() {
                "totals" => {
                    for (point, over, under) in total_pairs(market) {
                        let trace = hockey::evaluate_total(&NhlTotalsInput {
                            home,
                            away,
                            league_avg_goals,
                            line: point,
                            over_odds: over.price,
                            under_odds: under.price,
                        });
                        if trace.decision != Decision::Recommend {
                            continue;
                        }
                        let (label, odds, p) = match trace.bet_side {
                            Some(BetSide::Over) => ("Over", over.price, trace.prob_over),
                            Some(BetSide::Under) => ("Under", under.price, trace.prob_under),
                            _ => continue,
                        };
                        let mut cand = Candidate::new(
                            format!("{} {}", label, point),
                            MarketCategory::Total,
                            &market.key,
                            odds,
                            p,
                            (0.0, 1.0),
                        );
                        cand.point = Some(point);
                        cand.force_accept = true;
                        cand.v2 = true;
                        if let Ok(v) = serde_json::to_value(&trace) {
                            cand.metadata
                                .insert("nhl_totals_trace".to_string(), sanitize(v));
                        }
                        out.push(cand);
                    }
                }
                "h2h" => {
                    let home_price = price_for(market, &game.home_team);
                    let away_price = price_for(market, &game.away_team);
                    let (Some(home_odds), Some(away_odds)) = (home_price, away_price) else {
                        continue;
                    };
                    let trace = hockey::evaluate_moneyline(&NhlMoneylineInput {
                        home,
                        away,
                        league_avg_goals,
                        home_odds,
                        away_odds,
                    });
                    if trace.decision != Decision::Recommend {
                        continue;
                    }
                    let (team, odds, p) = match trace.bet_side {
                        Some(BetSide::Home) => (&game.home_team, home_odds, trace.prob_home),
                        Some(BetSide::Away) => (&game.away_team, away_odds, trace.prob_away),
                        _ => continue,
                    };
                    let mut cand = Candidate::new(
                        format!("{} ML", team),
                        MarketCategory::Moneyline,
                        &market.key,
                        odds,
                        p,
                        (0.0, 1.0),
                    );
                    cand.force_accept = true;
                    cand.v2 = true;
                    if let Ok(v) = serde_json::to_value(&trace) {
                        cand.metadata
                            .insert("nhl_moneyline_trace".to_string(), sanitize(v));
                    }
                    out.push(cand);
                }
                _ => {}
            }
        }
        out
    }

    // ── Sharp money, Pro systems, V2 override ────────────────────────────────

    fn score_candidates(
        &self,
        sport: &str,
        _game: &Game,
        data: &GameData,
        candidates: &mut [Candidate],
    ) {
        for cand in candidates.iter_mut() {
            if let Some(split) = data
                .splits
                .as_ref()
                .and_then(|s| split_for(s, &cand.category, &cand.selection))
            {
                cand.money_pct = Some(split.money_pct);
                cand.ticket_pct = Some(split.tickets_pct);
                cand.sharp_score = sharp::sharp_score(split.money_pct, split.tickets_pct);
            }

            let split_copy = cand
                .money_pct
                .zip(cand.ticket_pct)
                .map(|(m, t)| MarketSplit {
                    money_pct: m,
                    tickets_pct: t,
                });
            let pro = sharp::triggered_systems(&ProInputs {
                sport,
                category: cand.category,
                is_under: cand.is_under(),
                odds: cand.odds,
                total_line: cand.point.filter(|_| cand.category.is_total()),
                splits: split_copy.as_ref(),
                home_rating: data.home_rating.as_ref(),
                away_rating: data.away_rating.as_ref(),
            });
            cand.sharp_score += PRO_SYSTEM_BOOST * pro.len() as i32;
            cand.pro_systems = pro;
        }
    }

    /// NCAAB full-game logistic override: replaces the Gaussian probability
    /// and recomputes the edge. Never applied to first-half markets.
    fn apply_ncaab_v2(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        game: &Game,
        data: &GameData,
        candidates: &mut [Candidate],
    ) {
        let Some(stats) = data.stats else { return };
        let f = stats.features;
        let (Some(hem), Some(aem), Some(ho), Some(ao), Some(hd), Some(ad), Some(ht), Some(at)) = (
            f.home_adj_em,
            f.away_adj_em,
            f.home_adj_o,
            f.away_adj_o,
            f.home_adj_d,
            f.away_adj_d,
            f.home_tempo,
            f.away_tempo,
        ) else {
            return;
        };
        let minutes_to_kickoff = (game.commence_time - now).num_minutes() as f64;

        for cand in candidates.iter_mut() {
            if cand.category.is_first_half() || cand.v2 {
                continue;
            }
            let features = NcaabV2Features {
                implied_prob: 1.0 / cand.odds,
                true_prob: cand.true_prob,
                ticket_pct: cand.ticket_pct.unwrap_or(50.0),
                minutes_to_kickoff,
                kenpom_diff: hem - aem,
                adj_o_diff: ho - ao,
                adj_d_diff: hd - ad,
                tempo_diff: ht - at,
            };
            let p = ncaab_v2_predict(&features);
            cand.metadata
                .insert("v2_base_prob".to_string(), json_num(cand.true_prob));
            cand.true_prob = p;
            cand.edge = kelly::edge(p, cand.odds);
            cand.v2 = true;
        }
    }

    // ── Acceptance, conflict resolution, emission ────────────────────────────

    fn emit_game(
        &self,
        ctx: &mut RunContext,
        sport: &str,
        game: &Game,
        book: &Bookmaker,
        data: &GameData,
        candidates: Vec<Candidate>,
    ) {
        let cfg = &self.config;
        let teams = game.teams();

        // Acceptance policy, then best edge per category.
        let mut best: HashMap<MarketCategory, Candidate> = HashMap::new();
        for cand in candidates {
            let is_value = cand.edge >= cand.value_band.0 && cand.edge < cand.value_band.1;
            let is_sharp = cand.sharp_score >= cfg.sharp_signal_threshold
                || !cand.pro_systems.is_empty();
            let is_existing = data
                .pending
                .iter()
                .any(|b| b.category == cand.category && b.selection == cand.selection);
            if !(cand.force_accept || is_value || is_sharp || is_existing) {
                continue;
            }
            match best.entry(cand.category) {
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(cand);
                }
                std::collections::hash_map::Entry::Occupied(mut e) => {
                    if cand.edge > e.get().edge {
                        e.insert(cand);
                    }
                }
            }
        }

        // Deterministic category order for the emission buffer.
        const CATEGORY_ORDER: [MarketCategory; 6] = [
            MarketCategory::Spread,
            MarketCategory::Moneyline,
            MarketCategory::Total,
            MarketCategory::FirstHalfSpread,
            MarketCategory::FirstHalfMoneyline,
            MarketCategory::FirstHalfTotal,
        ];

        for category in CATEGORY_ORDER {
            let Some(cand) = best.remove(&category) else {
                continue;
            };
            let same_cat: Vec<&PendingBet> = data
                .pending
                .iter()
                .filter(|b| b.category == category)
                .collect();

            if let Some(existing) = same_cat.iter().find(|b| b.selection == cand.selection) {
                // Same selection already pending: refresh only when the
                // price actually moved, else the run stays idempotent.
                let moved = (existing.odds - cand.odds).abs() > 1e-9
                    || (existing.edge - cand.edge).abs() > 1e-9;
                if moved {
                    let trigger = trigger_for(&cand, true);
                    self.push_insert(ctx, sport, game, book, data, cand, trigger);
                }
                continue;
            }

            if let Some(&incumbent) = same_cat.first() {
                // Different selection, same category: the Swap Rule.
                if should_swap(cand.edge, incumbent.edge) {
                    self.push_delete(ctx, game, incumbent);
                    let trigger = trigger_for(&cand, false);
                    self.push_insert(ctx, sport, game, book, data, cand, trigger);
                } else {
                    debug!(
                        "Suppressed {} ({:.4} ≤ {:.4} + {})",
                        cand.selection, cand.edge, incumbent.edge, SWAP_EDGE_MARGIN
                    );
                }
                continue;
            }

            // No pending bet under this game id; the cross-run signature
            // set still blocks matchups whose feed id changed (first-in
            // wins across runs).
            let signature =
                markets::bet_signature(&game.away_team, &game.home_team, &cand.selection);
            if ctx.seen_categories.contains(&(teams.clone(), category))
                || ctx.seen_signatures.contains(&signature)
            {
                debug!("Signature block on {}", signature);
                continue;
            }
            let trigger = trigger_for(&cand, false);
            self.push_insert(ctx, sport, game, book, data, cand, trigger);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_insert(
        &self,
        ctx: &mut RunContext,
        sport: &str,
        game: &Game,
        book: &Bookmaker,
        data: &GameData,
        cand: Candidate,
        trigger: String,
    ) {
        let cfg = &self.config;
        let params = StakeParams {
            bankroll: cfg.bankroll,
            kelly_frac: cfg.kelly_frac,
            max_stake_pct: cfg.max_stake_pct,
            multiplier: kelly::edge_bucket_multiplier(cand.edge),
            half_stake: cand.half_stake,
        };
        let stake = kelly::stake(cand.true_prob, cand.odds, &params);

        let mut metadata = cand.metadata;
        metadata.insert("book".to_string(), Value::String(book.key.clone()));
        if !cand.pro_systems.is_empty() {
            metadata.insert(
                "pro_systems".to_string(),
                Value::Array(
                    cand.pro_systems
                        .iter()
                        .map(|s| Value::String((*s).to_string()))
                        .collect(),
                ),
            );
        }
        metadata.insert(
            "sharp_tier".to_string(),
            Value::String(sharp::tier(cand.sharp_score).to_string()),
        );

        let teams = game.teams();
        let signature = markets::bet_signature(&game.away_team, &game.home_team, &cand.selection);
        ctx.seen_signatures.insert(signature);
        ctx.seen_categories.insert((teams.clone(), cand.category));

        ctx.opportunities.push(Opportunity {
            event_id: markets::event_id(&game.id, &cand.selection),
            game_id: game.id.clone(),
            timestamp: ctx.now,
            kickoff: game.commence_time,
            sport: sport.to_string(),
            teams,
            selection: cand.selection,
            book: book.key.clone(),
            market_key: cand.market_key,
            category: cand.category,
            odds: cand.odds,
            true_prob: cand.true_prob,
            edge: cand.edge,
            stake,
            trigger_type: trigger,
            sharp_score: cand.sharp_score,
            ticket_pct: cand.ticket_pct,
            money_pct: cand.money_pct,
            home_rest: data.home_rest,
            away_rest: data.away_rest,
            referees: data.referees.clone(),
            features: data.stats.map(|s| s.features).unwrap_or_default(),
            metadata,
            op_type: OpType::Insert,
        });
    }

    fn push_delete(&self, ctx: &mut RunContext, game: &Game, bet: &PendingBet) {
        ctx.opportunities.push(Opportunity {
            event_id: bet.event_id.clone(),
            game_id: bet.game_id.clone(),
            timestamp: ctx.now,
            kickoff: game.commence_time,
            sport: bet.sport.clone(),
            teams: bet.teams.clone(),
            selection: bet.selection.clone(),
            book: String::new(),
            market_key: String::new(),
            category: bet.category,
            odds: bet.odds,
            true_prob: 0.0,
            edge: bet.edge,
            stake: 0.0,
            trigger_type: "swap".to_string(),
            sharp_score: 0,
            ticket_pct: None,
            money_pct: None,
            home_rest: None,
            away_rest: None,
            referees: Vec::new(),
            features: RatingFeatures::default(),
            metadata: Map::new(),
            op_type: OpType::Delete,
        });
    }
}

// ── Free helpers ─────────────────────────────────────────────────────────────

fn trigger_for(cand: &Candidate, refresh: bool) -> String {
    if cand.v2 {
        "model_v2".to_string()
    } else if !cand.pro_systems.is_empty() {
        format!("PRO:{}", cand.pro_systems.join(","))
    } else if cand.sharp_score > 0 && cand.money_pct.is_some() {
        "sharp_signal".to_string()
    } else if refresh {
        "stale_update".to_string()
    } else {
        "model".to_string()
    }
}

/// First preferred bookmaker present on the game.
fn pick_book<'a>(preferred: &[String], game: &'a Game) -> Option<&'a Bookmaker> {
    preferred
        .iter()
        .find_map(|key| game.bookmakers.iter().find(|b| b.key.to_lowercase() == *key))
}

/// Resolve the sharp-splits entry for a game: exact normalized key, then
/// containment, then fuzzy.
fn lookup_splits<'a>(
    splits: &'a HashMap<String, GameSplits>,
    game: &Game,
) -> Option<&'a GameSplits> {
    let norm_home = normalize(&game.home_team);
    let norm_away = normalize(&game.away_team);
    let target = format!("{} @ {}", norm_away, norm_home);
    if let Some(s) = splits.get(&target) {
        return Some(s);
    }
    if let Some(key) = splits
        .keys()
        .find(|k| k.contains(&norm_home) && k.contains(&norm_away))
    {
        return splits.get(key);
    }
    let key = robust_match(
        &target,
        splits.keys().map(String::as_str),
        SHARP_MATCH_THRESHOLD,
    )?;
    splits.get(key)
}

/// Splits entry for one candidate side. Spread/ML sides are keyed by
/// normalized team name; totals by "Over"/"Under".
fn split_for<'a>(
    splits: &'a GameSplits,
    category: &MarketCategory,
    selection: &str,
) -> Option<&'a MarketSplit> {
    let body = selection.strip_prefix("1H ").unwrap_or(selection);
    if category.is_total() {
        let side = if body.starts_with("Under") { "Under" } else { "Over" };
        return splits.total.get(side);
    }
    let map = match category {
        MarketCategory::Moneyline | MarketCategory::FirstHalfMoneyline => &splits.moneyline,
        _ => &splits.spread,
    };
    if body == "Draw" {
        return map.get("Draw");
    }
    let team = body
        .strip_suffix(" ML")
        .or_else(|| body.rsplit_once(' ').map(|(t, _)| t))
        .unwrap_or(body);
    let key = robust_match(team, map.keys().map(String::as_str), SHARP_MATCH_THRESHOLD)?;
    map.get(key)
}

/// Pair Over/Under outcomes on a totals market by line.
fn total_pairs(
    market: &crate::sources::BookMarket,
) -> Vec<(f64, &crate::sources::BookOutcome, &crate::sources::BookOutcome)> {
    let mut pairs = Vec::new();
    let overs = market
        .outcomes
        .iter()
        .filter(|o| o.name == "Over" && o.point.is_some());
    for over in overs {
        let point = match over.point {
            Some(p) => p,
            None => continue,
        };
        let under = market.outcomes.iter().find(|o| {
            o.name == "Under" && o.point.map(|p| (p - point).abs() < 1e-9).unwrap_or(false)
        });
        if let Some(under) = under {
            pairs.push((point, over, under));
        }
    }
    pairs
}

fn price_for(market: &crate::sources::BookMarket, team: &str) -> Option<f64> {
    market
        .outcomes
        .iter()
        .find(|o| o.name == team)
        .map(|o| o.price)
}

fn nhl_snapshot(rating: Option<&TeamRating>) -> Option<NhlTeamSnapshot> {
    match rating {
        Some(TeamRating::Hockey {
            attack, defense, ..
        }) => Some(NhlTeamSnapshot {
            attack: *attack,
            defense: *defense,
            goalie_gsax: None,
        }),
        _ => None,
    }
}

fn sanitize(v: Value) -> Value {
    crate::db::models::sanitize_json(&v)
}
