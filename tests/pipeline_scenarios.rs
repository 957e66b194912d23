//! End-to-end pipeline scenarios against an on-disk SQLite store and
//! static sources.

use chrono::{Duration, Utc};
use clap::Parser;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Arc;

use pregame_edge_bot::config::Config;
use pregame_edge_bot::db::models::{OpType, Opportunity};
use pregame_edge_bot::db::Database;
use pregame_edge_bot::markets::MarketCategory;
use pregame_edge_bot::models::soccer::{SoccerModel, SoccerPrediction};
use pregame_edge_bot::models::RatingFeatures;
use pregame_edge_bot::pipeline::Pipeline;
use pregame_edge_bot::sources::{
    BookMarket, BookOutcome, Bookmaker, Game, GameSplits, LogAlerts, MarketSplit, NullNews,
    NullReferees, OddsSource, StaticOdds, StaticRatings, StaticSchedule, StaticSplits, TeamRating,
};

// ── Harness ──────────────────────────────────────────────────────────────────

fn temp_db(name: &str) -> String {
    let path = std::env::temp_dir().join(format!(
        "pregame_scenarios_{}_{}.db",
        std::process::id(),
        name
    ));
    let _ = std::fs::remove_file(&path);
    path.to_string_lossy().into_owned()
}

fn test_config(db_path: &str) -> Config {
    let mut cfg = Config::parse_from(["pregame-edge-bot"]);
    cfg.odds_api_key = Some("test-key".to_string());
    cfg.database_path = db_path.to_string();
    cfg
}

struct FixedSoccer(SoccerPrediction);

impl SoccerModel for FixedSoccer {
    fn predict(&self, _home: &str, _away: &str) -> Option<SoccerPrediction> {
        Some(self.0)
    }
}

struct NoSoccer;

impl SoccerModel for NoSoccer {
    fn predict(&self, _home: &str, _away: &str) -> Option<SoccerPrediction> {
        None
    }
}

fn build_pipeline(
    cfg: Config,
    games: HashMap<String, Vec<Game>>,
    splits: HashMap<String, GameSplits>,
    ratings: HashMap<String, HashMap<String, TeamRating>>,
    soccer: Arc<dyn SoccerModel>,
) -> Pipeline {
    Pipeline {
        config: cfg,
        odds: Arc::new(StaticOdds { games }),
        splits: Arc::new(StaticSplits { splits }),
        ratings: Arc::new(StaticRatings { ratings }),
        referees: Arc::new(NullReferees),
        schedule: Arc::new(StaticSchedule::default()),
        news: Arc::new(NullNews),
        alerts: Arc::new(LogAlerts),
        soccer,
    }
}

/// Odds source with data for some sports and an outage for the rest.
struct SplitOdds {
    ok: HashMap<String, Vec<Game>>,
}

#[async_trait::async_trait]
impl OddsSource for SplitOdds {
    async fn fetch_games(&self, sport: &str) -> anyhow::Result<Vec<Game>> {
        self.ok
            .get(sport)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("feed outage for {}", sport))
    }

    fn name(&self) -> &str {
        "split-odds"
    }
}

fn outcome(name: &str, price: f64, point: Option<f64>) -> BookOutcome {
    BookOutcome {
        name: name.to_string(),
        price,
        point,
        description: None,
        side: None,
    }
}

fn market(key: &str, outcomes: Vec<BookOutcome>) -> BookMarket {
    BookMarket {
        key: key.to_string(),
        outcomes,
    }
}

fn game(id: &str, sport: &str, home: &str, away: &str, markets: Vec<BookMarket>) -> Game {
    Game {
        id: id.to_string(),
        sport_key: sport.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        commence_time: Utc::now() + Duration::hours(6),
        bookmakers: vec![Bookmaker {
            key: "pinnacle".to_string(),
            title: "Pinnacle".to_string(),
            markets,
        }],
    }
}

fn bb(off: f64, def: f64, tempo: f64) -> TeamRating {
    TeamRating::Basketball {
        offensive_eff: off,
        defensive_eff: def,
        tempo,
    }
}

fn nba_ratings() -> HashMap<String, HashMap<String, TeamRating>> {
    let mut teams = HashMap::new();
    teams.insert("Celtics".to_string(), bb(115.0, 105.0, 100.0));
    teams.insert("Sixers".to_string(), bb(108.0, 110.0, 100.0));
    let mut by_sport = HashMap::new();
    by_sport.insert("basketball_nba".to_string(), teams);
    by_sport
}

/// Seed a pending bet directly through the store.
fn seed_pending(db_path: &str, event_id: &str, selection: &str, teams: &str, odds: f64, edge: f64) {
    let db = Database::open(db_path).unwrap();
    let op = Opportunity {
        event_id: event_id.to_string(),
        game_id: String::new(),
        timestamp: Utc::now(),
        kickoff: Utc::now() + Duration::hours(6),
        sport: "basketball_nba".to_string(),
        teams: teams.to_string(),
        selection: selection.to_string(),
        book: "pinnacle".to_string(),
        market_key: "totals".to_string(),
        category: MarketCategory::from_selection(selection),
        odds,
        true_prob: 0.55,
        edge,
        stake: 5.0,
        trigger_type: "model".to_string(),
        sharp_score: 0,
        ticket_pct: None,
        money_pct: None,
        home_rest: None,
        away_rest: None,
        referees: vec![],
        features: RatingFeatures::default(),
        metadata: Map::new(),
        op_type: OpType::Insert,
    };
    db.persist_operations(&[op], Utc::now()).unwrap();
}

// ── S1: single NBA h2h value bet ─────────────────────────────────────────────

#[tokio::test]
async fn s1_single_nba_value_bet() {
    let path = temp_db("s1");
    let cfg = test_config(&path);
    let g = game(
        "g1",
        "basketball_nba",
        "Celtics",
        "Sixers",
        vec![market(
            "h2h",
            vec![outcome("Celtics", 1.80, None), outcome("Sixers", 2.10, None)],
        )],
    );
    let mut games = HashMap::new();
    games.insert("basketball_nba".to_string(), vec![g]);
    let pipeline = build_pipeline(cfg, games, HashMap::new(), nba_ratings(), Arc::new(NoSoccer));

    let report = pipeline.run().await;
    assert!(report.success);
    assert_eq!(report.inserts, 1);
    assert_eq!(report.deletes, 0);

    let db = Database::open(&path).unwrap();
    let row = db.intelligence_row("g1_celtics_ml").unwrap().unwrap();
    assert_eq!(row.selection, "Celtics ML");
    assert_eq!(row.trigger_type, "model");
    // Edge identity and the probability clamp.
    assert!((row.edge - (row.true_prob - 1.0 / row.odds)).abs() < 1e-9);
    assert!(row.true_prob <= 0.72 + 1e-9);
    // Stake cap: bankroll 1000 × max_stake_pct 0.06.
    assert!(row.stake > 0.0 && row.stake <= 60.0 + 1e-9);
    // No Sixers bet.
    assert!(db.intelligence_row("g1_sixers_ml").unwrap().is_none());
    // Calibration row appended alongside the insert.
    assert_eq!(db.calibration_rows("g1_celtics_ml").unwrap(), 1);
}

// ── S2: soccer Over/Under normalization ──────────────────────────────────────

#[tokio::test]
async fn s2_soccer_total_normalization() {
    let path = temp_db("s2");
    let mut cfg = test_config(&path);
    cfg.sports = "soccer_epl".to_string();
    let g = game(
        "g_soc",
        "soccer_epl",
        "Arsenal",
        "Fulham",
        vec![market(
            "totals",
            vec![
                outcome("Over", 1.90, Some(2.5)),
                outcome("Under", 1.90, Some(2.5)),
            ],
        )],
    );
    let mut games = HashMap::new();
    games.insert("soccer_epl".to_string(), vec![g]);
    let soccer = FixedSoccer(SoccerPrediction {
        prob_home: 0.45,
        prob_draw: 0.27,
        prob_away: 0.28,
        prob_over25: 0.55,
        exp_home_goals: 1.5,
        exp_away_goals: 1.2,
    });
    let pipeline =
        build_pipeline(cfg, games, HashMap::new(), HashMap::new(), Arc::new(soccer));

    let report = pipeline.run().await;
    assert!(report.success);
    // Only the higher-edge side survives: calibrated p_over ≈ 0.5599 at
    // 1.90 gives ≈ +3.4% edge, the Under is negative.
    assert_eq!(report.inserts, 1);

    let db = Database::open(&path).unwrap();
    let row = db.intelligence_row("g_soc_over_2_5").unwrap().unwrap();
    assert!((row.edge - (row.true_prob - 1.0 / 1.90)).abs() < 1e-9);
    assert!(row.true_prob > 0.55 && row.true_prob < 0.57);
}

// ── S3: swap ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn s3_swap_replaces_weaker_pending_total() {
    let path = temp_db("s3");
    seed_pending(
        &path,
        "g2_over_212_5",
        "Over 212.5",
        "Sixers @ Celtics",
        1.90,
        0.030,
    );

    let cfg = test_config(&path);
    let g = game(
        "g2",
        "basketball_nba",
        "Celtics",
        "Sixers",
        vec![market(
            "totals",
            vec![
                outcome("Over", 1.90, Some(215.5)),
                outcome("Under", 1.90, Some(215.5)),
            ],
        )],
    );
    let mut games = HashMap::new();
    games.insert("basketball_nba".to_string(), vec![g]);
    let pipeline = build_pipeline(cfg, games, HashMap::new(), nba_ratings(), Arc::new(NoSoccer));

    let report = pipeline.run().await;
    assert!(report.success);
    assert_eq!(report.deletes, 1);
    assert_eq!(report.inserts, 1);

    let db = Database::open(&path).unwrap();
    assert!(db.intelligence_row("g2_over_212_5").unwrap().is_none());
    assert!(db.intelligence_row("g2_over_215_5").unwrap().is_some());
    assert_eq!(db.pending_count().unwrap(), 1);
    // Calibration rows for the revoked bet are gone too.
    assert_eq!(db.calibration_rows("g2_over_212_5").unwrap(), 0);
}

// ── S4: suppression inside the swap margin ───────────────────────────────────

#[tokio::test]
async fn s4_new_candidate_within_margin_is_suppressed() {
    let path = temp_db("s4");
    // Incumbent edge high enough that the challenger cannot clear it by
    // more than the half-point margin.
    seed_pending(
        &path,
        "g3_under_215_5",
        "Under 215.5",
        "Sixers @ Celtics",
        1.90,
        0.060,
    );

    let cfg = test_config(&path);
    let g = game(
        "g3",
        "basketball_nba",
        "Celtics",
        "Sixers",
        vec![market(
            "totals",
            vec![
                outcome("Over", 1.90, Some(215.5)),
                outcome("Under", 1.90, Some(215.5)),
            ],
        )],
    );
    let mut games = HashMap::new();
    games.insert("basketball_nba".to_string(), vec![g]);
    let pipeline = build_pipeline(cfg, games, HashMap::new(), nba_ratings(), Arc::new(NoSoccer));

    let report = pipeline.run().await;
    assert!(report.success);
    assert_eq!(report.inserts, 0);
    assert_eq!(report.deletes, 0);

    let db = Database::open(&path).unwrap();
    assert!(db.intelligence_row("g3_under_215_5").unwrap().is_some());
    assert_eq!(db.pending_count().unwrap(), 1);
}

// ── S5 / property 7: cross-run idempotence and alert dedup ───────────────────

#[tokio::test]
async fn s5_second_run_with_unchanged_inputs_is_silent() {
    let path = temp_db("s5");
    let cfg = test_config(&path);
    let g = game(
        "g1",
        "basketball_nba",
        "Celtics",
        "Sixers",
        vec![market(
            "h2h",
            vec![outcome("Celtics", 1.80, None), outcome("Sixers", 2.10, None)],
        )],
    );
    let mut games = HashMap::new();
    games.insert("basketball_nba".to_string(), vec![g]);
    let pipeline = build_pipeline(
        cfg,
        games,
        HashMap::new(),
        nba_ratings(),
        Arc::new(NoSoccer),
    );

    let first = pipeline.run().await;
    assert!(first.success);
    assert_eq!(first.inserts, 1);
    assert_eq!(first.alerts_sent, 1);

    let second = pipeline.run().await;
    assert!(second.success);
    assert_eq!(second.inserts, 0, "unchanged inputs must not re-insert");
    assert_eq!(second.alerts_sent, 0);

    let db = Database::open(&path).unwrap();
    assert_eq!(db.pending_count().unwrap(), 1);
    assert_eq!(db.alert_count().unwrap(), 1);
}

#[tokio::test]
async fn price_move_refreshes_pending_bet_in_place() {
    let path = temp_db("refresh");
    let cfg = test_config(&path);
    let make_games = |price: f64| {
        let g = game(
            "g1",
            "basketball_nba",
            "Celtics",
            "Sixers",
            vec![market(
                "h2h",
                vec![outcome("Celtics", price, None), outcome("Sixers", 2.10, None)],
            )],
        );
        let mut games = HashMap::new();
        games.insert("basketball_nba".to_string(), vec![g]);
        games
    };

    let first = build_pipeline(
        cfg.clone(),
        make_games(1.80),
        HashMap::new(),
        nba_ratings(),
        Arc::new(NoSoccer),
    );
    assert_eq!(first.run().await.inserts, 1);

    let second = build_pipeline(
        cfg,
        make_games(1.85),
        HashMap::new(),
        nba_ratings(),
        Arc::new(NoSoccer),
    );
    let report = second.run().await;
    assert_eq!(report.inserts, 1);
    assert_eq!(report.deletes, 0);

    let db = Database::open(&path).unwrap();
    assert_eq!(db.pending_count().unwrap(), 1);
    let row = db.intelligence_row("g1_celtics_ml").unwrap().unwrap();
    assert!((row.odds - 1.85).abs() < 1e-9);
}

// ── S6: missing ratings produce nothing ──────────────────────────────────────

#[tokio::test]
async fn s6_missing_ratings_yield_no_opportunities() {
    let path = temp_db("s6");
    let cfg = test_config(&path);
    let g = game(
        "g1",
        "basketball_nba",
        "Grizzlies",
        "Pelicans",
        vec![market(
            "h2h",
            vec![
                outcome("Grizzlies", 1.80, None),
                outcome("Pelicans", 2.10, None),
            ],
        )],
    );
    let mut games = HashMap::new();
    games.insert("basketball_nba".to_string(), vec![g]);
    // Ratings exist only for other teams.
    let pipeline = build_pipeline(cfg, games, HashMap::new(), nba_ratings(), Arc::new(NoSoccer));

    let report = pipeline.run().await;
    assert!(report.success);
    assert_eq!(report.inserts, 0);
}

// ── Property 9: past games are filtered ──────────────────────────────────────

#[tokio::test]
async fn past_games_produce_no_opportunities() {
    let path = temp_db("past");
    let cfg = test_config(&path);
    let mut g = game(
        "g1",
        "basketball_nba",
        "Celtics",
        "Sixers",
        vec![market(
            "h2h",
            vec![outcome("Celtics", 1.80, None), outcome("Sixers", 2.10, None)],
        )],
    );
    g.commence_time = Utc::now() - Duration::hours(2);
    let mut games = HashMap::new();
    games.insert("basketball_nba".to_string(), vec![g]);
    let pipeline = build_pipeline(cfg, games, HashMap::new(), nba_ratings(), Arc::new(NoSoccer));

    let report = pipeline.run().await;
    assert!(report.success);
    assert_eq!(report.inserts, 0);
}

// ── Property 5: at most one INSERT per (game, category) ──────────────────────

#[tokio::test]
async fn one_insert_per_category_even_with_many_value_lines() {
    let path = temp_db("onepercat");
    let cfg = test_config(&path);
    // Two totals lines well under the expected total: both Overs carry
    // positive edge, only the best may survive.
    let g = game(
        "g1",
        "basketball_nba",
        "Celtics",
        "Sixers",
        vec![market(
            "totals",
            vec![
                outcome("Over", 1.90, Some(213.5)),
                outcome("Under", 1.90, Some(213.5)),
                outcome("Over", 1.90, Some(215.5)),
                outcome("Under", 1.90, Some(215.5)),
            ],
        )],
    );
    let mut games = HashMap::new();
    games.insert("basketball_nba".to_string(), vec![g]);
    let pipeline = build_pipeline(cfg, games, HashMap::new(), nba_ratings(), Arc::new(NoSoccer));

    let report = pipeline.run().await;
    assert!(report.success);
    assert_eq!(report.inserts, 1);

    let db = Database::open(&path).unwrap();
    // The lower line has the larger Over probability, hence more edge.
    assert!(db.intelligence_row("g1_over_213_5").unwrap().is_some());
}

// ── Sharp signal acceptance without model value ──────────────────────────────

#[tokio::test]
async fn sharp_divergence_accepts_a_no_value_line() {
    let path = temp_db("sharp");
    let cfg = test_config(&path);
    // Even ratings: p_home ≈ Φ(2.5/11.5) ≈ 0.586, priced at 1.70 there is
    // no model edge.
    let mut teams = HashMap::new();
    teams.insert("Celtics".to_string(), bb(112.0, 108.0, 100.0));
    teams.insert("Sixers".to_string(), bb(112.0, 108.0, 100.0));
    let mut ratings = HashMap::new();
    ratings.insert("basketball_nba".to_string(), teams);

    let g = game(
        "g1",
        "basketball_nba",
        "Celtics",
        "Sixers",
        vec![market(
            "h2h",
            vec![outcome("Celtics", 1.70, None), outcome("Sixers", 2.30, None)],
        )],
    );
    let mut games = HashMap::new();
    games.insert("basketball_nba".to_string(), vec![g]);

    let mut splits = HashMap::new();
    let mut gs = GameSplits::default();
    gs.moneyline.insert(
        "celtics".to_string(),
        MarketSplit {
            money_pct: 80.0,
            tickets_pct: 40.0,
        },
    );
    splits.insert("sixers @ celtics".to_string(), gs);

    let pipeline = build_pipeline(cfg, games, splits, ratings, Arc::new(NoSoccer));
    let report = pipeline.run().await;
    assert!(report.success);
    assert_eq!(report.inserts, 1);

    let db = Database::open(&path).unwrap();
    let row = db.intelligence_row("g1_celtics_ml").unwrap().unwrap();
    assert_eq!(row.trigger_type, "sharp_signal");
    assert_eq!(row.sharp_score, 88);
    assert_eq!(row.money_pct, Some(80.0));
    assert_eq!(row.ticket_pct, Some(40.0));
}

// ── Rest days from the schedule seam ─────────────────────────────────────────

#[tokio::test]
async fn rest_days_from_schedule_reach_the_intelligence_log() {
    let path = temp_db("rest");
    let cfg = test_config(&path);
    let g = game(
        "g1",
        "basketball_nba",
        "Celtics",
        "Sixers",
        vec![market(
            "h2h",
            vec![outcome("Celtics", 1.80, None), outcome("Sixers", 2.10, None)],
        )],
    );
    let mut games = HashMap::new();
    games.insert("basketball_nba".to_string(), vec![g]);

    // Kickoff is six hours out: two days of rest for the home side, one
    // for the visitors.
    let mut last_played = HashMap::new();
    last_played.insert("Celtics".to_string(), Utc::now() - Duration::days(2));
    last_played.insert("Sixers".to_string(), Utc::now() - Duration::hours(20));

    let pipeline = Pipeline {
        config: cfg,
        odds: Arc::new(StaticOdds { games }),
        splits: Arc::new(StaticSplits::default()),
        ratings: Arc::new(StaticRatings {
            ratings: nba_ratings(),
        }),
        referees: Arc::new(NullReferees),
        schedule: Arc::new(StaticSchedule { last_played }),
        news: Arc::new(NullNews),
        alerts: Arc::new(LogAlerts),
        soccer: Arc::new(NoSoccer),
    };

    let report = pipeline.run().await;
    assert!(report.success);
    assert_eq!(report.inserts, 1);

    let db = Database::open(&path).unwrap();
    let row = db.intelligence_row("g1_celtics_ml").unwrap().unwrap();
    assert_eq!(row.home_rest, Some(2));
    assert_eq!(row.away_rest, Some(1));
}

// ── Partial odds-feed outage across sports ───────────────────────────────────

#[tokio::test]
async fn per_sport_feed_outage_is_partial() {
    let path = temp_db("outage");
    let mut cfg = test_config(&path);
    cfg.sports = "basketball_nba,icehockey_nhl".to_string();

    let g = game(
        "g1",
        "basketball_nba",
        "Celtics",
        "Sixers",
        vec![market(
            "h2h",
            vec![outcome("Celtics", 1.80, None), outcome("Sixers", 2.10, None)],
        )],
    );
    // NBA delivers; the NHL feed errors.
    let mut ok = HashMap::new();
    ok.insert("basketball_nba".to_string(), vec![g]);

    let pipeline = Pipeline {
        config: cfg,
        odds: Arc::new(SplitOdds { ok }),
        splits: Arc::new(StaticSplits::default()),
        ratings: Arc::new(StaticRatings {
            ratings: nba_ratings(),
        }),
        referees: Arc::new(NullReferees),
        schedule: Arc::new(StaticSchedule::default()),
        news: Arc::new(NullNews),
        alerts: Arc::new(LogAlerts),
        soccer: Arc::new(NoSoccer),
    };

    let report = pipeline.run().await;
    // The NBA bet still lands and the outage is recorded, not fatal.
    assert!(report.success);
    assert_eq!(report.inserts, 1);
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("icehockey_nhl")));
}

// ── NHL V2 totals flow ───────────────────────────────────────────────────────

#[tokio::test]
async fn nhl_v2_recommendation_carries_audit_trace() {
    let path = temp_db("nhl");
    let mut cfg = test_config(&path);
    cfg.sports = "icehockey_nhl".to_string();

    let mut teams = HashMap::new();
    teams.insert(
        "Oilers".to_string(),
        TeamRating::Hockey {
            attack: 3.6,
            defense: 3.4,
            league_avg_goals: 6.0,
        },
    );
    teams.insert(
        "Flames".to_string(),
        TeamRating::Hockey {
            attack: 3.5,
            defense: 3.6,
            league_avg_goals: 6.0,
        },
    );
    let mut ratings = HashMap::new();
    ratings.insert("icehockey_nhl".to_string(), teams);

    let g = game(
        "g_nhl",
        "icehockey_nhl",
        "Oilers",
        "Flames",
        vec![market(
            "totals",
            vec![
                outcome("Over", 2.00, Some(5.5)),
                outcome("Under", 1.83, Some(5.5)),
            ],
        )],
    );
    let mut games = HashMap::new();
    games.insert("icehockey_nhl".to_string(), vec![g]);

    let pipeline = build_pipeline(cfg, games, HashMap::new(), ratings, Arc::new(NoSoccer));
    let report = pipeline.run().await;
    assert!(report.success);
    assert_eq!(report.inserts, 1);

    let db = Database::open(&path).unwrap();
    let row = db.intelligence_row("g_nhl_over_5_5").unwrap().unwrap();
    assert_eq!(row.trigger_type, "model_v2");
    let metadata = row.metadata.unwrap();
    assert!(metadata.contains("nhl_totals_trace"));
    assert!(metadata.contains("expected_total"));
}
