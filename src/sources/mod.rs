//! External data sources: wire types and provider traits.
//!
//! The pipeline core never talks HTTP directly; it consumes these traits.
//! Default implementations live in `odds_api` (The Odds API shape) and the
//! static stubs below, which also back the integration tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod odds_api;

// ── Odds feed wire types ─────────────────────────────────────────────────────

/// A scheduled game as delivered by the odds feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

impl Game {
    /// `"<away> @ <home>"`, the canonical matchup string.
    pub fn teams(&self) -> String {
        format!("{} @ {}", self.away_team, self.home_team)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmaker {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub markets: Vec<BookMarket>,
}

/// One market on one book: `h2h`, `spreads`, `totals`, their `_h1`
/// variants, `alternate_totals`, or a `player_*` prop key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookMarket {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<BookOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookOutcome {
    pub name: String,
    /// Decimal odds.
    pub price: f64,
    #[serde(default)]
    pub point: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
}

// ── Sharp splits ─────────────────────────────────────────────────────────────

/// Public-money split for one side of one market.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketSplit {
    pub money_pct: f64,
    pub tickets_pct: f64,
}

/// Splits for a single matchup, keyed by side name (normalized team name
/// for spread/moneyline; "Over" / "Under" / "Draw" otherwise).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameSplits {
    #[serde(default)]
    pub spread: HashMap<String, MarketSplit>,
    #[serde(default)]
    pub moneyline: HashMap<String, MarketSplit>,
    #[serde(default)]
    pub total: HashMap<String, MarketSplit>,
}

// ── Team ratings ─────────────────────────────────────────────────────────────

/// Sport-typed team strength metrics from the ratings scrapers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "sport", rename_all = "snake_case")]
pub enum TeamRating {
    /// NBA / NCAAB: points per 100 possessions and possessions per 40/48.
    Basketball {
        offensive_eff: f64,
        defensive_eff: f64,
        tempo: f64,
    },
    /// NFL: yards per play and points per game, both directions.
    Football {
        off_ypp: f64,
        def_ypp: f64,
        off_ppg: f64,
        def_ppg: f64,
    },
    /// NHL: expected goals for/against per game (legacy path, see config).
    Hockey {
        attack: f64,
        defense: f64,
        league_avg_goals: f64,
    },
}

impl TeamRating {
    /// Net efficiency (adjusted EM) for basketball ratings, else `None`.
    pub fn adj_em(&self) -> Option<f64> {
        match self {
            TeamRating::Basketball {
                offensive_eff,
                defensive_eff,
                ..
            } => Some(offensive_eff - defensive_eff),
            _ => None,
        }
    }
}

// ── Provider traits ──────────────────────────────────────────────────────────

/// Pre-game odds provider.
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Fetch all scheduled games for one sport key.
    async fn fetch_games(&self, sport: &str) -> Result<Vec<Game>>;

    /// Cheap credential/reachability check, called during `init`.
    fn verify_credentials(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Public-money splits provider. Keys are `"<norm_away> @ <norm_home>"`.
#[async_trait]
pub trait SplitsSource: Send + Sync {
    async fn fetch_splits(&self) -> Result<HashMap<String, GameSplits>>;
}

/// Team-strength ratings provider (read-through cache upstream).
#[async_trait]
pub trait RatingsSource: Send + Sync {
    async fn fetch_ratings(&self, sport: &str) -> Result<HashMap<String, TeamRating>>;
}

/// Referee assignments, keyed by `"<away> @ <home>"`.
#[async_trait]
pub trait RefereeSource: Send + Sync {
    async fn fetch_assignments(&self, sport: &str) -> Result<HashMap<String, Vec<String>>>;
}

/// Last completed game per team, keyed by team name. The process stage
/// derives rest days from these against each kickoff.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn fetch_last_played(&self, sport: &str) -> Result<HashMap<String, DateTime<Utc>>>;
}

/// Lineup/news impact in win-probability points, keyed by team name.
/// Values are small and bounded; the process stage clamps to ±0.03.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_impacts(&self) -> Result<HashMap<String, f64>>;
}

/// Outbound alert transport (Telegram, email, ...).
#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;

    fn name(&self) -> &str;
}

// ── Static stubs ─────────────────────────────────────────────────────────────

/// In-memory odds source for dry runs and tests.
#[derive(Debug, Default)]
pub struct StaticOdds {
    pub games: HashMap<String, Vec<Game>>,
}

#[async_trait]
impl OddsSource for StaticOdds {
    async fn fetch_games(&self, sport: &str) -> Result<Vec<Game>> {
        Ok(self.games.get(sport).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "static-odds"
    }
}

#[derive(Debug, Default)]
pub struct StaticSplits {
    pub splits: HashMap<String, GameSplits>,
}

#[async_trait]
impl SplitsSource for StaticSplits {
    async fn fetch_splits(&self) -> Result<HashMap<String, GameSplits>> {
        Ok(self.splits.clone())
    }
}

#[derive(Debug, Default)]
pub struct StaticRatings {
    pub ratings: HashMap<String, HashMap<String, TeamRating>>,
}

#[async_trait]
impl RatingsSource for StaticRatings {
    async fn fetch_ratings(&self, sport: &str) -> Result<HashMap<String, TeamRating>> {
        Ok(self.ratings.get(sport).cloned().unwrap_or_default())
    }
}

/// Empty referee source.
#[derive(Debug, Default)]
pub struct NullReferees;

#[async_trait]
impl RefereeSource for NullReferees {
    async fn fetch_assignments(&self, _sport: &str) -> Result<HashMap<String, Vec<String>>> {
        Ok(HashMap::new())
    }
}

/// In-memory schedule source; empty by default (rest days unknown).
#[derive(Debug, Default)]
pub struct StaticSchedule {
    pub last_played: HashMap<String, DateTime<Utc>>,
}

#[async_trait]
impl ScheduleSource for StaticSchedule {
    async fn fetch_last_played(&self, _sport: &str) -> Result<HashMap<String, DateTime<Utc>>> {
        Ok(self.last_played.clone())
    }
}

/// Empty news source.
#[derive(Debug, Default)]
pub struct NullNews;

#[async_trait]
impl NewsSource for NullNews {
    async fn fetch_impacts(&self) -> Result<HashMap<String, f64>> {
        Ok(HashMap::new())
    }
}

/// Alert sender that only logs; the default in dry runs and tests.
#[derive(Debug, Default)]
pub struct LogAlerts;

#[async_trait]
impl AlertSender for LogAlerts {
    async fn send(&self, message: &str) -> Result<()> {
        tracing::info!("ALERT (log only):\n{}", message);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
