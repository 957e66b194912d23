use clap::Parser;

use crate::models::SigmaConfig;

/// Pre-game sports betting value pipeline
#[derive(Parser, Debug, Clone)]
#[command(name = "pregame-edge-bot", version, about)]
pub struct Config {
    /// Target sports: "ALL" or a comma-separated list of sport keys
    /// (basketball_nba, basketball_ncaab, americanfootball_nfl,
    /// icehockey_nhl, soccer_epl)
    #[arg(long, env = "SPORTS", default_value = "ALL")]
    pub sports: String,

    /// Run in dry-run mode (alerts are formatted and logged, not sent)
    #[arg(long, env = "DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// Write CSV artifacts of recommendations and model audit traces
    #[arg(long, env = "REPORT_CSV", default_value = "false")]
    pub report_csv: bool,

    /// Directory for CSV artifacts
    #[arg(long, env = "REPORT_DIR", default_value = "reports")]
    pub report_dir: String,

    /// SQLite database path (":memory:" for throwaway runs)
    #[arg(long, env = "DATABASE_PATH", default_value = "pregame.db")]
    pub database_path: String,

    /// Odds API base URL
    #[arg(
        long,
        env = "ODDS_API_URL",
        default_value = "https://api.the-odds-api.com/v4"
    )]
    pub odds_api_url: String,

    /// Odds API key (required unless --dry-run)
    #[arg(long, env = "ODDS_API_KEY")]
    pub odds_api_key: Option<String>,

    /// Preferred bookmakers, best first; the first one present on a game
    /// is used and the rest are ignored
    #[arg(
        long,
        env = "PREFERRED_BOOKS",
        default_value = "pinnacle,fanduel,draftkings,betmgm"
    )]
    pub preferred_books: String,

    /// Bankroll in units (stakes are denominated against this)
    #[arg(long, env = "BANKROLL", default_value = "1000.0")]
    pub bankroll: f64,

    /// Fractional Kelly multiplier (0.0–1.0)
    #[arg(long, env = "KELLY_FRAC", default_value = "0.125")]
    pub kelly_frac: f64,

    /// Hard stake cap as a fraction of bankroll
    #[arg(long, env = "MAX_STAKE_PCT", default_value = "0.06")]
    pub max_stake_pct: f64,

    /// Global minimum edge for a value bet
    #[arg(long, env = "MIN_EDGE", default_value = "0.03")]
    pub min_edge: f64,

    /// Edges at or above this are treated as stale lines and rejected
    #[arg(long, env = "MAX_EDGE", default_value = "0.20")]
    pub max_edge: f64,

    /// Global probability clamp for Gaussian/Poisson-derived probabilities
    #[arg(long, env = "MAX_PROBABILITY", default_value = "0.72")]
    pub max_probability: f64,

    /// Sport-specific minimum edges
    #[arg(long, env = "MIN_EDGE_SOCCER", default_value = "0.03")]
    pub min_edge_soccer: f64,

    #[arg(long, env = "MIN_EDGE_NCAAB", default_value = "0.04")]
    pub min_edge_ncaab: f64,

    #[arg(long, env = "MIN_EDGE_NHL", default_value = "0.025")]
    pub min_edge_nhl: f64,

    /// Sharp score required for a sharp-signal acceptance
    #[arg(long, env = "SHARP_SIGNAL_THRESHOLD", default_value = "2")]
    pub sharp_signal_threshold: i32,

    /// Logit-scale calibration applied to soccer model probabilities
    #[arg(long, env = "MARKET_WEIGHT_SOCCER", default_value = "1.2")]
    pub market_weight_soccer: f64,

    /// Logit-scale calibration applied to US binary-market probabilities
    #[arg(long, env = "CALIBRATION_SCALE", default_value = "1.0")]
    pub calibration_scale: f64,

    /// Sport-specific margin standard deviations
    #[arg(long, env = "NBA_MARGIN_STD", default_value = "11.5")]
    pub nba_margin_std: f64,

    #[arg(long, env = "NCAAB_MARGIN_STD", default_value = "10.5")]
    pub ncaab_margin_std: f64,

    #[arg(long, env = "NFL_MARGIN_STD", default_value = "13.5")]
    pub nfl_margin_std: f64,

    #[arg(long, env = "NHL_MARGIN_STD", default_value = "2.2")]
    pub nhl_margin_std: f64,

    /// Feature flags
    #[arg(long, env = "NHL_TOTALS_V2_ENABLED", default_value = "true")]
    pub nhl_totals_v2_enabled: bool,

    #[arg(long, env = "ENABLE_NBA_V2", default_value = "true")]
    pub enable_nba_v2: bool,

    #[arg(long, env = "ENABLE_SOCCER_V2", default_value = "true")]
    pub enable_soccer_v2: bool,

    /// Evaluate NHL spreads/ML from the legacy ratings Gaussian instead of
    /// relying solely on the V2 models (kept for comparison runs)
    #[arg(long, env = "NHL_LEGACY_RATINGS_ENABLED", default_value = "false")]
    pub nhl_legacy_ratings_enabled: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.dry_run && self.odds_api_key.is_none() {
            anyhow::bail!("ODDS_API_KEY is required outside dry-run mode");
        }
        if !(0.0..=1.0).contains(&self.kelly_frac) {
            anyhow::bail!("kelly_frac must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.max_stake_pct) {
            anyhow::bail!("max_stake_pct must be between 0.0 and 1.0");
        }
        if self.bankroll <= 0.0 {
            anyhow::bail!("bankroll must be positive");
        }
        if self.min_edge >= self.max_edge {
            anyhow::bail!("min_edge must be below max_edge");
        }
        if !(0.5..=1.0).contains(&self.max_probability) {
            anyhow::bail!("max_probability must be between 0.5 and 1.0");
        }
        if self.target_sports().is_empty() {
            anyhow::bail!("no target sports configured");
        }
        Ok(())
    }

    /// Expand the `--sports` flag into concrete sport keys.
    pub fn target_sports(&self) -> Vec<String> {
        if self.sports.trim().eq_ignore_ascii_case("all") {
            crate::models::SUPPORTED_SPORTS
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.sports
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }
    }

    pub fn preferred_books(&self) -> Vec<String> {
        self.preferred_books
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn sigmas(&self) -> SigmaConfig {
        SigmaConfig {
            nba: self.nba_margin_std,
            ncaab: self.ncaab_margin_std,
            nfl: self.nfl_margin_std,
            nhl: self.nhl_margin_std,
        }
    }

    /// Minimum edge for a sport (global default unless overridden).
    pub fn min_edge_for(&self, sport: &str) -> f64 {
        match sport {
            "basketball_ncaab" => self.min_edge_ncaab,
            "icehockey_nhl" => self.min_edge_nhl,
            s if s.starts_with("soccer_") => self.min_edge_soccer,
            _ => self.min_edge,
        }
    }
}
