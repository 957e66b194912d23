//! The evaluation pipeline: a fixed sequence of stages sharing one run
//! context.
//!
//! Stages run in order on a single task. `init` and `persist` failures are
//! fatal; every other stage failure is recorded as a partial failure and
//! the run continues with whatever data it has. The database handle is
//! released on every exit path.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

mod enrich;
mod fetch;
mod notify;
mod process;
mod report;

use crate::config::Config;
use crate::db::models::{OpType, Opportunity, PendingBet, PersistStats};
use crate::db::Database;
use crate::markets::MarketCategory;
use crate::models::soccer::SoccerModel;
use crate::sources::{
    AlertSender, Game, GameSplits, NewsSource, OddsSource, RatingsSource, RefereeSource,
    ScheduleSource, SplitsSource, TeamRating,
};

/// Per-run mutable state threaded through the stages.
pub struct RunContext {
    pub run_id: String,
    pub sports: Vec<String>,
    pub config: Config,
    /// Held from `init` until the end of the run; `None` after release.
    pub db: Option<Database>,
    /// Fetched odds, keyed by sport.
    pub odds: HashMap<String, Vec<Game>>,
    /// Sharp splits keyed by `"<norm_away> @ <norm_home>"`.
    pub splits: HashMap<String, GameSplits>,
    /// Team ratings per sport.
    pub ratings: HashMap<String, HashMap<String, TeamRating>>,
    /// Referee assignments keyed by `"<away> @ <home>"`.
    pub referees: HashMap<String, Vec<String>>,
    /// Lineup/news win-probability impacts keyed by team name.
    pub news_impact: HashMap<String, f64>,
    /// Last completed game per team; rest days derive from these.
    pub last_played: HashMap<String, DateTime<Utc>>,
    /// Currently-PENDING bets indexed by game id.
    pub pending: HashMap<String, Vec<PendingBet>>,
    /// Cross-run bet signatures `"<away> @ <home> [<selection>]"`.
    pub seen_signatures: HashSet<String>,
    /// Matchup+category pairs already holding a pending bet; blocks
    /// re-emission when the game id changed between runs.
    pub seen_categories: HashSet<(String, MarketCategory)>,
    /// The run's output buffer, in emission order.
    pub opportunities: Vec<Opportunity>,
    /// Partial-failure notes.
    pub errors: Vec<String>,
    /// Free-form audit metadata.
    pub metadata: Map<String, Value>,
    pub now: DateTime<Utc>,
    pub persist_stats: PersistStats,
    pub alerts_sent: usize,
}

impl RunContext {
    fn new(config: Config, now: DateTime<Utc>) -> Self {
        RunContext {
            run_id: format!("run-{}", now.format("%Y%m%dT%H%M%SZ")),
            sports: config.target_sports(),
            config,
            db: None,
            odds: HashMap::new(),
            splits: HashMap::new(),
            ratings: HashMap::new(),
            referees: HashMap::new(),
            news_impact: HashMap::new(),
            last_played: HashMap::new(),
            pending: HashMap::new(),
            seen_signatures: HashSet::new(),
            seen_categories: HashSet::new(),
            opportunities: Vec::new(),
            errors: Vec::new(),
            metadata: Map::new(),
            now,
            persist_stats: PersistStats::default(),
            alerts_sent: 0,
        }
    }

    pub(crate) fn note_failure(&mut self, stage: &str, err: &anyhow::Error) {
        warn!("⚠️ Stage '{}' partial failure: {:#}", stage, err);
        self.errors.push(format!("{}: {:#}", stage, err));
    }
}

/// Final accounting for one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub success: bool,
    pub inserts: usize,
    pub deletes: usize,
    pub alerts_sent: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    Fetch,
    Enrich,
    Process,
    Persist,
    Report,
    Notify,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Fetch => "fetch",
            Stage::Enrich => "enrich",
            Stage::Process => "process",
            Stage::Persist => "persist",
            Stage::Report => "report",
            Stage::Notify => "notify",
        }
    }

    fn is_fatal(&self) -> bool {
        matches!(self, Stage::Init | Stage::Persist)
    }
}

const STAGES: &[Stage] = &[
    Stage::Init,
    Stage::Fetch,
    Stage::Enrich,
    Stage::Process,
    Stage::Persist,
    Stage::Report,
    Stage::Notify,
];

/// The assembled pipeline: configuration plus every external collaborator
/// behind its trait.
pub struct Pipeline {
    pub config: Config,
    pub odds: Arc<dyn OddsSource>,
    pub splits: Arc<dyn SplitsSource>,
    pub ratings: Arc<dyn RatingsSource>,
    pub referees: Arc<dyn RefereeSource>,
    pub schedule: Arc<dyn ScheduleSource>,
    pub news: Arc<dyn NewsSource>,
    pub alerts: Arc<dyn AlertSender>,
    pub soccer: Arc<dyn SoccerModel>,
}

impl Pipeline {
    /// Execute one full run. Never returns an error for partial failures;
    /// only the report says whether the run counts as successful.
    pub async fn run(&self) -> RunReport {
        let mut ctx = RunContext::new(self.config.clone(), Utc::now());
        info!("🚀 Starting {} for sports {:?}", ctx.run_id, ctx.sports);

        let mut fatal = false;
        for stage in STAGES {
            match self.run_stage(*stage, &mut ctx).await {
                Ok(()) => {}
                Err(e) if stage.is_fatal() => {
                    error!("💥 Stage '{}' failed fatally: {:#}", stage.name(), e);
                    ctx.errors.push(format!("{}: {:#}", stage.name(), e));
                    fatal = true;
                    break;
                }
                Err(e) => ctx.note_failure(stage.name(), &e),
            }
        }

        // Release the store handle on every exit path.
        ctx.db = None;

        let inserts = ctx
            .opportunities
            .iter()
            .filter(|o| o.op_type == OpType::Insert)
            .count();
        let deletes = ctx.opportunities.len() - inserts;
        // A run that produced nothing while accumulating failures is a
        // failed run even if no stage was fatal.
        let success = !fatal && !(inserts == 0 && !ctx.errors.is_empty());

        if success {
            info!(
                "✅ {} finished: {} inserts, {} deletes, {} alerts, {} partial failures",
                ctx.run_id,
                inserts,
                deletes,
                ctx.alerts_sent,
                ctx.errors.len()
            );
        } else {
            error!("❌ {} failed ({} errors)", ctx.run_id, ctx.errors.len());
        }

        RunReport {
            run_id: ctx.run_id,
            success,
            inserts,
            deletes,
            alerts_sent: ctx.alerts_sent,
            errors: ctx.errors,
        }
    }

    async fn run_stage(&self, stage: Stage, ctx: &mut RunContext) -> Result<()> {
        match stage {
            Stage::Init => self.init(ctx),
            Stage::Fetch => self.fetch(ctx).await,
            Stage::Enrich => self.enrich(ctx).await,
            Stage::Process => self.process(ctx),
            Stage::Persist => self.persist(ctx),
            Stage::Report => self.report(ctx),
            Stage::Notify => self.notify(ctx).await,
        }
    }

    /// Open the store, verify credentials and model coverage. Fatal on any
    /// failure.
    fn init(&self, ctx: &mut RunContext) -> Result<()> {
        self.config.validate()?;
        if !self.config.dry_run {
            self.odds.verify_credentials()?;
        }
        crate::models::verify_artifacts(&ctx.sports)?;
        let db = Database::open(&self.config.database_path)?;
        ctx.db = Some(db);
        info!("🔧 Init OK (store: {})", self.config.database_path);
        Ok(())
    }

    /// Replay the opportunity buffer into the store in one transaction.
    fn persist(&self, ctx: &mut RunContext) -> Result<()> {
        let db = ctx
            .db
            .as_ref()
            .ok_or_else(|| anyhow!("store handle missing at persist"))?;
        let stats = db.persist_operations(&ctx.opportunities, ctx.now)?;
        info!(
            "💾 Persisted {} inserts / {} deletes ({} calibration rows, {} calibration failures)",
            stats.inserted, stats.deleted, stats.calibration_rows, stats.calibration_failures
        );
        ctx.persist_stats = stats;
        Ok(())
    }
}
