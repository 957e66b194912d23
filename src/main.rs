use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use pregame_edge_bot::config::Config;
use pregame_edge_bot::models::soccer::{PoissonSoccerModel, SoccerModel};
use pregame_edge_bot::pipeline::Pipeline;
use pregame_edge_bot::sources::odds_api::OddsApiClient;
use pregame_edge_bot::sources::{
    LogAlerts, NullNews, NullReferees, OddsSource, StaticOdds, StaticRatings, StaticSchedule,
    StaticSplits,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    if config.dry_run {
        info!("🟡 DRY RUN mode – alerts will be logged, not sent");
    } else {
        info!("🔴 LIVE mode – alerts WILL be sent");
    }

    // Odds feed: the HTTP client when a key is configured, otherwise an
    // empty static source (dry runs without credentials).
    let odds: Arc<dyn OddsSource> = if config.odds_api_key.is_some() {
        Arc::new(OddsApiClient::new(
            &config.odds_api_url,
            config.odds_api_key.clone(),
        )?)
    } else {
        Arc::new(StaticOdds::default())
    };

    // Splits / ratings / referee / news scrapers plug in behind these
    // traits; the defaults keep the pipeline runnable without them.
    let soccer: Arc<dyn SoccerModel> =
        Arc::new(PoissonSoccerModel::new(Default::default(), 2.7));

    let pipeline = Pipeline {
        config: config.clone(),
        odds,
        splits: Arc::new(StaticSplits::default()),
        ratings: Arc::new(StaticRatings::default()),
        referees: Arc::new(NullReferees),
        schedule: Arc::new(StaticSchedule::default()),
        news: Arc::new(NullNews),
        alerts: Arc::new(LogAlerts),
        soccer,
    };

    let report = pipeline.run().await;
    if report.success {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            "Run {} failed with {} errors",
            report.run_id,
            report.errors.len()
        );
        Ok(ExitCode::FAILURE)
    }
}
