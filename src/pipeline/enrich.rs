//! Enrich stage: team ratings, referee assignments, and lineup news.
//!
//! Everything here is advisory. A missing ratings map means the affected
//! sport produces no model-derived candidates later; it never aborts the
//! run.

use anyhow::Result;
use tracing::info;

use super::{Pipeline, RunContext};

impl Pipeline {
    pub(super) async fn enrich(&self, ctx: &mut RunContext) -> Result<()> {
        let sports = ctx.sports.clone();
        for sport in &sports {
            // Soccer ratings live inside the soccer predictor.
            if sport.starts_with("soccer_") {
                continue;
            }
            match self.ratings.fetch_ratings(sport).await {
                Ok(ratings) => {
                    info!("📈 {} ratings for {}", ratings.len(), sport);
                    ctx.ratings.insert(sport.clone(), ratings);
                }
                Err(e) => {
                    ctx.note_failure("enrich", &e.context(format!("ratings for {}", sport)));
                }
            }

            match self.referees.fetch_assignments(sport).await {
                Ok(assignments) => ctx.referees.extend(assignments),
                Err(e) => {
                    ctx.note_failure("enrich", &e.context(format!("referees for {}", sport)));
                }
            }

            match self.schedule.fetch_last_played(sport).await {
                Ok(last_played) => ctx.last_played.extend(last_played),
                Err(e) => {
                    ctx.note_failure("enrich", &e.context(format!("schedule for {}", sport)));
                }
            }
        }

        match self.news.fetch_impacts().await {
            Ok(impacts) => ctx.news_impact = impacts,
            Err(e) => ctx.note_failure("enrich", &e.context("news impacts")),
        }
        Ok(())
    }
}
