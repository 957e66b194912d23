//! Fetch stage: odds per sport, sharp splits, and the pending-bet snapshot.
//!
//! Per-source failures are partial: the run continues with whatever data
//! arrived. The pending-bet index and the signature set are built here and
//! read-only for the rest of the run.

use anyhow::{anyhow, Result};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::info;

use crate::markets::bet_signature;
use crate::sources::Game;

use super::{Pipeline, RunContext};

/// Bound on concurrent per-sport odds fetches.
const MAX_CONCURRENT_FETCHES: usize = 8;

impl Pipeline {
    pub(super) async fn fetch(&self, ctx: &mut RunContext) -> Result<()> {
        let sports = ctx.sports.clone();
        let fetched: Vec<(String, Result<Vec<Game>>)> = stream::iter(sports)
            .map(|sport| {
                let odds = Arc::clone(&self.odds);
                async move {
                    let games = odds.fetch_games(&sport).await;
                    (sport, games)
                }
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;
        for (sport, result) in fetched {
            match result {
                Ok(games) => {
                    ctx.odds.insert(sport, games);
                }
                Err(e) => {
                    ctx.note_failure("fetch", &e.context(format!("odds for {}", sport)));
                }
            }
        }

        match self.splits.fetch_splits().await {
            Ok(splits) => {
                info!("📊 Sharp splits for {} matchups", splits.len());
                ctx.splits = splits;
            }
            Err(e) => ctx.note_failure("fetch", &e.context("sharp splits")),
        }

        let db = ctx
            .db
            .as_ref()
            .ok_or_else(|| anyhow!("store handle missing at fetch"))?;
        let pending = db.list_pending_bets()?;
        info!(
            "📥 {} games across {} sports, {} pending bets",
            ctx.odds.values().map(Vec::len).sum::<usize>(),
            ctx.odds.len(),
            pending.len()
        );

        for bet in pending {
            // "<away> @ <home>" splits on the literal separator.
            if let Some((away, home)) = bet.teams.split_once(" @ ") {
                ctx.seen_signatures
                    .insert(bet_signature(away, home, &bet.selection));
            }
            ctx.seen_categories
                .insert((bet.teams.clone(), bet.category));
            ctx.pending.entry(bet.game_id.clone()).or_default().push(bet);
        }
        Ok(())
    }
}
