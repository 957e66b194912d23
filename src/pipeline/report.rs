//! Report stage: the run summary table and optional CSV artifacts.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::db::models::OpType;

use super::{Pipeline, RunContext};

impl Pipeline {
    pub(super) fn report(&self, ctx: &mut RunContext) -> Result<()> {
        let recs: Vec<_> = ctx
            .opportunities
            .iter()
            .filter(|o| o.op_type == OpType::Insert && o.edge > 0.0)
            .collect();

        if recs.is_empty() {
            info!("📋 No recommendations this run");
        } else {
            let mut table = String::new();
            let _ = writeln!(
                table,
                "{:<28} {:<24} {:>6} {:>7} {:>7} {:>7}  {}",
                "MATCHUP", "SELECTION", "ODDS", "PROB%", "EDGE%", "STAKE", "TRIGGER"
            );
            for op in &recs {
                let _ = writeln!(
                    table,
                    "{:<28} {:<24} {:>6.2} {:>6.1}% {:>6.2}% {:>7.2}  {}",
                    truncate(&op.teams, 28),
                    truncate(&op.selection, 24),
                    op.odds,
                    op.true_prob * 100.0,
                    op.edge * 100.0,
                    op.stake,
                    op.trigger_type
                );
            }
            info!("📋 {} recommendations:\n{}", recs.len(), table);
        }
        for err in &ctx.errors {
            warn!("⚠️ Partial failure: {}", err);
        }

        if self.config.report_csv {
            self.write_csv_artifacts(ctx)?;
        }
        Ok(())
    }

    fn write_csv_artifacts(&self, ctx: &RunContext) -> Result<()> {
        let dir = Path::new(&self.config.report_dir);
        fs::create_dir_all(dir).context("creating report dir")?;

        let mut recs = String::from(
            "run_id,event_id,sport,teams,selection,book,odds,true_prob,edge,stake,trigger_type,sharp_score\n",
        );
        let mut audit = String::from("run_id,event_id,sport,teams,selection,trace\n");
        for op in &ctx.opportunities {
            if op.op_type != OpType::Insert {
                continue;
            }
            let _ = writeln!(
                recs,
                "{},{},{},{},{},{},{:.3},{:.4},{:.4},{:.2},{},{}",
                ctx.run_id,
                op.event_id,
                op.sport,
                csv_field(&op.teams),
                csv_field(&op.selection),
                op.book,
                op.odds,
                op.true_prob,
                op.edge,
                op.stake,
                op.trigger_type,
                op.sharp_score
            );
            for key in ["nhl_totals_trace", "nhl_moneyline_trace"] {
                if let Some(trace) = op.metadata.get(key) {
                    let _ = writeln!(
                        audit,
                        "{},{},{},{},{},{}",
                        ctx.run_id,
                        op.event_id,
                        op.sport,
                        csv_field(&op.teams),
                        csv_field(&op.selection),
                        csv_field(&trace.to_string())
                    );
                }
            }
        }

        let stamp = ctx.now.format("%Y%m%d_%H%M%S");
        let recs_path = dir.join(format!("recommendations_{}.csv", stamp));
        fs::write(&recs_path, recs).context("writing recommendations csv")?;
        info!("🗂️ Wrote {}", recs_path.display());

        if audit.lines().count() > 1 {
            let audit_path = dir.join(format!("nhl_audit_{}.csv", stamp));
            fs::write(&audit_path, audit).context("writing audit csv")?;
            info!("🗂️ Wrote {}", audit_path.display());
        }
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max - 1).chain(std::iter::once('…')).collect()
    }
}

/// Quote a CSV field that contains separators or quotes.
fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
