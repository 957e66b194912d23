//! Notify stage: collapse, hash-dedup, format, send.
//!
//! Alerts are keyed by a SHA-256 content hash; the dedup table is the
//! source of truth for "already alerted". Transport failures leave the
//! hash unrecorded so the next run retries.

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::db::models::{OpType, Opportunity};
use crate::sharp;

use super::{Pipeline, RunContext};

impl Pipeline {
    pub(super) async fn notify(&self, ctx: &mut RunContext) -> Result<()> {
        let survivors = collapse(&ctx.opportunities);
        if survivors.is_empty() {
            return Ok(());
        }

        let db = ctx
            .db
            .as_ref()
            .ok_or_else(|| anyhow!("store handle missing at notify"))?
            .clone();

        for op in survivors {
            let bet_id = alert_hash(&op);
            let message = format_alert(&op, &ctx.run_id);

            if self.config.dry_run {
                info!("🔕 [dry-run] would alert {}:\n{}", bet_id, message);
                continue;
            }
            if db.alert_seen(&bet_id)? {
                continue;
            }
            match self.alerts.send(&message).await {
                Ok(()) => {
                    let payload = serde_json::json!({
                        "event_id": op.event_id,
                        "selection": op.selection,
                        "odds": op.odds,
                        "edge": op.edge,
                        "stake": op.stake,
                    });
                    db.record_alert(&bet_id, &ctx.run_id, &payload.to_string())?;
                    ctx.alerts_sent += 1;
                }
                Err(e) => {
                    // Not recorded: the next run retries this alert.
                    warn!("⚠️ Alert send failed for {}: {:#}", op.event_id, e);
                    ctx.errors.push(format!("notify {}: {:#}", op.event_id, e));
                }
            }
        }
        if ctx.alerts_sent > 0 {
            info!("📣 Sent {} alerts via {}", ctx.alerts_sent, self.alerts.name());
        }
        Ok(())
    }
}

/// Keep only the highest-edge opportunity per
/// `(teams, Total|Side, 1H|FG)` key.
fn collapse(ops: &[Opportunity]) -> Vec<Opportunity> {
    let mut best: HashMap<(String, &'static str, &'static str), &Opportunity> = HashMap::new();
    let mut order: Vec<(String, &'static str, &'static str)> = Vec::new();
    for op in ops {
        if op.op_type != OpType::Insert {
            continue;
        }
        let kind = if op.category.is_total() { "Total" } else { "Side" };
        let period = if op.category.is_first_half() { "1H" } else { "FG" };
        let key = (op.teams.clone(), kind, period);
        match best.get(&key) {
            Some(existing) if existing.edge >= op.edge => {}
            Some(_) => {
                best.insert(key, op);
            }
            None => {
                order.push(key.clone());
                best.insert(key, op);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|k| best.remove(&k).cloned())
        .collect()
}

/// Deterministic alert id over the fields that define "the same bet".
pub fn alert_hash(op: &Opportunity) -> String {
    let payload = format!(
        "{}|{}|{}|{}|{}|{:.2}",
        op.sport, op.market_key, op.game_id, op.selection, op.book, op.odds
    );
    let digest = Sha256::digest(payload.as_bytes());
    hex::encode(digest)
}

fn sport_emoji(sport: &str) -> &'static str {
    match sport {
        s if s.starts_with("basketball") => "🏀",
        s if s.starts_with("americanfootball") => "🏈",
        s if s.starts_with("icehockey") => "🏒",
        s if s.starts_with("soccer") => "⚽",
        _ => "🎯",
    }
}

fn format_alert(op: &Opportunity, run_id: &str) -> String {
    format!(
        "{} {}\n{} @ {:.2}\nModel {:.1}% | Edge {:.2}% | {} {}\nStake: {:.2}u\n{}",
        sport_emoji(&op.sport),
        op.teams,
        op.selection,
        op.odds,
        op.true_prob * 100.0,
        op.edge * 100.0,
        sharp::tier(op.sharp_score),
        op.sharp_score,
        op.stake,
        run_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::MarketCategory;
    use crate::models::RatingFeatures;
    use chrono::Utc;
    use serde_json::Map;

    fn op(teams: &str, selection: &str, edge: f64) -> Opportunity {
        Opportunity {
            event_id: format!("g1_{}", crate::markets::selection_slug(selection)),
            game_id: "g1".to_string(),
            timestamp: Utc::now(),
            kickoff: Utc::now(),
            sport: "basketball_nba".to_string(),
            teams: teams.to_string(),
            selection: selection.to_string(),
            book: "pinnacle".to_string(),
            market_key: "totals".to_string(),
            category: MarketCategory::from_selection(selection),
            odds: 1.91,
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
        }
    }

    #[test]
    fn collapse_keeps_max_edge_per_key() {
        let ops = vec![
            op("Sixers @ Celtics", "Over 138.5", 0.031),
            op("Sixers @ Celtics", "Under 139.5", 0.045),
            op("Sixers @ Celtics", "Celtics ML", 0.040),
        ];
        let survivors = collapse(&ops);
        assert_eq!(survivors.len(), 2);
        assert!(survivors.iter().any(|o| o.selection == "Under 139.5"));
        assert!(survivors.iter().any(|o| o.selection == "Celtics ML"));
    }

    #[test]
    fn first_half_totals_do_not_collapse_into_full_game() {
        let ops = vec![
            op("Sixers @ Celtics", "Over 138.5", 0.031),
            op("Sixers @ Celtics", "1H Over 70.5", 0.020),
        ];
        assert_eq!(collapse(&ops).len(), 2);
    }

    #[test]
    fn hash_is_deterministic_and_odds_sensitive() {
        let a = op("Sixers @ Celtics", "Over 138.5", 0.031);
        let mut b = a.clone();
        assert_eq!(alert_hash(&a), alert_hash(&b));
        b.odds = 1.95;
        assert_ne!(alert_hash(&a), alert_hash(&b));
    }
}
