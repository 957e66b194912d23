use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub mod models;
use models::*;

use crate::markets::{game_id_from_event, MarketCategory};
use crate::models::probability::probability_bucket;

/// Thread-safe SQLite handle (single connection with mutex).
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path.
    /// `:memory:` is accepted for tests and throwaway dry runs.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        if path != ":memory:" {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent).
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Pending bets ─────────────────────────────────────────────────────────

    /// Load every PENDING bet from the intelligence log. The game id is
    /// recovered from the deterministic event-id suffix.
    pub fn list_pending_bets(&self) -> Result<Vec<PendingBet>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT event_id, selection, teams, sport, odds, edge
             FROM intelligence_log WHERE outcome = 'PENDING'
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
            ))
        })?;
        let mut bets = Vec::new();
        for row in rows {
            let (event_id, selection, teams, sport, odds, edge) = row?;
            let Some(game_id) = game_id_from_event(&event_id, &selection) else {
                // Row predates the deterministic id scheme; skip it.
                continue;
            };
            let category = MarketCategory::from_selection(&selection);
            bets.push(PendingBet {
                event_id,
                game_id,
                selection,
                teams,
                sport,
                odds,
                edge,
                category,
            });
        }
        Ok(bets)
    }

    // ── Persist (single transaction) ─────────────────────────────────────────

    /// Replay the run's INSERT/DELETE ops in one transaction, append
    /// calibration rows (savepoint-guarded), and update the heartbeat.
    /// Any error rolls the whole transaction back.
    pub fn persist_operations(&self, ops: &[Opportunity], now: DateTime<Utc>) -> Result<PersistStats> {
        let mut conn = self.conn.lock().unwrap();
        let mut tx = conn.transaction()?;
        let mut stats = PersistStats::default();

        for op in ops {
            match op.op_type {
                OpType::Delete => {
                    tx.execute(
                        "DELETE FROM intelligence_log WHERE event_id = ?1",
                        params![op.event_id],
                    )?;
                    tx.execute(
                        "DELETE FROM calibration_log WHERE event_id = ?1",
                        params![op.event_id],
                    )?;
                    stats.deleted += 1;
                }
                OpType::Insert => {
                    upsert_opportunity(&tx, op)?;
                    stats.inserted += 1;
                    // Calibration rows are best-effort: a failure here must
                    // never abort the main insert.
                    match append_calibration(&mut tx, op, now) {
                        Ok(()) => stats.calibration_rows += 1,
                        Err(e) => {
                            stats.calibration_failures += 1;
                            tracing::warn!(
                                "Calibration append failed for {}: {}",
                                op.event_id,
                                e
                            );
                        }
                    }
                }
            }
        }

        tx.execute(
            "INSERT INTO heartbeat (key, value, updated_at)
             VALUES ('model_last_run', ?1, ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![now],
        )?;

        tx.commit()?;
        Ok(stats)
    }

    // ── Alert dedup ──────────────────────────────────────────────────────────

    /// Has this content hash already produced an alert?
    pub fn alert_seen(&self, bet_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM telegram_alerts WHERE bet_id = ?1",
            params![bet_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Record a sent alert. Idempotent under concurrent retries.
    pub fn record_alert(&self, bet_id: &str, run_id: &str, payload_json: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO telegram_alerts (bet_id, run_id, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(bet_id) DO NOTHING",
            params![bet_id, run_id, payload_json, Utc::now()],
        )?;
        Ok(())
    }

    pub fn alert_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM telegram_alerts", [], |r| r.get(0))?)
    }

    // ── Introspection (monitoring + tests) ───────────────────────────────────

    /// Timestamp of the last completed persist, if any.
    pub fn last_run_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let ts = conn
            .query_row(
                "SELECT updated_at FROM heartbeat WHERE key = 'model_last_run'",
                [],
                |r| r.get(0),
            )
            .ok();
        Ok(ts)
    }

    pub fn pending_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM intelligence_log WHERE outcome = 'PENDING'",
            [],
            |r| r.get(0),
        )?)
    }

    /// Fetch a few intelligence-log fields by event id.
    pub fn intelligence_row(&self, event_id: &str) -> Result<Option<IntelligenceRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT event_id, selection, odds, true_prob, edge, stake, trigger_type,
                        ticket_pct, money_pct, sharp_score, home_rest, away_rest,
                        outcome, metadata
                 FROM intelligence_log WHERE event_id = ?1",
                params![event_id],
                |row| {
                    Ok(IntelligenceRow {
                        event_id: row.get(0)?,
                        selection: row.get(1)?,
                        odds: row.get(2)?,
                        true_prob: row.get(3)?,
                        edge: row.get(4)?,
                        stake: row.get(5)?,
                        trigger_type: row.get(6)?,
                        ticket_pct: row.get(7)?,
                        money_pct: row.get(8)?,
                        sharp_score: row.get(9)?,
                        home_rest: row.get(10)?,
                        away_rest: row.get(11)?,
                        outcome: row.get(12)?,
                        metadata: row.get(13)?,
                    })
                },
            )
            .ok();
        Ok(row)
    }

    pub fn calibration_rows(&self, event_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM calibration_log WHERE event_id = ?1",
            params![event_id],
            |r| r.get(0),
        )?)
    }
}

/// Slice of an intelligence-log row used by monitors and tests.
#[derive(Debug, Clone)]
pub struct IntelligenceRow {
    pub event_id: String,
    pub selection: String,
    pub odds: f64,
    pub true_prob: f64,
    pub edge: f64,
    pub stake: f64,
    pub trigger_type: String,
    pub ticket_pct: Option<f64>,
    pub money_pct: Option<f64>,
    pub sharp_score: i32,
    pub home_rest: Option<i64>,
    pub away_rest: Option<i64>,
    pub outcome: String,
    pub metadata: Option<String>,
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn upsert_opportunity(tx: &rusqlite::Transaction, op: &Opportunity) -> Result<()> {
    let metadata_json = {
        let value = sanitize_json(&serde_json::Value::Object(op.metadata.clone()));
        serde_json::to_string(&value)?
    };
    let ref_at = |i: usize| op.referees.get(i).cloned();
    tx.execute(
        "INSERT INTO intelligence_log (
            event_id, timestamp, kickoff, sport, teams, selection, odds,
            true_prob, edge, stake, trigger_type, ticket_pct, money_pct,
            sharp_score, home_rest, away_rest, ref_1, ref_2, ref_3,
            home_adj_em, away_adj_em, home_adj_o, away_adj_o,
            home_adj_d, away_adj_d, home_tempo, away_tempo,
            outcome, metadata, accepted
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,
                   ?17,?18,?19,?20,?21,?22,?23,?24,?25,?26,?27,'PENDING',?28,1)
         ON CONFLICT(event_id) DO UPDATE SET
            timestamp    = excluded.timestamp,
            kickoff      = excluded.kickoff,
            selection    = excluded.selection,
            odds         = excluded.odds,
            true_prob    = excluded.true_prob,
            edge         = excluded.edge,
            stake        = excluded.stake,
            trigger_type = excluded.trigger_type,
            ticket_pct   = COALESCE(excluded.ticket_pct, ticket_pct),
            money_pct    = COALESCE(excluded.money_pct, money_pct),
            sharp_score  = COALESCE(NULLIF(excluded.sharp_score, 0), sharp_score),
            home_rest    = excluded.home_rest,
            away_rest    = excluded.away_rest,
            ref_1        = excluded.ref_1,
            ref_2        = excluded.ref_2,
            ref_3        = excluded.ref_3,
            home_adj_em  = excluded.home_adj_em,
            away_adj_em  = excluded.away_adj_em,
            home_adj_o   = excluded.home_adj_o,
            away_adj_o   = excluded.away_adj_o,
            home_adj_d   = excluded.home_adj_d,
            away_adj_d   = excluded.away_adj_d,
            home_tempo   = excluded.home_tempo,
            away_tempo   = excluded.away_tempo,
            metadata     = excluded.metadata",
        params![
            op.event_id,
            op.timestamp,
            op.kickoff,
            op.sport,
            op.teams,
            op.selection,
            op.odds,
            op.true_prob,
            op.edge,
            op.stake,
            op.trigger_type,
            op.ticket_pct,
            op.money_pct,
            op.sharp_score,
            op.home_rest,
            op.away_rest,
            ref_at(0),
            ref_at(1),
            ref_at(2),
            op.features.home_adj_em,
            op.features.away_adj_em,
            op.features.home_adj_o,
            op.features.away_adj_o,
            op.features.home_adj_d,
            op.features.away_adj_d,
            op.features.home_tempo,
            op.features.away_tempo,
            metadata_json,
        ],
    )?;
    Ok(())
}

fn append_calibration(
    tx: &mut rusqlite::Transaction,
    op: &Opportunity,
    now: DateTime<Utc>,
) -> Result<()> {
    let sp = tx.savepoint_with_name("calibration")?;
    let result = sp.execute(
        "INSERT INTO calibration_log (event_id, timestamp, predicted_prob, bucket)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            op.event_id,
            now,
            op.true_prob,
            probability_bucket(op.true_prob)
        ],
    );
    match result {
        Ok(_) => {
            sp.commit()?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS).
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS intelligence_log (
    event_id     TEXT PRIMARY KEY,
    timestamp    TEXT NOT NULL,
    kickoff      TEXT NOT NULL,
    sport        TEXT NOT NULL,
    teams        TEXT NOT NULL,
    selection    TEXT NOT NULL,
    odds         REAL NOT NULL,
    true_prob    REAL NOT NULL,
    edge         REAL NOT NULL,
    stake        REAL NOT NULL,
    trigger_type TEXT NOT NULL,
    closing_odds REAL,
    ticket_pct   REAL,
    money_pct    REAL,
    sharp_score  INTEGER NOT NULL DEFAULT 0,
    home_rest    INTEGER,
    away_rest    INTEGER,
    ref_1        TEXT,
    ref_2        TEXT,
    ref_3        TEXT,
    home_adj_em  REAL,
    away_adj_em  REAL,
    home_adj_o   REAL,
    away_adj_o   REAL,
    home_adj_d   REAL,
    away_adj_d   REAL,
    home_tempo   REAL,
    away_tempo   REAL,
    outcome      TEXT NOT NULL DEFAULT 'PENDING',
    metadata     TEXT,
    settled_at   TEXT,
    net_units    REAL,
    accepted     INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS calibration_log (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id       TEXT NOT NULL,
    timestamp      TEXT NOT NULL,
    predicted_prob REAL NOT NULL,
    bucket         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS telegram_alerts (
    bet_id       TEXT PRIMARY KEY,
    run_id       TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS heartbeat (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_intel_outcome ON intelligence_log(outcome);
CREATE INDEX IF NOT EXISTS idx_intel_sport ON intelligence_log(sport);
CREATE INDEX IF NOT EXISTS idx_calibration_event ON calibration_log(event_id);
"#;
