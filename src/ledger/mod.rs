//! # Ledger Store
//!
//! Durable, transactional persistence of `UsageRecord` and `Budget` rows.
//! Backed by a single SQLite file opened once in WAL mode; all writers
//! serialize through one `Mutex<Connection>` so the "charge" operation
//! (append usage + update budget) is always one serializable transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageRecord {
    pub id: i64,
    pub project_id: String,
    pub provider: String,
    pub model_id: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Budget {
    pub project_id: String,
    pub limit_usd: f64,
    pub spent_usd: f64,
    pub period_start: DateTime<Utc>,
    pub period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageSummary {
    pub project_id: String,
    pub total_cost_usd: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub request_count: i64,
    pub budget: Option<Budget>,
}

/// Input to [`LedgerStore::record_usage`].
pub struct ChargeInput<'a> {
    pub project_id: &'a str,
    pub provider: &'a str,
    pub model_id: &'a str,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub request_id: &'a str,
}

/// Single-file, write-ahead-logged embedded store shared by every request
/// task. All mutating operations go through the inner mutex so a
/// `recordUsage` charge is one serializable transaction against the budget
/// row: every caller either sees the row before or after a charge, never a
/// half-applied one.
pub struct LedgerStore {
    conn: Mutex<Connection>,
}

impl LedgerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                model_id TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                request_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_usage_project_id ON usage(project_id);
             CREATE INDEX IF NOT EXISTS idx_usage_created_at ON usage(created_at);

             CREATE TABLE IF NOT EXISTS budgets (
                project_id TEXT PRIMARY KEY,
                limit_usd REAL NOT NULL,
                spent_usd REAL NOT NULL,
                period_start TEXT NOT NULL,
                period_end TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests; still exercises the real SQL path.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                model_id TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                request_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
             );
             CREATE INDEX idx_usage_project_id ON usage(project_id);
             CREATE INDEX idx_usage_created_at ON usage(created_at);

             CREATE TABLE budgets (
                project_id TEXT PRIMARY KEY,
                limit_usd REAL NOT NULL,
                spent_usd REAL NOT NULL,
                period_start TEXT NOT NULL,
                period_end TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append a UsageRecord and increment `budgets.spent_usd` for the
    /// project in a single transaction. If no budget row exists for the
    /// project, only the usage row is inserted (no budget gate configured).
    pub fn record_usage(&self, charge: ChargeInput<'_>, now: DateTime<Utc>) -> Result<UsageRecord, LedgerError> {
        let mut conn = self.conn.lock().expect("ledger connection mutex poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO usage (project_id, provider, model_id, input_tokens, output_tokens, cost_usd, request_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                charge.project_id,
                charge.provider,
                charge.model_id,
                charge.input_tokens,
                charge.output_tokens,
                charge.cost_usd,
                charge.request_id,
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE budgets SET spent_usd = spent_usd + ?1, updated_at = ?2 WHERE project_id = ?3",
            params![charge.cost_usd, now.to_rfc3339(), charge.project_id],
        )?;

        tx.commit()?;

        Ok(UsageRecord {
            id,
            project_id: charge.project_id.to_string(),
            provider: charge.provider.to_string(),
            model_id: charge.model_id.to_string(),
            input_tokens: charge.input_tokens,
            output_tokens: charge.output_tokens,
            cost_usd: charge.cost_usd,
            request_id: charge.request_id.to_string(),
            created_at: now,
        })
    }

    /// Upsert a budget row. Preserves `spent_usd` if the row already existed.
    pub fn set_budget(
        &self,
        project_id: &str,
        limit_usd: f64,
        period_days: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Budget, LedgerError> {
        let conn = self.conn.lock().expect("ledger connection mutex poisoned");
        let period_end = period_days.map(|days| now + chrono::Duration::days(days));

        let existing_spent: Option<f64> = conn
            .query_row(
                "SELECT spent_usd FROM budgets WHERE project_id = ?1",
                params![project_id],
                |row| row.get(0),
            )
            .optional()?;

        let spent_usd = existing_spent.unwrap_or(0.0);

        conn.execute(
            "INSERT INTO budgets (project_id, limit_usd, spent_usd, period_start, period_end, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(project_id) DO UPDATE SET
                limit_usd = excluded.limit_usd,
                period_end = excluded.period_end,
                updated_at = excluded.updated_at",
            params![
                project_id,
                limit_usd,
                spent_usd,
                now.to_rfc3339(),
                period_end.map(|d| d.to_rfc3339()),
                now.to_rfc3339(),
            ],
        )?;

        self.get_budget_locked(&conn, project_id)?
            .ok_or_else(|| LedgerError::Storage(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_budget(&self, project_id: &str) -> Result<Option<Budget>, LedgerError> {
        let conn = self.conn.lock().expect("ledger connection mutex poisoned");
        self.get_budget_locked(&conn, project_id)
    }

    fn get_budget_locked(&self, conn: &Connection, project_id: &str) -> Result<Option<Budget>, LedgerError> {
        conn.query_row(
            "SELECT project_id, limit_usd, spent_usd, period_start, period_end, created_at, updated_at
             FROM budgets WHERE project_id = ?1",
            params![project_id],
            |row| {
                Ok(Budget {
                    project_id: row.get(0)?,
                    limit_usd: row.get(1)?,
                    spent_usd: row.get(2)?,
                    period_start: parse_rfc3339(row.get::<_, String>(3)?),
                    period_end: row
                        .get::<_, Option<String>>(4)?
                        .map(parse_rfc3339),
                    created_at: parse_rfc3339(row.get::<_, String>(5)?),
                    updated_at: parse_rfc3339(row.get::<_, String>(6)?),
                })
            },
        )
        .optional()
        .map_err(LedgerError::from)
    }

    /// Sets `spent_usd = 0` and restarts `period_start = now`. Idempotent:
    /// applying twice in a row is equivalent to applying once.
    pub fn reset_budget_spent(&self, project_id: &str, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let conn = self.conn.lock().expect("ledger connection mutex poisoned");
        conn.execute(
            "UPDATE budgets SET spent_usd = 0.0, period_start = ?1, updated_at = ?1 WHERE project_id = ?2",
            params![now.to_rfc3339(), project_id],
        )?;
        Ok(())
    }

    pub fn delete_budget(&self, project_id: &str) -> Result<bool, LedgerError> {
        let conn = self.conn.lock().expect("ledger connection mutex poisoned");
        let affected = conn.execute("DELETE FROM budgets WHERE project_id = ?1", params![project_id])?;
        Ok(affected > 0)
    }

    pub fn get_usage_summary(&self, project_id: &str) -> Result<UsageSummary, LedgerError> {
        let conn = self.conn.lock().expect("ledger connection mutex poisoned");
        let (total_cost_usd, total_input_tokens, total_output_tokens, request_count): (
            f64,
            i64,
            i64,
            i64,
        ) = conn.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0.0), COALESCE(SUM(input_tokens), 0),
                    COALESCE(SUM(output_tokens), 0), COUNT(*)
             FROM usage WHERE project_id = ?1",
            params![project_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let budget = self.get_budget_locked(&conn, project_id)?;

        Ok(UsageSummary {
            project_id: project_id.to_string(),
            total_cost_usd,
            total_input_tokens,
            total_output_tokens,
            request_count,
            budget,
        })
    }

    pub fn get_recent_usage(&self, project_id: &str, limit: u32) -> Result<Vec<UsageRecord>, LedgerError> {
        let conn = self.conn.lock().expect("ledger connection mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, provider, model_id, input_tokens, output_tokens, cost_usd, request_id, created_at
             FROM usage WHERE project_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![project_id, limit], |row| {
            Ok(UsageRecord {
                id: row.get(0)?,
                project_id: row.get(1)?,
                provider: row.get(2)?,
                model_id: row.get(3)?,
                input_tokens: row.get(4)?,
                output_tokens: row.get(5)?,
                cost_usd: row.get(6)?,
                request_id: row.get(7)?,
                created_at: parse_rfc3339(row.get::<_, String>(8)?),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(LedgerError::from)
    }
}

fn parse_rfc3339(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub type SharedLedger = Arc<LedgerStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn record_usage_without_budget_just_inserts() {
        let store = LedgerStore::open_in_memory().unwrap();
        let record = store
            .record_usage(
                ChargeInput {
                    project_id: "p3",
                    provider: "openai",
                    model_id: "gpt-4o-mini",
                    input_tokens: 100,
                    output_tokens: 50,
                    cost_usd: 0.000045,
                    request_id: "req-1",
                },
                now(),
            )
            .unwrap();
        assert_eq!(record.cost_usd, 0.000045);
        assert!(store.get_budget("p3").unwrap().is_none());
    }

    #[test]
    fn set_budget_then_get_preserves_spent() {
        let store = LedgerStore::open_in_memory().unwrap();
        store.set_budget("p1", 1.00, None, now()).unwrap();
        store
            .record_usage(
                ChargeInput {
                    project_id: "p1",
                    provider: "openai",
                    model_id: "gpt-4o-mini",
                    input_tokens: 100,
                    output_tokens: 50,
                    cost_usd: 0.000045,
                    request_id: "req-1",
                },
                now(),
            )
            .unwrap();

        // Re-setting the limit keeps the accumulated spend.
        let budget = store.set_budget("p1", 2.00, None, now()).unwrap();
        assert_eq!(budget.limit_usd, 2.00);
        assert_eq!(budget.spent_usd, 0.000045);
    }

    #[test]
    fn reset_budget_spent_is_idempotent() {
        let store = LedgerStore::open_in_memory().unwrap();
        store.set_budget("p4", 10.0, None, now()).unwrap();
        store
            .record_usage(
                ChargeInput {
                    project_id: "p4",
                    provider: "openai",
                    model_id: "gpt-4o",
                    input_tokens: 1000,
                    output_tokens: 1000,
                    cost_usd: 3.0,
                    request_id: "req-1",
                },
                now(),
            )
            .unwrap();

        store.reset_budget_spent("p4", now()).unwrap();
        let after_first = store.get_budget("p4").unwrap().unwrap().spent_usd;
        store.reset_budget_spent("p4", now()).unwrap();
        let after_second = store.get_budget("p4").unwrap().unwrap().spent_usd;
        assert_eq!(after_first, 0.0);
        assert_eq!(after_second, 0.0);

        // Historical totals survive the reset.
        let summary = store.get_usage_summary("p4").unwrap();
        assert_eq!(summary.total_cost_usd, 3.0);
    }

    #[test]
    fn delete_budget_removes_row_but_keeps_history() {
        let store = LedgerStore::open_in_memory().unwrap();
        store.set_budget("p5", 5.0, None, now()).unwrap();
        assert!(store.delete_budget("p5").unwrap());
        assert!(store.get_budget("p5").unwrap().is_none());
        assert!(!store.delete_budget("p5").unwrap());
    }

    #[test]
    fn recent_usage_is_newest_first() {
        let store = LedgerStore::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .record_usage(
                    ChargeInput {
                        project_id: "p6",
                        provider: "openai",
                        model_id: "gpt-4o",
                        input_tokens: 10,
                        output_tokens: 10,
                        cost_usd: 0.01,
                        request_id: &format!("req-{i}"),
                    },
                    now() + chrono::Duration::seconds(i),
                )
                .unwrap();
        }
        let recent = store.get_recent_usage("p6", 10).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].request_id, "req-2");
    }

    #[test]
    fn duplicate_request_id_is_rejected() {
        let store = LedgerStore::open_in_memory().unwrap();
        fn charge(id: &str) -> ChargeInput<'_> {
            ChargeInput {
                project_id: "p7",
                provider: "openai",
                model_id: "gpt-4o",
                input_tokens: 1,
                output_tokens: 1,
                cost_usd: 0.001,
                request_id: id,
            }
        }
        store.record_usage(charge("dup"), now()).unwrap();
        assert!(store.record_usage(charge("dup"), now()).is_err());
    }
}
