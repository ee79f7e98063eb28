//! SQLite ledger store.
//!
//! Persists all six tables in a single file. Uses `sqlx` with WAL mode;
//! idempotency gates map to `INSERT OR IGNORE` / conditional `UPDATE`
//! statements, so concurrent writers get the same exactly-once semantics
//! as the in-memory backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use claimsync_core::error::LedgerError;
use claimsync_core::records::{
    ClaimRecord, ClaimStatus, CooldownResetRecord, ReferralRewardRecord, SyncCursor, UserAccount,
    WithdrawalRequest, WithdrawalStatus,
};
use claimsync_core::store::LedgerStore;

/// SQLite-backed `LedgerStore`.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn db_err(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_ts)
}

fn status_str(s: WithdrawalStatus) -> &'static str {
    match s {
        WithdrawalStatus::Pending => "pending",
        WithdrawalStatus::Completed => "completed",
        WithdrawalStatus::Rejected => "rejected",
    }
}

fn parse_status(s: &str) -> WithdrawalStatus {
    match s {
        "completed" => WithdrawalStatus::Completed,
        "rejected" => WithdrawalStatus::Rejected,
        _ => WithdrawalStatus::Pending,
    }
}

impl SqliteStore {
    /// Open (or create) a database at `path` and provision the schema.
    /// Provisioning failure is fatal to startup by design.
    pub async fn open(path: &str) -> Result<Self, LedgerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(db_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database (tests / ephemeral runs).
    pub async fn in_memory() -> Result<Self, LedgerError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), LedgerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        for ddl in [
            "CREATE TABLE IF NOT EXISTS sync_cursors (
                stream_id  TEXT PRIMARY KEY,
                last_block INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS claims (
                tx_hash        TEXT PRIMARY KEY,
                address        TEXT NOT NULL,
                referrer       TEXT,
                amount_wei     TEXT NOT NULL,
                block_number   INTEGER NOT NULL,
                block_time     TEXT,
                status         TEXT NOT NULL,
                energy_awarded INTEGER NOT NULL DEFAULT 0
            );",
            "CREATE INDEX IF NOT EXISTS idx_claims_address ON claims (address);",
            "CREATE TABLE IF NOT EXISTS referral_rewards (
                tx_hash      TEXT PRIMARY KEY,
                referrer     TEXT NOT NULL,
                amount_wei   TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                block_time   TEXT
            );",
            "CREATE TABLE IF NOT EXISTS cooldown_resets (
                tx_hash      TEXT PRIMARY KEY,
                referrer     TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                block_time   TEXT
            );",
            "CREATE TABLE IF NOT EXISTS users (
                address         TEXT PRIMARY KEY,
                referrer        TEXT,
                invite_count    INTEGER NOT NULL DEFAULT 0,
                energy_total    REAL NOT NULL DEFAULT 0,
                energy_locked   REAL NOT NULL DEFAULT 0,
                credit_total    REAL NOT NULL DEFAULT 0,
                credit_locked   REAL NOT NULL DEFAULT 0,
                last_settlement TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS withdrawals (
                id                   TEXT PRIMARY KEY,
                address              TEXT NOT NULL,
                amount               REAL NOT NULL,
                status               TEXT NOT NULL,
                energy_locked_amount REAL NOT NULL,
                payout_tx_hash       TEXT UNIQUE,
                created_at           TEXT NOT NULL,
                updated_at           TEXT NOT NULL
            );",
            "CREATE INDEX IF NOT EXISTS idx_withdrawals_address ON withdrawals (address);",
        ] {
            sqlx::query(ddl).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    fn row_to_claim(row: &sqlx::sqlite::SqliteRow) -> ClaimRecord {
        ClaimRecord {
            tx_hash: row.get("tx_hash"),
            address: row.get("address"),
            referrer: row.get("referrer"),
            amount_wei: row.get("amount_wei"),
            block_number: row.get::<i64, _>("block_number") as u64,
            block_time: parse_opt_ts(row.get("block_time")),
            status: ClaimStatus::Confirmed,
            energy_awarded: row.get::<i64, _>("energy_awarded") != 0,
        }
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> UserAccount {
        UserAccount {
            address: row.get("address"),
            referrer: row.get("referrer"),
            invite_count: row.get("invite_count"),
            energy_total: row.get("energy_total"),
            energy_locked: row.get("energy_locked"),
            credit_total: row.get("credit_total"),
            credit_locked: row.get("credit_locked"),
            last_settlement: parse_ts(&row.get::<String, _>("last_settlement")),
            created_at: parse_ts(&row.get::<String, _>("created_at")),
            updated_at: parse_ts(&row.get::<String, _>("updated_at")),
        }
    }

    fn row_to_withdrawal(row: &sqlx::sqlite::SqliteRow) -> WithdrawalRequest {
        WithdrawalRequest {
            id: row.get("id"),
            address: row.get("address"),
            amount: row.get("amount"),
            status: parse_status(&row.get::<String, _>("status")),
            energy_locked_amount: row.get("energy_locked_amount"),
            payout_tx_hash: row.get("payout_tx_hash"),
            created_at: parse_ts(&row.get::<String, _>("created_at")),
            updated_at: parse_ts(&row.get::<String, _>("updated_at")),
        }
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn load_cursor(&self, stream_id: &str) -> Result<Option<SyncCursor>, LedgerError> {
        let row = sqlx::query("SELECT stream_id, last_block, updated_at FROM sync_cursors WHERE stream_id = ?")
            .bind(stream_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| SyncCursor {
            stream_id: r.get("stream_id"),
            last_block: r.get::<i64, _>("last_block") as u64,
            updated_at: parse_ts(&r.get::<String, _>("updated_at")),
        }))
    }

    async fn save_cursor(&self, stream_id: &str, last_block: u64) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO sync_cursors (stream_id, last_block, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(stream_id) DO UPDATE SET
                 last_block = MAX(sync_cursors.last_block, excluded.last_block),
                 updated_at = excluded.updated_at",
        )
        .bind(stream_id)
        .bind(last_block as i64)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_claim(&self, tx_hash: &str) -> Result<Option<ClaimRecord>, LedgerError> {
        let row = sqlx::query("SELECT * FROM claims WHERE tx_hash = ?")
            .bind(tx_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(Self::row_to_claim))
    }

    async fn upsert_claim(&self, record: &ClaimRecord) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO claims
                 (tx_hash, address, referrer, amount_wei, block_number, block_time, status, energy_awarded)
             VALUES (?, ?, ?, ?, ?, ?, 'confirmed', ?)",
        )
        .bind(&record.tx_hash)
        .bind(&record.address)
        .bind(&record.referrer)
        .bind(&record.amount_wei)
        .bind(record.block_number as i64)
        .bind(record.block_time.map(ts))
        .bind(record.energy_awarded as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        let inserted = result.rows_affected() == 1;
        debug!(tx_hash = %record.tx_hash, inserted, "claim upsert");
        Ok(inserted)
    }

    async fn try_mark_energy_awarded(&self, tx_hash: &str) -> Result<bool, LedgerError> {
        let result =
            sqlx::query("UPDATE claims SET energy_awarded = 1 WHERE tx_hash = ? AND energy_awarded = 0")
                .bind(tx_hash)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_claims(&self, address: &str) -> Result<u64, LedgerError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM claims WHERE address = ? COLLATE NOCASE")
            .bind(address)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn get_user(&self, address: &str) -> Result<Option<UserAccount>, LedgerError> {
        let row = sqlx::query("SELECT * FROM users WHERE address = ?")
            .bind(address.to_ascii_lowercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(Self::row_to_user))
    }

    async fn ensure_user(
        &self,
        address: &str,
        referrer: Option<&str>,
    ) -> Result<UserAccount, LedgerError> {
        let addr = address.to_ascii_lowercase();
        let referrer = referrer.map(str::to_ascii_lowercase);
        let now = ts(Utc::now());
        // COALESCE keeps a previously-set referrer
        sqlx::query(
            "INSERT INTO users (address, referrer, last_settlement, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(address) DO UPDATE SET
                 referrer   = COALESCE(users.referrer, excluded.referrer),
                 updated_at = excluded.updated_at",
        )
        .bind(&addr)
        .bind(&referrer)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_user(&addr)
            .await?
            .ok_or_else(|| LedgerError::Storage(format!("user {addr} vanished after upsert")))
    }

    async fn update_user(&self, account: &UserAccount) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE users SET
                 referrer = ?, invite_count = ?, energy_total = ?, energy_locked = ?,
                 credit_total = ?, credit_locked = ?, last_settlement = ?, updated_at = ?
             WHERE address = ?",
        )
        .bind(&account.referrer)
        .bind(account.invite_count)
        .bind(account.energy_total)
        .bind(account.energy_locked)
        .bind(account.credit_total)
        .bind(account.credit_locked)
        .bind(ts(account.last_settlement))
        .bind(ts(Utc::now()))
        .bind(account.address.to_ascii_lowercase())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn add_energy(&self, address: &str, delta: f64) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE users SET energy_total = energy_total + ?, updated_at = ? WHERE address = ?",
        )
        .bind(delta)
        .bind(ts(Utc::now()))
        .bind(address.to_ascii_lowercase())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::UserNotFound {
                address: address.to_string(),
            });
        }
        Ok(())
    }

    async fn add_invite(
        &self,
        address: &str,
        invites: i64,
        energy_bonus: f64,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE users SET
                 invite_count = invite_count + ?,
                 energy_total = energy_total + ?,
                 updated_at = ?
             WHERE address = ?",
        )
        .bind(invites)
        .bind(energy_bonus)
        .bind(ts(Utc::now()))
        .bind(address.to_ascii_lowercase())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::UserNotFound {
                address: address.to_string(),
            });
        }
        Ok(())
    }

    async fn upsert_reward(&self, record: &ReferralRewardRecord) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO referral_rewards
                 (tx_hash, referrer, amount_wei, block_number, block_time)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.tx_hash)
        .bind(&record.referrer)
        .bind(&record.amount_wei)
        .bind(record.block_number as i64)
        .bind(record.block_time.map(ts))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_reset(&self, record: &CooldownResetRecord) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO cooldown_resets (tx_hash, referrer, block_number, block_time)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&record.tx_hash)
        .bind(&record.referrer)
        .bind(record.block_number as i64)
        .bind(record.block_time.map(ts))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO withdrawals
                 (id, address, amount, status, energy_locked_amount, payout_tx_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id)
        .bind(request.address.to_ascii_lowercase())
        .bind(request.amount)
        .bind(status_str(request.status))
        .bind(request.energy_locked_amount)
        .bind(&request.payout_tx_hash)
        .bind(ts(request.created_at))
        .bind(ts(request.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_withdrawal(&self, id: &str) -> Result<Option<WithdrawalRequest>, LedgerError> {
        let row = sqlx::query("SELECT * FROM withdrawals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(Self::row_to_withdrawal))
    }

    async fn update_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE withdrawals SET
                 status = ?, energy_locked_amount = ?, payout_tx_hash = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status_str(request.status))
        .bind(request.energy_locked_amount)
        .bind(&request.payout_tx_hash)
        .bind(ts(Utc::now()))
        .bind(&request.id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_recent_pending(
        &self,
        address: &str,
        window: Duration,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        let row = sqlx::query(
            "SELECT * FROM withdrawals
             WHERE address = ? AND status = 'pending' AND created_at >= ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(address.to_ascii_lowercase())
        .bind(ts(cutoff))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(Self::row_to_withdrawal))
    }

    async fn sum_withdrawn(&self, address: &str) -> Result<f64, LedgerError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0.0) AS total FROM withdrawals
             WHERE address = ? AND status IN ('pending', 'completed')",
        )
        .bind(address.to_ascii_lowercase())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.get("total"))
    }

    async fn find_by_payout_tx(
        &self,
        tx_hash: &str,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        let row = sqlx::query("SELECT * FROM withdrawals WHERE payout_tx_hash = ?")
            .bind(tx_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(Self::row_to_withdrawal))
    }
}
