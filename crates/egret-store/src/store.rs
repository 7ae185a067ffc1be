use crate::StoreError;
use egret_types::TxStatus;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS wallets (
  id          TEXT PRIMARY KEY,
  name        TEXT NOT NULL,
  address     TEXT NOT NULL UNIQUE,
  sealed_key  TEXT NOT NULL,
  created_at  INTEGER
);

CREATE TABLE IF NOT EXISTS minting_policies (
  id           TEXT PRIMARY KEY,
  name         TEXT NOT NULL UNIQUE,
  policy_id    TEXT NOT NULL UNIQUE,
  sealed_key   TEXT NOT NULL,
  locking_slot INTEGER,
  created_at   INTEGER
);

CREATE TABLE IF NOT EXISTS transactions (
  seq           INTEGER PRIMARY KEY AUTOINCREMENT,
  id            TEXT NOT NULL UNIQUE,
  wallet_id     TEXT NOT NULL REFERENCES wallets(id),
  metadata      TEXT,
  status        TEXT NOT NULL DEFAULT 'queued',
  tx_hash       TEXT,
  fee           INTEGER,
  size          INTEGER,
  error_message TEXT,
  retry_count   INTEGER NOT NULL DEFAULT 0,
  created_at    INTEGER,
  updated_at    INTEGER,
  confirmed_at  INTEGER
);
CREATE INDEX IF NOT EXISTS idx_transactions_wallet ON transactions(wallet_id);
CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);
CREATE INDEX IF NOT EXISTS idx_transactions_hash ON transactions(tx_hash);

CREATE TABLE IF NOT EXISTS transaction_outputs (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  transaction_seq INTEGER NOT NULL REFERENCES transactions(seq),
  address         TEXT NOT NULL,
  datum           TEXT
);
CREATE INDEX IF NOT EXISTS idx_outputs_tx ON transaction_outputs(transaction_seq);

CREATE TABLE IF NOT EXISTS transaction_output_assets (
  id        INTEGER PRIMARY KEY AUTOINCREMENT,
  output_id INTEGER NOT NULL REFERENCES transaction_outputs(id),
  unit      TEXT NOT NULL,
  quantity  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_output_assets_output ON transaction_output_assets(output_id);

CREATE TABLE IF NOT EXISTS transaction_mints (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  transaction_seq INTEGER NOT NULL REFERENCES transactions(seq),
  policy_id       TEXT NOT NULL,
  asset_name      TEXT NOT NULL,
  quantity        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mints_tx ON transaction_mints(transaction_seq);
";

// ─── Rows ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WalletRow {
    pub id: String,
    pub name: String,
    pub address: String,
    pub sealed_key: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct PolicyRow {
    pub id: String,
    pub name: String,
    pub policy_id: String,
    pub sealed_key: String,
    pub locking_slot: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub seq: i64,
    pub id: String,
    pub wallet_id: String,
    pub metadata: Option<serde_json::Value>,
    pub status: TxStatus,
    pub tx_hash: Option<String>,
    pub fee: Option<i64>,
    pub size: Option<i64>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub confirmed_at: Option<i64>,
}

/// A requested output as persisted: stringly units, decimal quantities.
#[derive(Debug, Clone)]
pub struct OutputRecord {
    pub address: String,
    pub datum: Option<serde_json::Value>,
    pub assets: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct MintRow {
    pub policy_id: String,
    pub asset_name: String,
    pub quantity: i64,
}

/// The complete unit of work the engine loads per job.
#[derive(Debug, Clone)]
pub struct TransactionJob {
    pub row: TransactionRow,
    pub outputs: Vec<OutputRecord>,
    pub mints: Vec<MintRow>,
}

/// Insert shapes used at job creation.
#[derive(Debug, Clone)]
pub struct NewOutput {
    pub address: String,
    pub datum: Option<serde_json::Value>,
    pub assets: Vec<NewOutputAsset>,
}

#[derive(Debug, Clone)]
pub struct NewOutputAsset {
    pub unit: String,
    pub quantity: String,
}

#[derive(Debug, Clone)]
pub struct NewMint {
    pub policy_id: String,
    pub asset_name: String,
    pub quantity: i64,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ─── Store ──────────────────────────────────────────────────────────────────

/// Connection wrapper. Interior mutex so workers for different wallets can
/// share one handle; per-row write ownership is enforced by the work queue.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_DDL)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_DDL)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means a panic mid-statement; propagating the
        // poison would wedge every wallet, so take the data as-is.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Wallets ─────────────────────────────────────────────────────────

    pub fn create_wallet(
        &self,
        name: &str,
        address: &str,
        sealed_key: &str,
    ) -> Result<WalletRow, StoreError> {
        let conn = self.lock();
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM wallets WHERE address = ?1",
                params![address],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Conflict(format!("wallet address {address}")));
        }

        let row = WalletRow {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            address: address.to_string(),
            sealed_key: sealed_key.to_string(),
            created_at: now_millis(),
        };
        conn.execute(
            "INSERT INTO wallets (id, name, address, sealed_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.id, row.name, row.address, row.sealed_key, row.created_at],
        )?;
        log::info!("created wallet {} ({})", row.id, row.name);
        Ok(row)
    }

    pub fn wallet(&self, id: &str) -> Result<Option<WalletRow>, StoreError> {
        let conn = self.lock();
        Ok(conn
            .query_row(
                "SELECT id, name, address, sealed_key, created_at FROM wallets WHERE id = ?1",
                params![id],
                row_to_wallet,
            )
            .optional()?)
    }

    pub fn list_wallets(&self) -> Result<Vec<WalletRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, address, sealed_key, created_at FROM wallets ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_wallet)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ── Minting policies ────────────────────────────────────────────────

    pub fn create_policy(
        &self,
        name: &str,
        policy_id: &str,
        sealed_key: &str,
        locking_slot: Option<i64>,
    ) -> Result<PolicyRow, StoreError> {
        let conn = self.lock();
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM minting_policies WHERE name = ?1",
                params![name],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Conflict(format!("policy name {name}")));
        }

        let row = PolicyRow {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            policy_id: policy_id.to_string(),
            sealed_key: sealed_key.to_string(),
            locking_slot,
            created_at: now_millis(),
        };
        conn.execute(
            "INSERT INTO minting_policies (id, name, policy_id, sealed_key, locking_slot, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id,
                row.name,
                row.policy_id,
                row.sealed_key,
                row.locking_slot,
                row.created_at
            ],
        )?;
        Ok(row)
    }

    pub fn policy_by_policy_id(&self, policy_id: &str) -> Result<Option<PolicyRow>, StoreError> {
        let conn = self.lock();
        Ok(conn
            .query_row(
                "SELECT id, name, policy_id, sealed_key, locking_slot, created_at
                 FROM minting_policies WHERE policy_id = ?1",
                params![policy_id],
                row_to_policy,
            )
            .optional()?)
    }

    pub fn list_policies(&self) -> Result<Vec<PolicyRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, policy_id, sealed_key, locking_slot, created_at
             FROM minting_policies ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_policy)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Create a queued transaction with its outputs and mints in one
    /// database transaction. Child rows anchor on the numeric sequence.
    pub fn create_transaction(
        &self,
        wallet_id: &str,
        metadata: Option<&serde_json::Value>,
        outputs: &[NewOutput],
        mints: &[NewMint],
    ) -> Result<TransactionRow, StoreError> {
        let mut conn = self.lock();

        let wallet_exists: Option<String> = conn
            .query_row(
                "SELECT id FROM wallets WHERE id = ?1",
                params![wallet_id],
                |r| r.get(0),
            )
            .optional()?;
        if wallet_exists.is_none() {
            return Err(StoreError::WalletNotFound(wallet_id.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = now_millis();
        let metadata_text = metadata.map(|m| m.to_string());

        let db_tx = conn.transaction()?;
        db_tx.execute(
            "INSERT INTO transactions (id, wallet_id, metadata, status, retry_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'queued', 0, ?4, ?4)",
            params![id, wallet_id, metadata_text, now],
        )?;
        let seq = db_tx.last_insert_rowid();

        for output in outputs {
            db_tx.execute(
                "INSERT INTO transaction_outputs (transaction_seq, address, datum)
                 VALUES (?1, ?2, ?3)",
                params![seq, output.address, output.datum.as_ref().map(|d| d.to_string())],
            )?;
            let output_id = db_tx.last_insert_rowid();
            for asset in &output.assets {
                db_tx.execute(
                    "INSERT INTO transaction_output_assets (output_id, unit, quantity)
                     VALUES (?1, ?2, ?3)",
                    params![output_id, asset.unit, asset.quantity],
                )?;
            }
        }

        for mint in mints {
            db_tx.execute(
                "INSERT INTO transaction_mints (transaction_seq, policy_id, asset_name, quantity)
                 VALUES (?1, ?2, ?3, ?4)",
                params![seq, mint.policy_id, mint.asset_name, mint.quantity],
            )?;
        }
        db_tx.commit()?;
        log::debug!("created transaction {id} (seq {seq}) for wallet {wallet_id}");

        drop(conn);
        let job = self.transaction(&id)?;
        job.map(|j| j.row)
            .ok_or_else(|| StoreError::TransactionNotFound(id))
    }

    /// Load the complete job: row, outputs with assets, mints.
    pub fn transaction(&self, id: &str) -> Result<Option<TransactionJob>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT seq, id, wallet_id, metadata, status, tx_hash, fee, size,
                        error_message, retry_count, created_at, updated_at, confirmed_at
                 FROM transactions WHERE id = ?1",
                params![id],
                row_to_transaction,
            )
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };
        let row = row?;

        let mut outputs = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT id, address, datum FROM transaction_outputs
                 WHERE transaction_seq = ?1 ORDER BY id",
            )?;
            let out_rows = stmt.query_map(params![row.seq], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                ))
            })?;
            for out in out_rows {
                let (output_id, address, datum_text) = out?;
                let datum = match datum_text {
                    Some(text) => Some(
                        serde_json::from_str(&text)
                            .map_err(|e| StoreError::Malformed(format!("datum: {e}")))?,
                    ),
                    None => None,
                };

                let mut asset_stmt = conn.prepare(
                    "SELECT unit, quantity FROM transaction_output_assets
                     WHERE output_id = ?1 ORDER BY id",
                )?;
                let assets = asset_stmt
                    .query_map(params![output_id], |r| {
                        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                outputs.push(OutputRecord {
                    address,
                    datum,
                    assets,
                });
            }
        }

        let mut mints = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT policy_id, asset_name, quantity FROM transaction_mints
                 WHERE transaction_seq = ?1 ORDER BY id",
            )?;
            let mint_rows = stmt.query_map(params![row.seq], |r| {
                Ok(MintRow {
                    policy_id: r.get(0)?,
                    asset_name: r.get(1)?,
                    quantity: r.get(2)?,
                })
            })?;
            for mint in mint_rows {
                mints.push(mint?);
            }
        }

        Ok(Some(TransactionJob {
            row,
            outputs,
            mints,
        }))
    }

    pub fn transactions_with_status(
        &self,
        status: TxStatus,
    ) -> Result<Vec<TransactionRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT seq, id, wallet_id, metadata, status, tx_hash, fee, size,
                    error_message, retry_count, created_at, updated_at, confirmed_at
             FROM transactions WHERE status = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![status.as_str()], row_to_transaction)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// Record successful submission: status, hash, fee, size; prior error
    /// cleared.
    pub fn mark_submitted(
        &self,
        id: &str,
        tx_hash: &str,
        fee: u64,
        size: usize,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE transactions
             SET status = 'submitted', tx_hash = ?1, fee = ?2, size = ?3,
                 error_message = NULL, updated_at = ?4
             WHERE id = ?5",
            params![tx_hash, fee as i64, size as i64, now_millis(), id],
        )?;
        ensure_updated(updated, id)
    }

    /// Record terminal failure.
    pub fn mark_failed(&self, id: &str, error: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE transactions
             SET status = 'failed', error_message = ?1, updated_at = ?2
             WHERE id = ?3",
            params![error, now_millis(), id],
        )?;
        ensure_updated(updated, id)
    }

    /// Put a retryable job back in the queue: one statement so the
    /// increment-and-requeue is atomic. Returns the new retry count.
    pub fn requeue(&self, id: &str, error: &str) -> Result<i64, StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE transactions
             SET status = 'queued', retry_count = retry_count + 1,
                 error_message = ?1, updated_at = ?2
             WHERE id = ?3",
            params![error, now_millis(), id],
        )?;
        ensure_updated(updated, id)?;
        Ok(conn.query_row(
            "SELECT retry_count FROM transactions WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?)
    }

    /// Confirmation-listener hook: flip `submitted → confirmed` by ledger
    /// hash. Returns whether a row transitioned.
    pub fn mark_confirmed(&self, tx_hash: &str) -> Result<bool, StoreError> {
        let conn = self.lock();
        let now = now_millis();
        let updated = conn.execute(
            "UPDATE transactions
             SET status = 'confirmed', confirmed_at = ?1, updated_at = ?1
             WHERE tx_hash = ?2 AND status = 'submitted'",
            params![now, tx_hash],
        )?;
        Ok(updated == 1)
    }
}

fn ensure_updated(count: usize, id: &str) -> Result<(), StoreError> {
    if count == 0 {
        Err(StoreError::TransactionNotFound(id.to_string()))
    } else {
        Ok(())
    }
}

// ─── Row mappers ────────────────────────────────────────────────────────────

fn row_to_wallet(r: &rusqlite::Row<'_>) -> rusqlite::Result<WalletRow> {
    Ok(WalletRow {
        id: r.get(0)?,
        name: r.get(1)?,
        address: r.get(2)?,
        sealed_key: r.get(3)?,
        created_at: r.get(4)?,
    })
}

fn row_to_policy(r: &rusqlite::Row<'_>) -> rusqlite::Result<PolicyRow> {
    Ok(PolicyRow {
        id: r.get(0)?,
        name: r.get(1)?,
        policy_id: r.get(2)?,
        sealed_key: r.get(3)?,
        locking_slot: r.get(4)?,
        created_at: r.get(5)?,
    })
}

fn row_to_transaction(
    r: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<TransactionRow, StoreError>> {
    let metadata_text: Option<String> = r.get(3)?;
    let status_text: String = r.get(4)?;

    let metadata = match metadata_text {
        Some(text) => match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => return Ok(Err(StoreError::Malformed(format!("metadata: {e}")))),
        },
        None => None,
    };
    let status = match status_text.parse::<TxStatus>() {
        Ok(status) => status,
        Err(_) => return Ok(Err(StoreError::Malformed(format!("status {status_text}")))),
    };

    Ok(Ok(TransactionRow {
        seq: r.get(0)?,
        id: r.get(1)?,
        wallet_id: r.get(2)?,
        metadata,
        status,
        tx_hash: r.get(5)?,
        fee: r.get(6)?,
        size: r.get(7)?,
        error_message: r.get(8)?,
        retry_count: r.get(9)?,
        created_at: r.get(10)?,
        updated_at: r.get(11)?,
        confirmed_at: r.get(12)?,
    }))
}
