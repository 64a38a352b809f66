use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fab_protocol::{record_uid, DiagEntry};

/// Diagnostic log capacity; the oldest entries are evicted first.
pub const DIAG_LOG_CAPACITY: i64 = 100;

/// Current on-disk schema, tracked via `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

const DB_FILE: &str = "fab-bridge.sqlite";

/// Per-batch accounting for [`Store::upsert_many`]. Items that cannot be
/// keyed fail individually; the rest of the batch still lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub saved: u64,
    pub errors: u64,
}

/// Durable entitlement store backed by a single SQLite file.
///
/// The handle is cheap to create and to clone; the underlying connection
/// is opened on first use. A failed open leaves the handle unopened, so
/// a later call simply retries.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    db_path: PathBuf,
    conn: OnceCell<Mutex<Connection>>,
}

impl Store {
    /// Handle for the database file inside `dir`. Does not touch the disk.
    pub fn new(dir: &Path) -> Self {
        Store {
            inner: Arc::new(StoreInner {
                db_path: dir.join(DB_FILE),
                conn: OnceCell::new(),
            }),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.inner.db_path
    }

    fn conn(&self) -> Result<&Mutex<Connection>> {
        self.inner
            .conn
            .get_or_try_init(|| open_connection(&self.inner.db_path).map(Mutex::new))
    }

    /// Write a batch of raw entitlement records keyed by their `uid`.
    ///
    /// Re-upserting an existing uid replaces the stored payload wholesale
    /// but never touches its original `saved_at` stamp. Records without a
    /// usable uid are counted in `errors` and skipped. An empty batch is
    /// a no-op that opens no transaction.
    pub fn upsert_many(&self, items: &[Value]) -> Result<UpsertOutcome> {
        if items.is_empty() {
            return Ok(UpsertOutcome::default());
        }
        let mut conn = self.conn()?.lock();
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let mut outcome = UpsertOutcome::default();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO entitlements(uid, saved_at, payload) VALUES (?1, ?2, ?3)
                 ON CONFLICT(uid) DO UPDATE SET payload = excluded.payload",
            )?;
            for item in items {
                let Some(uid) = record_uid(item) else {
                    tracing::debug!("skipping entitlement without uid");
                    outcome.errors += 1;
                    continue;
                };
                // Honor a stamp the record already carries; first write wins.
                let saved_at = item
                    .get("savedAt")
                    .and_then(Value::as_str)
                    .unwrap_or(now.as_str());
                let payload = serde_json::to_string(item)
                    .unwrap_or_else(|_| "{}".to_string());
                match stmt.execute(params![uid, saved_at, payload]) {
                    Ok(_) => outcome.saved += 1,
                    Err(err) => {
                        tracing::warn!(uid, %err, "entitlement write failed");
                        outcome.errors += 1;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    /// All stored records in uid order, each with its authoritative
    /// `savedAt` merged in.
    pub fn get_all(&self) -> Result<Vec<Value>> {
        let conn = self.conn()?.lock();
        let mut stmt =
            conn.prepare("SELECT uid, saved_at, payload FROM entitlements ORDER BY uid ASC")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let uid: String = row.get(0)?;
            let saved_at: String = row.get(1)?;
            let payload_s: String = row.get(2)?;
            let mut payload: Value =
                serde_json::from_str(&payload_s).unwrap_or(serde_json::json!({}));
            if let Some(obj) = payload.as_object_mut() {
                obj.insert("savedAt".to_string(), Value::String(saved_at));
                obj.entry("uid").or_insert_with(|| Value::String(uid));
            }
            out.push(payload);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.conn()?.lock();
        let n = conn.query_row("SELECT COUNT(1) FROM entitlements", [], |row| row.get(0))?;
        Ok(n)
    }

    /// Drop every stored record. A uid re-upserted afterwards is a fresh
    /// insert and gets a fresh `saved_at`.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.conn()?.lock();
        conn.execute("DELETE FROM entitlements", [])?;
        Ok(())
    }

    /// Append one diagnostic entry, evicting the oldest past capacity.
    pub fn append_diag(&self, level: &str, message: &str, data: Option<&Value>) -> Result<()> {
        let conn = self.conn()?.lock();
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let data_s = match data {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };
        conn.execute(
            "INSERT INTO diag_log(time, level, message, data) VALUES (?1, ?2, ?3, ?4)",
            params![now, level, message, data_s],
        )?;
        conn.execute(
            "DELETE FROM diag_log WHERE id NOT IN
               (SELECT id FROM diag_log ORDER BY id DESC LIMIT ?1)",
            params![DIAG_LOG_CAPACITY],
        )?;
        Ok(())
    }

    pub fn recent_diag(&self, limit: i64) -> Result<Vec<DiagEntry>> {
        let conn = self.conn()?.lock();
        let mut stmt = conn.prepare(
            "SELECT time, level, message, data FROM diag_log ORDER BY id DESC LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let timestamp: String = row.get(0)?;
            let level: String = row.get(1)?;
            let message: String = row.get(2)?;
            let data_s: Option<String> = row.get(3)?;
            let data = data_s.and_then(|s| serde_json::from_str(&s).ok());
            out.push(DiagEntry {
                timestamp,
                level,
                message,
                data,
            });
        }
        // Oldest first for display
        out.reverse();
        Ok(out)
    }

    pub fn clear_diag(&self) -> Result<()> {
        let conn = self.conn()?.lock();
        conn.execute("DELETE FROM diag_log", [])?;
        Ok(())
    }

    // ---------------- Async wrappers (spawn_blocking) ----------------

    pub async fn upsert_many_async(&self, items: Vec<Value>) -> Result<UpsertOutcome> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.upsert_many(&items))
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn get_all_async(&self) -> Result<Vec<Value>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.get_all())
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn count_async(&self) -> Result<i64> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.count())
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn clear_all_async(&self) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.clear_all())
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn append_diag_async(
        &self,
        level: String,
        message: String,
        data: Option<Value>,
    ) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.append_diag(&level, &message, data.as_ref()))
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn recent_diag_async(&self, limit: i64) -> Result<Vec<DiagEntry>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.recent_diag(limit))
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn clear_diag_async(&self) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.clear_diag())
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    // Pragmas tuned for a single guarded writer with streaming readers
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // Busy timeout (default 5000ms; override with FAB_SQLITE_BUSY_MS)
    let busy_ms: u64 = std::env::var("FAB_SQLITE_BUSY_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);
    conn.busy_timeout(std::time::Duration::from_millis(busy_ms))?;
    migrate(&conn)?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(anyhow!(
            "database schema v{} is newer than supported v{}",
            version,
            SCHEMA_VERSION
        ));
    }
    if version < SCHEMA_VERSION {
        init_schema(conn)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entitlements (
          uid TEXT PRIMARY KEY,
          saved_at TEXT NOT NULL,
          payload TEXT NOT NULL
        );

        -- Reserved for bookkeeping alongside the records (unused at v1).
        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT
        );

        CREATE TABLE IF NOT EXISTS diag_log (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          time TEXT NOT NULL,
          level TEXT NOT NULL,
          message TEXT NOT NULL,
          data TEXT
        );
        "#,
    )?;
    Ok(())
}
