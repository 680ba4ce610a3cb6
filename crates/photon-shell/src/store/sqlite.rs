//! SQLite-backed store.

use super::{PrefScope, ShellStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use photon_core::models::{AppDefinition, LinkedAccount, PreferenceValue, SlDevice};
use photon_core::{PhotonError, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

fn db_error(context: &'static str) -> impl FnOnce(rusqlite::Error) -> PhotonError {
    move |e| PhotonError::store(format!("{}: {}", context, e))
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<SlDevice> {
    let last_seen: Option<String> = row.get(5)?;
    Ok(SlDevice {
        id: row.get(0)?,
        name: row.get(1)?,
        object_key: row.get(2)?,
        is_online: row.get(3)?,
        callback_url: row.get(4)?,
        last_seen: last_seen.as_deref().and_then(parse_time),
    })
}

/// Store backed by a single SQLite database.
///
/// Thread-safe via an internal mutex on the connection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PhotonError::Io {
                message: format!("Failed to create database directory {}: {}", parent.display(), e),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(db_error("Failed to open database"))?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_error("Failed to set pragmas"))?;

        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_error("Failed to open database"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PhotonError::store(format!("Failed to lock database: {}", e)))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS installed_apps (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                bundle_id TEXT NOT NULL,
                definition TEXT NOT NULL,
                installed_at TEXT NOT NULL,
                UNIQUE (user_id, bundle_id)
            );

            CREATE TABLE IF NOT EXISTS preferences (
                user_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, scope, key)
            );

            CREATE TABLE IF NOT EXISTS linked_accounts (
                user_id TEXT NOT NULL,
                avatar_uuid TEXT NOT NULL,
                avatar_name TEXT NOT NULL,
                linked_at TEXT NOT NULL,
                PRIMARY KEY (user_id, avatar_uuid)
            );

            CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                object_key TEXT NOT NULL,
                is_online INTEGER NOT NULL,
                callback_url TEXT,
                last_seen TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_devices_user ON devices(user_id);
            "#,
        )
        .map_err(db_error("Failed to initialize schema"))?;
        debug!("Shell store schema ready");
        Ok(())
    }
}

#[async_trait]
impl ShellStore for SqliteStore {
    async fn installed_apps(&self, user_id: &str) -> Result<Vec<AppDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT definition FROM installed_apps WHERE user_id = ?1 ORDER BY seq")
            .map_err(db_error("Failed to query installed apps"))?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .map_err(db_error("Failed to query installed apps"))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(db_error("Failed to read installed apps"))?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(PhotonError::from))
            .collect()
    }

    async fn install_app(&self, user_id: &str, app: &AppDefinition) -> Result<bool> {
        let definition = serde_json::to_string(app)?;
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO installed_apps (user_id, bundle_id, definition, installed_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![user_id, app.bundle_id, definition, Utc::now().to_rfc3339()],
            )
            .map_err(db_error("Failed to install app"))?;
        Ok(inserted > 0)
    }

    async fn uninstall_app(&self, user_id: &str, bundle_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM installed_apps WHERE user_id = ?1 AND bundle_id = ?2",
                params![user_id, bundle_id],
            )
            .map_err(db_error("Failed to uninstall app"))?;
        Ok(removed > 0)
    }

    async fn get_preference(
        &self,
        user_id: &str,
        scope: &PrefScope,
        key: &str,
    ) -> Result<Option<PreferenceValue>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM preferences WHERE user_id = ?1 AND scope = ?2 AND key = ?3",
                params![user_id, scope.as_key(), key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error("Failed to read preference"))?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_preference(
        &self,
        user_id: &str,
        scope: &PrefScope,
        key: &str,
        value: &PreferenceValue,
    ) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO preferences (user_id, scope, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, scope, key) DO UPDATE SET
                value = ?4,
                updated_at = ?5
            "#,
            params![user_id, scope.as_key(), key, json, Utc::now().to_rfc3339()],
        )
        .map_err(db_error("Failed to write preference"))?;
        Ok(())
    }

    async fn delete_preference(&self, user_id: &str, scope: &PrefScope, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM preferences WHERE user_id = ?1 AND scope = ?2 AND key = ?3",
                params![user_id, scope.as_key(), key],
            )
            .map_err(db_error("Failed to delete preference"))?;
        Ok(removed > 0)
    }

    async fn linked_accounts(&self, user_id: &str) -> Result<Vec<LinkedAccount>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT avatar_uuid, avatar_name, linked_at
                FROM linked_accounts
                WHERE user_id = ?1
                ORDER BY linked_at
                "#,
            )
            .map_err(db_error("Failed to query linked accounts"))?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                let linked_at: String = row.get(2)?;
                Ok(LinkedAccount {
                    avatar_uuid: row.get(0)?,
                    avatar_name: row.get(1)?,
                    linked_at: parse_time(&linked_at).unwrap_or_default(),
                })
            })
            .map_err(db_error("Failed to query linked accounts"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_error("Failed to read linked accounts"))?;
        Ok(rows)
    }

    async fn link_account(&self, user_id: &str, account: &LinkedAccount) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO linked_accounts (user_id, avatar_uuid, avatar_name, linked_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                user_id,
                account.avatar_uuid,
                account.avatar_name,
                account.linked_at.to_rfc3339()
            ],
        )
        .map_err(db_error("Failed to link account"))?;
        Ok(())
    }

    async fn unlink_account(&self, user_id: &str, avatar_uuid: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM linked_accounts WHERE user_id = ?1 AND avatar_uuid = ?2",
                params![user_id, avatar_uuid],
            )
            .map_err(db_error("Failed to unlink account"))?;
        Ok(removed > 0)
    }

    async fn registered_devices(&self, user_id: &str) -> Result<Vec<SlDevice>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, name, object_key, is_online, callback_url, last_seen
                FROM devices
                WHERE user_id = ?1
                ORDER BY name
                "#,
            )
            .map_err(db_error("Failed to query devices"))?;
        let rows = stmt
            .query_map(params![user_id], device_from_row)
            .map_err(db_error("Failed to query devices"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_error("Failed to read devices"))?;
        Ok(rows)
    }

    async fn register_device(&self, user_id: &str, device: &SlDevice) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO devices
                (id, user_id, name, object_key, is_online, callback_url, last_seen)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                device.id,
                user_id,
                device.name,
                device.object_key,
                device.is_online,
                device.callback_url,
                device.last_seen.map(|t| t.to_rfc3339())
            ],
        )
        .map_err(db_error("Failed to register device"))?;
        Ok(())
    }

    async fn device(&self, user_id: &str, device_id: &str) -> Result<Option<SlDevice>> {
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT id, name, object_key, is_online, callback_url, last_seen
            FROM devices
            WHERE user_id = ?1 AND id = ?2
            "#,
            params![user_id, device_id],
            device_from_row,
        )
        .optional()
        .map_err(db_error("Failed to read device"))
    }

    async fn device_owner(&self, device_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT user_id FROM devices WHERE id = ?1",
            params![device_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error("Failed to read device owner"))
    }
}
