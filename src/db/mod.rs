use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

use crate::storage::KeyValueStore;

mod migrations;

use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct Worker {
    sender: mpsc::Sender<DbCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = handle {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to stop key-value store thread: {err}");
            }
            if let Err(err) = handle.join() {
                error!("Failed to join key-value store thread: {err:?}");
            }
        }
    }
}

/// Device-local key-value store on SQLite.
///
/// The connection lives on a dedicated thread; every `KeyValueStore` call is
/// shipped there as a closure and the reply comes back on a oneshot.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let handle = thread::Builder::new()
            .name("projectmap-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&thread_path) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                while let Ok(DbCommand::Execute(task)) = command_rx.recv() {
                    task(&mut conn);
                }

                info!("Key-value store thread shutting down");
            })
            .context("failed to spawn key-value store thread")?;

        ready_rx
            .recv()
            .context("key-value store thread exited before it was ready")??;

        info!("Key-value store opened at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                sender: command_tx,
                handle: Mutex::new(Some(handle)),
            }),
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                error!("Key-value caller dropped before the reply");
            }
        }));

        self.worker
            .sender
            .send(command)
            .map_err(|err| anyhow!("key-value store thread is gone: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("key-value store thread terminated unexpectedly"))?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to read key '{key}'"))
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write key '{key}'"))?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
                .with_context(|| format!("failed to delete key '{key}'"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_overwrite_remove() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("store.sqlite3")).unwrap();

        assert_eq!(db.get("session").await.unwrap(), None);

        db.set("session", "first").await.unwrap();
        db.set("session", "second").await.unwrap();
        assert_eq!(db.get("session").await.unwrap().as_deref(), Some("second"));

        db.remove("session").await.unwrap();
        db.remove("session").await.unwrap();
        assert_eq!(db.get("session").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            db.set("k", "v").await.unwrap();
        }

        let db = Database::new(path).unwrap();
        assert_eq!(db.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn unopenable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(Database::new(dir.path().to_path_buf()).is_err());
    }
}
