//! Optional replica of the store in a document database.
//!
//! Writes are handed to a background thread and never awaited by the caller;
//! failures are logged there and dropped. The local snapshot stays the source
//! of truth whether or not a mirror is connected.

use crate::model::{Collection, MirrorConfig};
use anyhow::{anyhow, Context};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum MirrorOp {
    Set {
        collection: Collection,
        id: String,
        doc: Value,
    },
    Delete {
        collection: Collection,
        id: String,
    },
}

impl MirrorOp {
    pub fn set<T: Serialize>(collection: Collection, id: &str, doc: &T) -> anyhow::Result<Self> {
        Ok(MirrorOp::Set {
            collection,
            id: id.to_string(),
            doc: serde_json::to_value(doc).context("failed to encode mirror document")?,
        })
    }

    pub fn delete(collection: Collection, id: &str) -> Self {
        MirrorOp::Delete {
            collection,
            id: id.to_string(),
        }
    }
}

/// A change notification for one collection, as delivered by the remote side.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    pub collection: Collection,
    #[serde(default)]
    pub docs: Vec<Value>,
    #[serde(default)]
    pub size: usize,
}

pub trait DocumentStore: Send {
    /// Applies every op or none of them.
    fn apply(&mut self, batch: &[MirrorOp]) -> anyhow::Result<()>;
    fn fetch(&mut self, collection: Collection) -> anyhow::Result<Vec<Value>>;
}

pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open mirror {}", path.to_string_lossy()))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents(
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY(collection, doc_id)
            )",
            [],
        )?;
        Ok(Self { conn })
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn apply(&mut self, batch: &[MirrorOp]) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        for op in batch {
            match op {
                MirrorOp::Set {
                    collection,
                    id,
                    doc,
                } => {
                    tx.execute(
                        "INSERT INTO documents(collection, doc_id, body) VALUES(?, ?, ?)
                         ON CONFLICT(collection, doc_id) DO UPDATE SET body = excluded.body",
                        (collection.key(), id, doc.to_string()),
                    )?;
                }
                MirrorOp::Delete { collection, id } => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ? AND doc_id = ?",
                        (collection.key(), id),
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn fetch(&mut self, collection: Collection) -> anyhow::Result<Vec<Value>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM documents WHERE collection = ? ORDER BY rowid")?;
        let bodies = stmt
            .query_map([collection.key()], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).context("corrupt mirror document"))
            .collect()
    }
}

enum Command {
    Apply(Vec<MirrorOp>),
    Fetch(Collection, Sender<anyhow::Result<Vec<Value>>>),
    Flush(Sender<()>),
}

/// Handle to the writer thread that owns a `DocumentStore`.
pub struct Mirror {
    tx: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl Mirror {
    pub fn spawn(store: Box<dyn DocumentStore>) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("mirror-writer".into())
            .spawn(move || run_worker(store, rx))
            .context("failed to start mirror writer")?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn connect(config: &MirrorConfig) -> anyhow::Result<Self> {
        if !config.is_configured() {
            return Err(anyhow!("mirror database path is empty"));
        }
        let store = SqliteDocumentStore::open(Path::new(config.database_path.trim()))?;
        Self::spawn(Box::new(store))
    }

    /// Queues a batch; returns immediately.
    pub fn submit(&self, batch: Vec<MirrorOp>) {
        if batch.is_empty() {
            return;
        }
        if let Err(e) = self.send(Command::Apply(batch)) {
            tracing::error!(error = %e, "mirror write dropped");
        }
    }

    pub fn fetch(&self, collection: Collection) -> anyhow::Result<Vec<Value>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(Command::Fetch(collection, reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("mirror writer stopped"))?
    }

    /// Blocks until every batch submitted before this call has been applied
    /// (or has failed).
    pub fn flush(&self) {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self.send(Command::Flush(reply_tx)).is_ok() {
            let _ = reply_rx.recv();
        }
    }

    fn send(&self, cmd: Command) -> anyhow::Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| anyhow!("mirror is closed"))?;
        tx.send(cmd).map_err(|_| anyhow!("mirror writer stopped"))
    }
}

impl Drop for Mirror {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(mut store: Box<dyn DocumentStore>, rx: Receiver<Command>) {
    for cmd in rx {
        match cmd {
            Command::Apply(batch) => {
                if let Err(e) = store.apply(&batch) {
                    tracing::error!(error = %e, ops = batch.len(), "mirror batch failed");
                } else {
                    tracing::debug!(ops = batch.len(), "mirror batch applied");
                }
            }
            Command::Fetch(collection, reply) => {
                let _ = reply.send(store.fetch(collection));
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
}
