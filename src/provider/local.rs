//! Local file provider
//!
//! Reads `colonies.csv` (legacy bulk import, never written) and
//! `colonies.json` (live store) from a data directory. On open the two are
//! reconciled, JSON winning over CSV, and the result is written back as JSON.
//! Every later update rewrites the whole JSON file from the current snapshot.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::ColonyProvider;
use crate::codec::{csv, json};
use crate::error::{Result, SyncError};
use crate::model::{Colony, ColonySet};
use crate::sync::{merge, ChangeHub, ColonyStore};
use crate::worker::TaskPool;

pub const CSV_FILE: &str = "colonies.csv";
pub const JSON_FILE: &str = "colonies.json";

#[derive(Clone)]
pub struct LocalStoreProvider {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    dir: PathBuf,
    store: ColonyStore,
    pool: TaskPool,
    /// Serializes JSON rewrites
    writer: Mutex<()>,
}

impl LocalStoreProvider {
    /// Open the data directory and reconcile its files.
    ///
    /// Never fails: problems are logged and leave the collection empty or
    /// partial. When CSV data was found, `colonies.json` exists on return.
    pub fn open(dir: impl Into<PathBuf>, pool: TaskPool) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            error!(dir = %dir.display(), error = %e, "Cannot create data directory");
        }

        let colonies = reconcile(&dir);
        info!(dir = %dir.display(), colonies = colonies.len(), "Local colony store opened");

        Self {
            inner: Arc::new(LocalInner {
                dir,
                store: ColonyStore::new(colonies, Arc::new(ChangeHub::new())),
                pool,
                writer: Mutex::new(()),
            }),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn csv_path(&self) -> PathBuf {
        self.inner.dir.join(CSV_FILE)
    }

    pub fn json_path(&self) -> PathBuf {
        self.inner.dir.join(JSON_FILE)
    }

    /// Replace the whole collection (sync cycle) and schedule a write.
    pub fn replace(&self, colonies: ColonySet) {
        self.inner.store.publish(colonies);
        self.schedule_persist();
    }

    /// Fold `supplement` over the current collection and schedule a write.
    pub fn merge_in(&self, supplement: &ColonySet) {
        self.inner.store.merge_in(supplement);
        self.schedule_persist();
    }

    /// Write the current snapshot to `colonies.json` now.
    pub async fn persist(&self) -> Result<()> {
        let _writer = self.inner.writer.lock().await;
        // Taken under the writer lock, so a later write always carries a
        // snapshot at least as new as an earlier one.
        let snapshot = self.inner.store.snapshot();
        let path = self.json_path();
        let count = snapshot.len();

        tokio::task::spawn_blocking(move || write_snapshot(&path, &snapshot))
            .await
            .map_err(|e| SyncError::Io(io::Error::other(e)))??;

        debug!(colonies = count, "Persisted colonies.json");
        Ok(())
    }

    fn schedule_persist(&self) {
        let this = self.clone();
        self.inner.pool.spawn("persist-colonies-json", async move {
            if let Err(e) = this.persist().await {
                error!(path = %this.json_path().display(), error = %e, "Failed to persist colonies");
            }
        });
    }
}

impl ColonyProvider for LocalStoreProvider {
    fn colonies(&self) -> Arc<ColonySet> {
        self.inner.store.snapshot()
    }

    fn update_colonies(&self) {
        self.schedule_persist();
    }

    fn update_colony(&self, colony: Colony) {
        debug!(id = colony.id(), "Local colony update");
        self.inner.store.upsert(colony);
        self.schedule_persist();
    }

    fn hub(&self) -> &Arc<ChangeHub> {
        self.inner.store.hub()
    }
}

/// Startup reconciliation of the CSV and JSON files.
fn reconcile(dir: &Path) -> ColonySet {
    let csv_path = dir.join(CSV_FILE);
    let json_path = dir.join(JSON_FILE);

    match (csv_path.exists(), json_path.exists()) {
        (true, false) => {
            let colonies = read_csv(&csv_path);
            info!(colonies = colonies.len(), "Imported colonies.csv, creating colonies.json");
            write_logged(&json_path, &colonies);
            colonies
        }
        (true, true) => {
            let base = read_csv(&csv_path);
            let supplement = read_json(&json_path);
            let merged = merge(&base, &supplement);
            info!(
                csv = base.len(),
                json = supplement.len(),
                merged = merged.len(),
                "Merged colonies.json over colonies.csv"
            );
            write_logged(&json_path, &merged);
            merged
        }
        (false, true) => read_json(&json_path),
        (false, false) => {
            error!(dir = %dir.display(), "No colonies.csv or colonies.json found");
            ColonySet::new()
        }
    }
}

fn read_csv(path: &Path) -> ColonySet {
    match fs::read(path) {
        Ok(bytes) => csv::decode(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Cannot read CSV file");
            ColonySet::new()
        }
    }
}

fn read_json(path: &Path) -> ColonySet {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Cannot read JSON file");
            return ColonySet::new();
        }
    };
    match json::decode_envelope(&text) {
        Ok(colonies) => colonies,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable JSON file");
            ColonySet::new()
        }
    }
}

fn write_logged(path: &Path, colonies: &ColonySet) {
    if let Err(e) = write_snapshot(path, colonies) {
        error!(path = %path.display(), error = %e, "Failed to write colonies");
    }
}

/// Write the envelope to a sibling temp file, then rename it over `path`.
fn write_snapshot(path: &Path, colonies: &ColonySet) -> io::Result<()> {
    let text = serde_json::to_string_pretty(&json::encode_envelope(colonies))?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(text.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}
