//! Common test utilities for migration tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use theia_migrate::{Migrator, VersionChain};
use theia_store::{SchemaRepo, StoreError, StoreResult};

/// State of the version table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionTable {
    Missing,
    Empty,
    Holding(String),
}

/// Schema store that records every statement it would send.
pub struct RecordingSchemaStore {
    statements: Mutex<Vec<String>>,
    version: Mutex<VersionTable>,
    flows_exist: bool,
    failing_reads: AtomicU32,
}

#[allow(dead_code)]
impl RecordingSchemaStore {
    pub fn new(version: VersionTable, flows_exist: bool) -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            version: Mutex::new(version),
            flows_exist,
            failing_reads: AtomicU32::new(0),
        }
    }

    /// Store with `version` recorded and a flows table present.
    pub fn at(version: &str) -> Self {
        Self::new(VersionTable::Holding(version.to_string()), true)
    }

    /// Fail the next `count` version reads with a transport error.
    pub fn failing_reads(self, count: u32) -> Self {
        self.failing_reads.store(count, Ordering::SeqCst);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| !sql.starts_with("SELECT"))
            .collect()
    }

    pub fn version_table(&self) -> VersionTable {
        self.version.lock().unwrap().clone()
    }

    fn record(&self, sql: impl Into<String>) {
        self.statements.lock().unwrap().push(sql.into());
    }
}

#[async_trait]
impl SchemaRepo for RecordingSchemaStore {
    async fn data_version(&self) -> StoreResult<Option<String>> {
        self.record("SELECT version FROM migrate_version");
        let failing = self.failing_reads.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_reads.store(failing - 1, Ordering::SeqCst);
            return Err(StoreError::Transport("connection reset by peer".to_string()));
        }
        match self.version_table() {
            VersionTable::Missing => Err(StoreError::UnknownTable(
                "Code: 60. DB::Exception: Table default.migrate_version doesn't exist".to_string(),
            )),
            VersionTable::Empty => Ok(None),
            VersionTable::Holding(version) => Ok(Some(version)),
        }
    }

    async fn set_data_version(&self, version: &str) -> StoreResult<()> {
        self.record("CREATE TABLE IF NOT EXISTS migrate_version (version String)");
        self.record(format!("INSERT INTO migrate_version (*) VALUES ('{version}')"));
        self.record(format!("ALTER TABLE migrate_version DELETE WHERE version != '{version}'"));
        *self.version.lock().unwrap() = VersionTable::Holding(version.to_string());
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> StoreResult<bool> {
        self.record(format!("SELECT COUNT() FROM {table}"));
        Ok(self.flows_exist && table == "flows")
    }

    async fn execute(&self, sql: &str) -> StoreResult<()> {
        self.record(sql);
        Ok(())
    }
}

/// Migrator that appends its name to a shared log.
pub struct RecordingMigrator {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

#[async_trait]
impl Migrator for RecordingMigrator {
    async fn apply(&self, _store: &dyn SchemaRepo) -> StoreResult<()> {
        self.log.lock().unwrap().push(self.name.clone());
        if self.fail {
            return Err(StoreError::Exception(format!("{} failed", self.name)));
        }
        Ok(())
    }
}

/// Chain over `versions` whose migrators log `up a->b` / `down b->a`.
///
/// The migrator named `failing` returns an error after logging.
#[allow(dead_code)]
pub fn recording_chain(
    versions: &[&str],
    failing: Option<&str>,
) -> (VersionChain, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let migrator = |name: String| -> Box<dyn Migrator> {
        let fail = failing == Some(name.as_str());
        Box::new(RecordingMigrator {
            name,
            log: log.clone(),
            fail,
        })
    };

    let mut forward = Vec::new();
    let mut backward = Vec::new();
    for pair in versions.windows(2) {
        forward.push(migrator(format!("up {}->{}", pair[0], pair[1])));
        backward.push(migrator(format!("down {}->{}", pair[1], pair[0])));
    }

    let chain = VersionChain::from_parts(versions, forward, backward)
        .unwrap_or_else(|e| panic!("invalid test chain: {e}"));
    (chain, log)
}
