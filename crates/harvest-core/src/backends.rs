//! Backend construction.
//!
//! Record stores bind to a collection when they connect, so backends are
//! built only after the record has been routed. The pipeline goes through
//! [`BackendFactory`], which lets tests count (or forbid) constructions.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use harvest_state::fakes::MemoryRecordStore;
use harvest_state::{
    FsObjectStore, ObjectStore, PostgresConfig, PostgresRecordStore, RecordStore, StorageError,
    SurrealConfig, SurrealRecordStore, SwiftConfig, SwiftObjectStore,
};
use tracing::info;

use crate::error::{IngestError, Result};

/// Live clients for one ingest.
pub struct Backends {
    pub objects: Arc<dyn ObjectStore>,
    /// Record stores in dispatch order.
    pub stores: Vec<Arc<dyn RecordStore>>,
}

/// Builds the backends bound to a routed collection.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn build(&self, collection: &str) -> Result<Backends>;
}

/// Record store selection.
#[derive(Debug, Clone)]
pub enum DatabaseBackend {
    Surreal(SurrealConfig),
    Postgres(PostgresConfig),
    /// Process-local store; nothing survives the process.
    Memory,
}

impl DatabaseBackend {
    pub fn name(&self) -> &'static str {
        match self {
            DatabaseBackend::Surreal(_) => "surreal",
            DatabaseBackend::Postgres(_) => "postgres",
            DatabaseBackend::Memory => "memory",
        }
    }

    async fn connect(&self, collection: &str) -> Result<Arc<dyn RecordStore>> {
        let store: Arc<dyn RecordStore> = match self {
            DatabaseBackend::Surreal(config) => Arc::new(
                SurrealRecordStore::connect(config, collection)
                    .await
                    .map_err(|e| client_error(self.name(), e))?,
            ),
            DatabaseBackend::Postgres(config) => Arc::new(
                PostgresRecordStore::connect(config, collection)
                    .await
                    .map_err(|e| client_error(self.name(), e))?,
            ),
            DatabaseBackend::Memory => Arc::new(MemoryRecordStore::named("memory", collection)),
        };
        Ok(store)
    }
}

/// Object store selection.
#[derive(Debug, Clone)]
pub enum ObjectBackend {
    Swift(SwiftConfig),
    /// Filesystem store rooted at the given directory.
    Fs(PathBuf),
}

impl ObjectBackend {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectBackend::Swift(_) => "swift",
            ObjectBackend::Fs(_) => "fs",
        }
    }

    async fn connect(&self) -> Result<Arc<dyn ObjectStore>> {
        let store: Arc<dyn ObjectStore> = match self {
            ObjectBackend::Swift(config) => Arc::new(
                SwiftObjectStore::connect(config)
                    .await
                    .map_err(|e| client_error(self.name(), e))?,
            ),
            ObjectBackend::Fs(root) => {
                Arc::new(FsObjectStore::new(root).map_err(|e| client_error(self.name(), e))?)
            }
        };
        Ok(store)
    }
}

fn client_error(backend: &str, source: StorageError) -> IngestError {
    IngestError::ClientConstruction {
        backend: backend.to_string(),
        source,
    }
}

/// Factory over the backends chosen by configuration.
#[derive(Debug, Clone)]
pub struct ConfiguredBackends {
    databases: Vec<DatabaseBackend>,
    objects: ObjectBackend,
}

impl ConfiguredBackends {
    pub fn new(databases: Vec<DatabaseBackend>, objects: ObjectBackend) -> Self {
        Self { databases, objects }
    }
}

impl fmt::Display for ConfiguredBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.databases.iter().map(DatabaseBackend::name).collect();
        write!(f, "[{}] + {}", names.join(", "), self.objects.name())
    }
}

#[async_trait]
impl BackendFactory for ConfiguredBackends {
    async fn build(&self, collection: &str) -> Result<Backends> {
        let mut stores = Vec::with_capacity(self.databases.len());
        for db in &self.databases {
            stores.push(db.connect(collection).await?);
        }
        let objects = self.objects.connect().await?;

        info!(backends = %self, collection = %collection, "Backends ready");
        Ok(Backends { objects, stores })
    }
}
