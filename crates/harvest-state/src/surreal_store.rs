//! SurrealDB-backed RecordStore implementation
//!
//! Each store is bound to one table (the routed collection). Records are
//! written with `UPSERT` on a record id derived from [`RecordKey::id`], so a
//! re-run for the same agency/month/year replaces the previous row.
//!
//! Supports local (in-memory / surrealkv) and remote (WebSocket) connections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::record::{AgencyMonthlyInfo, BackupDescriptor, ExecDuration, ProcInfo, RecordKey};
use crate::storage_traits::{validate_collection, RecordStore, StorageResult};

/// Connection settings for a SurrealDB instance
#[derive(Debug, Clone)]
pub struct SurrealConfig {
    /// Endpoint URL (e.g. "wss://xxx.aws-use1.surrealdb.cloud", "mem://")
    pub endpoint: String,
    /// Username; no sign-in is attempted when unset
    pub username: Option<String>,
    pub password: Option<String>,
    /// Namespace (default: "harvest")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether the credentials belong to a root user
    pub is_root: bool,
}

impl SurrealConfig {
    /// Create a configuration for `endpoint` without credentials
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: None,
            password: None,
            namespace: "harvest".to_string(),
            database: "main".to_string(),
            is_root: false,
        }
    }

    /// In-memory engine, mostly for tests
    pub fn in_memory() -> Self {
        Self::new("mem://")
    }

    /// Set database-user credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set whether this is a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }
}

/// Row shape stored in SurrealDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbRecord {
    agency_id: String,
    month: u32,
    year: u32,
    #[serde(with = "surreal_dt")]
    crawl_timestamp: DateTime<Utc>,
    proc_info: Option<ProcInfo>,
    exec_duration: ExecDuration,
    package: Option<BackupDescriptor>,
    backups: Option<Vec<BackupDescriptor>>,
}

impl From<&AgencyMonthlyInfo> for DbRecord {
    fn from(r: &AgencyMonthlyInfo) -> Self {
        Self {
            agency_id: r.agency_id.clone(),
            month: r.month,
            year: r.year,
            crawl_timestamp: r.crawl_timestamp,
            proc_info: r.proc_info.clone(),
            exec_duration: r.exec_duration,
            package: r.package.clone(),
            backups: r.backups.clone(),
        }
    }
}

impl From<DbRecord> for AgencyMonthlyInfo {
    fn from(row: DbRecord) -> Self {
        Self {
            agency_id: row.agency_id,
            month: row.month,
            year: row.year,
            crawl_timestamp: row.crawl_timestamp,
            proc_info: row.proc_info,
            exec_duration: row.exec_duration,
            package: row.package,
            backups: row.backups,
        }
    }
}

/// SurrealDB-backed implementation of [`RecordStore`].
pub struct SurrealRecordStore {
    db: Surreal<Any>,
    table: String,
}

impl SurrealRecordStore {
    /// Connect, authenticate, select namespace/database and define `collection`.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: &SurrealConfig, collection: &str) -> StorageResult<Self> {
        validate_collection(collection)?;

        let db = surrealdb::engine::any::connect(config.endpoint.as_str())
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            if config.is_root {
                db.signin(Root {
                    username: username.as_str(),
                    password: password.as_str(),
                })
                .await
                .map_err(|e| StorageError::Connection(format!("Root auth failed: {e}")))?;
            } else {
                db.signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username: username.as_str(),
                    password: password.as_str(),
                })
                .await
                .map_err(|e| StorageError::Connection(format!("DB auth failed: {e}")))?;
            }
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to select namespace/database: {e}"))
            })?;

        let store = Self {
            db,
            table: collection.to_string(),
        };
        store.init_schema().await?;

        info!(table = %store.table, "SurrealRecordStore connected");
        Ok(store)
    }

    /// In-memory instance bound to `collection`.
    pub async fn in_memory(collection: &str) -> StorageResult<Self> {
        Self::connect(&SurrealConfig::in_memory(), collection).await
    }

    /// Number of rows in the bound table.
    pub async fn count(&self) -> StorageResult<usize> {
        #[derive(Deserialize)]
        struct Count {
            count: usize,
        }

        let mut res = self
            .db
            .query("SELECT count() FROM type::table($tb) GROUP ALL")
            .bind(("tb", self.table.clone()))
            .await?;
        let rows: Vec<Count> = res.take(0)?;
        Ok(rows.first().map(|c| c.count).unwrap_or(0))
    }

    /// Define the table and its unique (agency, month, year) index.
    ///
    /// Safe to call multiple times.
    async fn init_schema(&self) -> StorageResult<()> {
        debug!(table = %self.table, "Initializing record table");

        let sql = format!(
            r#"
            DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS idx_{table}_key ON TABLE {table} COLUMNS agency_id, month, year UNIQUE;
            DEFINE INDEX IF NOT EXISTS idx_{table}_agency ON TABLE {table} COLUMNS agency_id;
            "#,
            table = self.table
        );

        self.db
            .query(sql)
            .await
            .map_err(|e| StorageError::Connection(format!("Schema setup failed: {e}")))?
            .check()
            .map_err(|e| StorageError::Connection(format!("Schema setup failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SurrealRecordStore {
    fn name(&self) -> &str {
        "surreal"
    }

    fn collection(&self) -> &str {
        &self.table
    }

    #[instrument(skip(self, record), fields(table = %self.table, key = %record.key()))]
    async fn store(&self, record: &AgencyMonthlyInfo) -> StorageResult<()> {
        debug!("Upserting record");

        let row = DbRecord::from(record);
        let _stored: Option<DbRecord> = self
            .db
            .upsert((self.table.as_str(), record.key().id()))
            .content(row)
            .await?;

        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> StorageResult<Option<AgencyMonthlyInfo>> {
        let row: Option<DbRecord> = self.db.select((self.table.as_str(), key.id())).await?;
        Ok(row.map(AgencyMonthlyInfo::from))
    }
}

/// Serialize chrono DateTime as a native SurrealDB datetime.
mod surreal_dt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}
