//! SQLite-backed store.
//!
//! ## Schema
//!
//! Two tables, created on [`SqliteStore::migrate`]:
//!
//! - `agents`: one row per agent guid (`UNIQUE`), integer primary key
//! - `jobs`: one row per job, indexed on `agent_id`
//!
//! Timestamps are RFC 3339 text, JSON columns are serialized text, and the job
//! status column is free text read leniently (missing or blank means `Created`).
//!
//! ## Compare-and-set
//!
//! `mark_sent` and `update_job` are single `UPDATE ... WHERE <status predicate>`
//! statements, so SQLite's writer lock makes each claim atomic. `mark_sent`
//! uses `RETURNING` to report exactly which rows it moved.
//!
//! ## Error Mapping
//!
//! | sqlx error | SQLite code | StoreError |
//! |------------|-------------|------------|
//! | Database (unique / primary key) | `2067` / `1555` | `Conflict` |
//! | Database (other) | any | `Backend` |
//! | RowNotFound | n/a | `NotFound` |
//! | anything else | n/a | `Backend` |

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use taskrelay_core::{Agent, AgentHello, AgentId, AgentStatus, Job, JobId, JobStatus, NewJob};

use super::r#trait::{AgentStore, JobStore, StoreError};

/// Rows whose stored status reads as `Created`.
const PENDING_PREDICATE: &str =
    "(status IS NULL OR trim(status) = '' OR lower(trim(status)) = 'created')";

/// Normalized stored status, comparable against a lowercased status name.
const NORMALIZED_STATUS: &str = "lower(coalesce(nullif(trim(status), ''), 'created'))";

/// Bound parameters per `mark_sent` statement.
const CLAIM_CHUNK: usize = 500;

const JOB_COLUMNS: &str =
    "job_id, job_type, job_data, agent_id, status, job_output, error_message, created_at";

const AGENT_COLUMNS: &str = "agent_id, agent_guid, agent_name, status, last_check_in, location, \
     plugins, version, registered_at, last_updated";

/// Durable job and agent store over a `SqlitePool`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. The schema is not touched; call [`SqliteStore::migrate`].
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and bootstrap the schema.
    #[instrument(skip(url), err)]
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| map_sqlx_error("connect", e))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database.
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool is
    /// pinned to one connection that is never recycled.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| map_sqlx_error("connect", e))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                agent_id      INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_guid    TEXT NOT NULL,
                agent_name    TEXT NOT NULL DEFAULT '',
                status        TEXT NOT NULL DEFAULT 'Offline',
                last_check_in TEXT NULL,
                location      TEXT NULL,
                plugins       TEXT NOT NULL DEFAULT '[]',
                version       TEXT NULL,
                registered_at TEXT NOT NULL,
                last_updated  TEXT NOT NULL
            )
            "#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_agents_guid ON agents (agent_guid)",
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id        INTEGER PRIMARY KEY AUTOINCREMENT,
                job_type      TEXT NOT NULL,
                job_data      TEXT NOT NULL,
                agent_id      INTEGER NOT NULL,
                status        TEXT NULL DEFAULT 'Created',
                job_output    TEXT NULL,
                error_message TEXT NULL,
                created_at    TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_jobs_agent_id ON jobs (agent_id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    async fn job_exists(&self, id: JobId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM jobs WHERE job_id = ?1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("job_exists", e))?;
        Ok(row.is_some())
    }
}

#[async_trait::async_trait]
impl JobStore for SqliteStore {
    #[instrument(skip(self, job), fields(agent_id = %job.agent_id, job_type = %job.job_type), err)]
    async fn insert_job(&self, job: NewJob) -> Result<Job, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO jobs (job_type, job_data, agent_id, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING job_id
            "#,
        )
        .bind(&job.job_type)
        .bind(encode_json(&job.job_data)?)
        .bind(job.agent_id.get())
        .bind(JobStatus::Created.as_str())
        .bind(encode_timestamp(job.created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_job", e))?;

        let id: i64 = row
            .try_get("job_id")
            .map_err(|e| map_sqlx_error("insert_job", e))?;
        Ok(Job::from_new(JobId::new(id), job))
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;

        row.map(|row| decode_job(&row)).transpose()
    }

    #[instrument(skip(self), fields(agent_id = %agent_id), err)]
    async fn jobs_for_agent(&self, agent_id: AgentId) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE agent_id = ?1 ORDER BY job_id ASC"
        ))
        .bind(agent_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("jobs_for_agent", e))?;

        rows.iter().map(decode_job).collect()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, to = %job.status, expected = %expected), err)]
    async fn update_job(&self, job: &Job, expected: JobStatus) -> Result<(), StoreError> {
        let output = job.job_output.as_ref().map(encode_json).transpose()?;

        let result = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = ?1, job_output = ?2, error_message = ?3
            WHERE job_id = ?4 AND {NORMALIZED_STATUS} = ?5
            "#
        ))
        .bind(job.status.as_str())
        .bind(output)
        .bind(job.error_message.as_deref())
        .bind(job.id.get())
        .bind(expected.as_str().to_ascii_lowercase())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        if self.job_exists(job.id).await? {
            Err(StoreError::Conflict(format!(
                "job {} is no longer {}",
                job.id, expected
            )))
        } else {
            Err(StoreError::NotFound(format!("job {}", job.id)))
        }
    }

    #[instrument(skip(self, ids), fields(requested = ids.len()), err)]
    async fn mark_sent(&self, ids: &[JobId]) -> Result<Vec<JobId>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("mark_sent", e))?;

        let mut claimed = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(CLAIM_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE jobs SET status = ");
            qb.push_bind(JobStatus::Sent.as_str());
            qb.push(" WHERE ");
            qb.push(PENDING_PREDICATE);
            qb.push(" AND job_id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(id.get());
            }
            separated.push_unseparated(") RETURNING job_id");

            let rows = qb
                .build()
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("mark_sent", e))?;

            for row in rows {
                let id: i64 = row
                    .try_get("job_id")
                    .map_err(|e| map_sqlx_error("mark_sent", e))?;
                claimed.push(JobId::new(id));
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("mark_sent", e))?;

        // RETURNING order is unspecified.
        claimed.sort();

        debug!(claimed = claimed.len(), "marked jobs sent");
        Ok(claimed)
    }
}

#[async_trait::async_trait]
impl AgentStore for SqliteStore {
    #[instrument(skip(self), fields(agent_id = %id), err)]
    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id = ?1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_agent", e))?;

        row.map(|row| decode_agent(&row)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_agent_by_guid(&self, guid: &str) -> Result<Option<Agent>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE agent_guid = ?1"
        ))
        .bind(guid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_agent_by_guid", e))?;

        row.map(|row| decode_agent(&row)).transpose()
    }

    #[instrument(skip(self, hello), fields(agent_guid = %hello.agent_guid), err)]
    async fn upsert_agent(
        &self,
        hello: &AgentHello,
        now: DateTime<Utc>,
    ) -> Result<Agent, StoreError> {
        let plugins = hello
            .plugins
            .as_ref()
            .map(|p| serde_json::to_string(p).map_err(|e| StoreError::Serialization(e.to_string())))
            .transpose()?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO agents (
                agent_guid, agent_name, status, last_check_in, location,
                plugins, version, registered_at, last_updated
            )
            VALUES (?1, coalesce(?2, ''), ?3, ?4, ?5, coalesce(?6, '[]'), ?7, ?4, ?4)
            ON CONFLICT (agent_guid) DO UPDATE SET
                agent_name    = coalesce(?2, agents.agent_name),
                status        = ?3,
                last_check_in = ?4,
                location      = coalesce(?5, agents.location),
                plugins       = coalesce(?6, agents.plugins),
                version       = coalesce(?7, agents.version),
                last_updated  = ?4
            RETURNING {AGENT_COLUMNS}
            "#
        ))
        .bind(&hello.agent_guid)
        .bind(hello.agent_name.as_deref())
        .bind(AgentStatus::Online.as_str())
        .bind(encode_timestamp(now))
        .bind(hello.location.as_deref())
        .bind(plugins)
        .bind(hello.version.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_agent", e))?;

        decode_agent(&row)
    }
}

#[derive(Debug)]
struct JobRow {
    job_id: i64,
    job_type: String,
    job_data: String,
    agent_id: i64,
    status: Option<String>,
    job_output: Option<String>,
    error_message: Option<String>,
    created_at: String,
}

impl<'r> FromRow<'r, SqliteRow> for JobRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(JobRow {
            job_id: row.try_get("job_id")?,
            job_type: row.try_get("job_type")?,
            job_data: row.try_get("job_data")?,
            agent_id: row.try_get("agent_id")?,
            status: row.try_get("status")?,
            job_output: row.try_get("job_output")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: JobId::new(row.job_id),
            job_type: row.job_type,
            job_data: decode_json(&row.job_data)?,
            status: JobStatus::parse_stored(row.status.as_deref())
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            job_output: row.job_output.as_deref().map(decode_json).transpose()?,
            error_message: row.error_message,
            agent_id: AgentId::new(row.agent_id),
            created_at: decode_timestamp(&row.created_at)?,
        })
    }
}

#[derive(Debug)]
struct AgentRow {
    agent_id: i64,
    agent_guid: String,
    agent_name: String,
    status: String,
    last_check_in: Option<String>,
    location: Option<String>,
    plugins: String,
    version: Option<String>,
    registered_at: String,
    last_updated: String,
}

impl<'r> FromRow<'r, SqliteRow> for AgentRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(AgentRow {
            agent_id: row.try_get("agent_id")?,
            agent_guid: row.try_get("agent_guid")?,
            agent_name: row.try_get("agent_name")?,
            status: row.try_get("status")?,
            last_check_in: row.try_get("last_check_in")?,
            location: row.try_get("location")?,
            plugins: row.try_get("plugins")?,
            version: row.try_get("version")?,
            registered_at: row.try_get("registered_at")?,
            last_updated: row.try_get("last_updated")?,
        })
    }
}

impl TryFrom<AgentRow> for Agent {
    type Error = StoreError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let plugins: Vec<String> = serde_json::from_str(&row.plugins)
            .map_err(|e| StoreError::Serialization(format!("agent plugins: {e}")))?;

        Ok(Agent {
            id: AgentId::new(row.agent_id),
            guid: row.agent_guid,
            name: row.agent_name,
            status: AgentStatus::from_str(&row.status)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            last_check_in: row.last_check_in.as_deref().map(decode_timestamp).transpose()?,
            location: row.location,
            plugins,
            version: row.version,
            registered_at: decode_timestamp(&row.registered_at)?,
            last_updated: decode_timestamp(&row.last_updated)?,
        })
    }
}

fn decode_job(row: &SqliteRow) -> Result<Job, StoreError> {
    JobRow::from_row(row)
        .map_err(|e| StoreError::Serialization(format!("failed to read job row: {e}")))?
        .try_into()
}

fn decode_agent(row: &SqliteRow) -> Result<Agent, StoreError> {
    AgentRow::from_row(row)
        .map_err(|e| StoreError::Serialization(format!("failed to read agent row: {e}")))?
        .try_into()
}

fn encode_json(value: &JsonValue) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_json(raw: &str) -> Result<JsonValue, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("invalid timestamp '{raw}': {e}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
                Some("2067") | Some("1555") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {operation}")),
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskrelay_core::JobCandidate;

    fn new_job(agent: i64, data: JsonValue) -> NewJob {
        JobCandidate::new(agent, "Ping", data)
            .validate(Utc::now())
            .unwrap()
    }

    #[tokio::test]
    async fn insert_then_read_back() {
        let store = SqliteStore::in_memory().await.unwrap();
        let inserted = store.insert_job(new_job(7, json!({"host": "a"}))).await.unwrap();

        let loaded = store.get_job(inserted.id).await.unwrap().unwrap();
        assert_eq!(loaded, inserted);
        assert_eq!(loaded.status, JobStatus::Created);
        assert_eq!(loaded.job_output, None);
    }

    #[tokio::test]
    async fn missing_job_reads_as_none() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.get_job(JobId::new(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_and_lowercase_status_rows_are_pending() {
        let store = SqliteStore::in_memory().await.unwrap();
        for status in [None, Some(""), Some("created")] {
            sqlx::query(
                "INSERT INTO jobs (job_type, job_data, agent_id, status, created_at) \
                 VALUES ('Ping', '{}', 3, ?1, ?2)",
            )
            .bind(status)
            .bind(encode_timestamp(Utc::now()))
            .execute(store.pool())
            .await
            .unwrap();
        }

        let jobs = store.jobs_for_agent(AgentId::new(3)).await.unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Created));

        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(store.mark_sent(&ids).await.unwrap(), ids);
    }

    #[tokio::test]
    async fn mark_sent_skips_already_claimed() {
        let store = SqliteStore::in_memory().await.unwrap();
        let a = store.insert_job(new_job(1, json!(1))).await.unwrap();
        let b = store.insert_job(new_job(1, json!(2))).await.unwrap();

        assert_eq!(store.mark_sent(&[a.id]).await.unwrap(), vec![a.id]);
        assert_eq!(store.mark_sent(&[a.id, b.id]).await.unwrap(), vec![b.id]);
        assert!(store.mark_sent(&[a.id, b.id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_job_checks_expected_status() {
        let store = SqliteStore::in_memory().await.unwrap();
        let job = store.insert_job(new_job(1, json!({}))).await.unwrap();
        store.mark_sent(&[job.id]).await.unwrap();

        let mut done = job.clone();
        done.status = JobStatus::Failed;
        done.job_output = Some(JsonValue::Null);
        done.error_message = Some("timeout".into());

        assert!(matches!(
            store.update_job(&done, JobStatus::Created).await,
            Err(StoreError::Conflict(_))
        ));
        store.update_job(&done, JobStatus::Sent).await.unwrap();

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.job_output, Some(JsonValue::Null));
        assert_eq!(stored.error_message.as_deref(), Some("timeout"));

        let mut ghost = done.clone();
        ghost.id = JobId::new(999);
        assert!(matches!(
            store.update_job(&ghost, JobStatus::Sent).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn upsert_agent_keeps_one_row_per_guid() {
        let store = SqliteStore::in_memory().await.unwrap();
        let t0 = Utc::now();

        let hello = AgentHello {
            agent_guid: "g-1".into(),
            agent_name: Some("edge-01".into()),
            plugins: Some(vec!["shell".into(), "ping".into()]),
            ..Default::default()
        };
        let first = store.upsert_agent(&hello, t0).await.unwrap();
        let t1 = t0 + chrono::Duration::seconds(10);
        let second = store.upsert_agent(&AgentHello::new("g-1"), t1).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "edge-01");
        assert_eq!(second.plugins, vec!["shell".to_string(), "ping".to_string()]);
        assert_eq!(second.registered_at, t0);
        assert_eq!(second.last_check_in, Some(t1));
        assert_eq!(second.status, AgentStatus::Online);

        let by_id = store.get_agent(first.id).await.unwrap().unwrap();
        assert_eq!(by_id.guid, "g-1");
        assert!(store.get_agent_by_guid("nope").await.unwrap().is_none());
    }
}
