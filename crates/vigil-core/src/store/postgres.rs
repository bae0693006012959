use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use super::{GcEntity, Store};
use crate::agent::{AgentId, AgentRecord};
use crate::error::{Result, VigilError};
use crate::queue::{QueueFilter, QueueItem, QueueItemId, QueueStatus, QueueTransition};
use crate::server::CachedServer;
use crate::telemetry::ProbeResultRecord;

const QUEUE_COLUMNS: &str = "id, workspace_id, agent_id, server_id, server_name, status, \
     requested_by, requested_at, expires_at, started_at, completed_at, error";

const AGENT_COLUMNS: &str =
    "id, workspace_id, name, last_seen_at, offline_alerted_at, deleted_at";

/// PostgreSQL (optionally TimescaleDB) implementation of [`Store`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| VigilError::store(format!("migration failed: {e}")))?;
        info!("database schema is up to date");
        Ok(())
    }

    fn map_queue_row(row: &PgRow) -> Result<QueueItem> {
        let status: String = row.try_get("status")?;
        Ok(QueueItem {
            id: row.try_get("id")?,
            workspace_id: row.try_get("workspace_id")?,
            agent_id: row.try_get("agent_id")?,
            server_id: row.try_get("server_id")?,
            server_name: row.try_get("server_name")?,
            status: status.parse()?,
            requested_by: row.try_get("requested_by")?,
            requested_at: row.try_get("requested_at")?,
            expires_at: row.try_get("expires_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            error: row.try_get("error")?,
        })
    }

    fn map_agent_row(row: &PgRow) -> Result<AgentRecord> {
        Ok(AgentRecord {
            id: row.try_get("id")?,
            workspace_id: row.try_get("workspace_id")?,
            name: row.try_get("name")?,
            last_seen_at: row.try_get("last_seen_at")?,
            offline_alerted_at: row.try_get("offline_alerted_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn map_server_row(row: &PgRow) -> Result<CachedServer> {
        Ok(CachedServer {
            agent_id: row.try_get("agent_id")?,
            server_id: row.try_get("server_id")?,
            name: row.try_get("name")?,
            host: row.try_get("host")?,
            location: row.try_get("location")?,
            country: row.try_get("country")?,
            sponsor: row.try_get("sponsor")?,
            distance_km: row.try_get("distance_km")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_queue_item(&self, item: &QueueItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_items (
                id, workspace_id, agent_id, server_id, server_name, status,
                requested_by, requested_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id)
        .bind(item.workspace_id)
        .bind(item.agent_id)
        .bind(&item.server_id)
        .bind(&item.server_name)
        .bind(item.status.as_str())
        .bind(item.requested_by)
        .bind(item.requested_at)
        .bind(item.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_queue_item(&self, id: QueueItemId) -> Result<Option<QueueItem>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM queue_items WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::map_queue_row)
            .transpose()
    }

    async fn list_pending_queue_items(
        &self,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM queue_items \
             WHERE agent_id = $1 AND status = 'pending' AND expires_at > $2 \
             ORDER BY requested_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(agent_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::map_queue_row).collect()
    }

    async fn list_queue_items(
        &self,
        agent_id: AgentId,
        filter: &QueueFilter,
    ) -> Result<Vec<QueueItem>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM queue_items \
             WHERE agent_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY requested_at DESC LIMIT $3"
        );
        let limit = i64::try_from(filter.effective_limit()).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql)
            .bind(agent_id)
            .bind(filter.status.map(QueueStatus::as_str))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::map_queue_row).collect()
    }

    async fn transition_queue_item(
        &self,
        id: QueueItemId,
        expected: &[QueueStatus],
        transition: &QueueTransition,
    ) -> Result<bool> {
        let expected: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();
        let (started_at, completed_at, error) = match transition {
            QueueTransition::Start { at } => (Some(*at), None, None),
            QueueTransition::Complete { at } | QueueTransition::Cancel { at } => {
                (None, Some(*at), None)
            }
            QueueTransition::Fail { at, message } => (None, Some(*at), Some(message.as_str())),
            QueueTransition::Expire => (None, None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE queue_items
            SET status = $3,
                started_at = COALESCE($4, started_at),
                completed_at = COALESCE($5, completed_at),
                error = COALESCE($6, error)
            WHERE id = $1 AND status = ANY($2)
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(transition.target().as_str())
        .bind(started_at)
        .bind(completed_at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn expire_pending_queue_items(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE queue_items SET status = 'expired' WHERE status = 'pending' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_queue_item(&self, id: QueueItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM queue_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_finished_queue_items(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM queue_items
            WHERE (status = 'expired' AND expires_at < $1)
               OR (status IN ('completed', 'failed', 'cancelled') AND completed_at < $1)
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_queue_items_by_status(&self) -> Result<Vec<(QueueStatus, u64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS total FROM queue_items GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts: Vec<(QueueStatus, u64)> =
            QueueStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for row in &rows {
            let status: String = row.try_get("status")?;
            let total: i64 = row.try_get("total")?;
            let status: QueueStatus = status.parse()?;
            if let Some(slot) = counts.iter_mut().find(|(s, _)| *s == status) {
                slot.1 = u64::try_from(total).unwrap_or_default();
            }
        }
        Ok(counts)
    }

    async fn upsert_servers_for_agent(
        &self,
        agent_id: AgentId,
        servers: &[CachedServer],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for server in servers {
            sqlx::query(
                r#"
                INSERT INTO cached_servers (
                    agent_id, server_id, name, host, location, country, sponsor,
                    distance_km, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (agent_id, server_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    host = EXCLUDED.host,
                    location = EXCLUDED.location,
                    country = EXCLUDED.country,
                    sponsor = EXCLUDED.sponsor,
                    distance_km = EXCLUDED.distance_km,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(agent_id)
            .bind(&server.server_id)
            .bind(&server.name)
            .bind(&server.host)
            .bind(&server.location)
            .bind(&server.country)
            .bind(&server.sponsor)
            .bind(server.distance_km)
            .bind(server.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_servers_for_agent(&self, agent_id: AgentId) -> Result<Vec<CachedServer>> {
        let rows = sqlx::query(
            r#"
            SELECT agent_id, server_id, name, host, location, country, sponsor,
                   distance_km, updated_at
            FROM cached_servers
            WHERE agent_id = $1
            ORDER BY server_id
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::map_server_row).collect()
    }

    async fn append_probe_result(&self, record: &ProbeResultRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO probe_results (
                observed_at, kind, probe_id, agent_id, submitting_agent_id,
                target, triggered, data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.observed_at)
        .bind(record.kind.as_str())
        .bind(record.probe_id)
        .bind(record.agent_id)
        .bind(record.submitting_agent_id)
        .bind(&record.target)
        .bind(record.triggered)
        .bind(&record.data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply_retention_policy(&self, table: &str, window: Duration) -> Result<()> {
        let days = i32::try_from(window.num_days())
            .map_err(|_| VigilError::bad_input("retention window out of range"))?;

        // Needs TimescaleDB and a hypertable; plain PostgreSQL reports an error
        // the caller logs and ignores.
        sqlx::query(
            "SELECT add_retention_policy($1::regclass, drop_after => make_interval(days => $2), if_not_exists => true)",
        )
        .bind(table)
        .bind(days)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, workspace_id, name, last_seen_at, offline_alerted_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                workspace_id = EXCLUDED.workspace_id,
                name = EXCLUDED.name,
                last_seen_at = EXCLUDED.last_seen_at,
                offline_alerted_at = EXCLUDED.offline_alerted_at,
                deleted_at = EXCLUDED.deleted_at
            "#,
        )
        .bind(agent.id)
        .bind(agent.workspace_id)
        .bind(&agent.name)
        .bind(agent.last_seen_at)
        .bind(agent.offline_alerted_at)
        .bind(agent.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_agent(&self, agent_id: AgentId) -> Result<Option<AgentRecord>> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1");
        sqlx::query(&sql)
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::map_agent_row)
            .transpose()
    }

    async fn touch_agent_last_seen(&self, agent_id: AgentId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agents SET last_seen_at = $2 WHERE id = $1 AND (last_seen_at IS NULL OR last_seen_at < $2)",
        )
        .bind(agent_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_agents_needing_offline_alert(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<Vec<AgentRecord>> {
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents \
             WHERE deleted_at IS NULL \
               AND last_seen_at IS NOT NULL \
               AND last_seen_at < $1 \
               AND (offline_alerted_at IS NULL OR offline_alerted_at < last_seen_at)"
        );
        let rows = sqlx::query(&sql)
            .bind(crate::clock::horizon(now, threshold)?)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::map_agent_row).collect()
    }

    async fn mark_agent_offline_alerted(
        &self,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE agents SET offline_alerted_at = $2 WHERE id = $1")
            .bind(agent_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_soft_deleted(&self, entity: GcEntity, cutoff: DateTime<Utc>) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE deleted_at IS NOT NULL AND deleted_at < $1",
            entity.table()
        );
        let result = sqlx::query(&sql).bind(cutoff).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
