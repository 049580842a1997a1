use async_trait::async_trait;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use std::collections::HashMap;

use crate::db::utils::is_unique_constraint_violation_error;
use crate::db::{PodStore, PodsDbError};
use crate::pods::{Pod, PodEnv, PodPort, PodSpec};

#[derive(Debug, FromRow)]
pub struct PodRow {
    id: i64,
    name: String,
    namespace: String,
    team_id: i64,
    cpu_min: f32,
    cpu_max: f32,
    memory_min: f32,
    memory_max: f32,
    replicas: i32,
    pull_policy: String,
    restart_policy: String,
    pod_type: String,
    image: String,
}

impl PodRow {
    fn into_pod(self, ports: Vec<PodPort>, env: Vec<PodEnv>) -> Pod {
        Pod {
            id: self.id,
            spec: PodSpec {
                name: self.name,
                namespace: self.namespace,
                team_id: self.team_id,
                cpu_min: self.cpu_min,
                cpu_max: self.cpu_max,
                memory_min: self.memory_min,
                memory_max: self.memory_max,
                replicas: self.replicas,
                ports,
                env,
                pull_policy: self.pull_policy,
                restart_policy: self.restart_policy,
                pod_type: self.pod_type,
                image: self.image,
            },
        }
    }
}

#[derive(Debug, FromRow)]
struct PortRow {
    pod_id: i64,
    container_port: i32,
    host_port: Option<i32>,
    protocol: String,
}

impl From<PortRow> for PodPort {
    fn from(row: PortRow) -> Self {
        PodPort {
            container_port: row.container_port,
            host_port: row.host_port,
            protocol: row.protocol,
        }
    }
}

#[derive(Debug, FromRow)]
struct EnvRow {
    pod_id: i64,
    key: String,
    value: String,
}

impl From<EnvRow> for PodEnv {
    fn from(row: EnvRow) -> Self {
        PodEnv {
            key: row.key,
            value: row.value,
        }
    }
}

const POD_COLUMNS: &str = r#"
    id, name, namespace, team_id, cpu_min, cpu_max, memory_min, memory_max,
    replicas, pull_policy, restart_policy, pod_type, image
"#;

fn into_write_error(err: sqlx::Error, name: &str) -> PodsDbError {
    if is_unique_constraint_violation_error(&err) {
        PodsDbError::DuplicateName(name.to_string())
    } else {
        PodsDbError::Database(err)
    }
}

pub async fn insert_pod<'c, E>(executor: E, spec: &PodSpec) -> Result<i64, PodsDbError>
where
    E: PgExecutor<'c>,
{
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into app.pods (
            name, namespace, team_id, cpu_min, cpu_max, memory_min, memory_max,
            replicas, pull_policy, restart_policy, pod_type, image
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        returning id
        "#,
    )
    .bind(&spec.name)
    .bind(&spec.namespace)
    .bind(spec.team_id)
    .bind(spec.cpu_min)
    .bind(spec.cpu_max)
    .bind(spec.memory_min)
    .bind(spec.memory_max)
    .bind(spec.replicas)
    .bind(&spec.pull_policy)
    .bind(&spec.restart_policy)
    .bind(&spec.pod_type)
    .bind(&spec.image)
    .fetch_one(executor)
    .await
    .map_err(|e| into_write_error(e, &spec.name))?;

    Ok(id)
}

pub async fn update_pod_row<'c, E>(
    executor: E,
    id: i64,
    spec: &PodSpec,
) -> Result<Option<i64>, PodsDbError>
where
    E: PgExecutor<'c>,
{
    let record: Option<(i64,)> = sqlx::query_as(
        r#"
        update app.pods
        set name = $1, namespace = $2, team_id = $3, cpu_min = $4, cpu_max = $5,
            memory_min = $6, memory_max = $7, replicas = $8, pull_policy = $9,
            restart_policy = $10, pod_type = $11, image = $12, updated_at = now()
        where id = $13
        returning id
        "#,
    )
    .bind(&spec.name)
    .bind(&spec.namespace)
    .bind(spec.team_id)
    .bind(spec.cpu_min)
    .bind(spec.cpu_max)
    .bind(spec.memory_min)
    .bind(spec.memory_max)
    .bind(spec.replicas)
    .bind(&spec.pull_policy)
    .bind(&spec.restart_policy)
    .bind(&spec.pod_type)
    .bind(&spec.image)
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(|e| into_write_error(e, &spec.name))?;

    Ok(record.map(|(id,)| id))
}

pub async fn insert_port<'c, E>(
    executor: E,
    pod_id: i64,
    position: i32,
    port: &PodPort,
) -> Result<(), PodsDbError>
where
    E: PgExecutor<'c>,
{
    sqlx::query(
        r#"
        insert into app.pod_ports (pod_id, position, container_port, host_port, protocol)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(pod_id)
    .bind(position)
    .bind(port.container_port)
    .bind(port.host_port)
    .bind(&port.protocol)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn insert_env<'c, E>(
    executor: E,
    pod_id: i64,
    position: i32,
    env: &PodEnv,
) -> Result<(), PodsDbError>
where
    E: PgExecutor<'c>,
{
    sqlx::query(
        r#"
        insert into app.pod_envs (pod_id, position, key, value)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(pod_id)
    .bind(position)
    .bind(&env.key)
    .bind(&env.value)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn delete_ports<'c, E>(executor: E, pod_id: i64) -> Result<(), PodsDbError>
where
    E: PgExecutor<'c>,
{
    sqlx::query("delete from app.pod_ports where pod_id = $1")
        .bind(pod_id)
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn delete_envs<'c, E>(executor: E, pod_id: i64) -> Result<(), PodsDbError>
where
    E: PgExecutor<'c>,
{
    sqlx::query("delete from app.pod_envs where pod_id = $1")
        .bind(pod_id)
        .execute(executor)
        .await?;

    Ok(())
}

/// Deletes the pod row. Child rows go with it through `on delete cascade`.
pub async fn delete_pod_row<'c, E>(executor: E, id: i64) -> Result<Option<i64>, PodsDbError>
where
    E: PgExecutor<'c>,
{
    let record: Option<(i64,)> = sqlx::query_as(
        r#"
        delete from app.pods
        where id = $1
        returning id
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(record.map(|(id,)| id))
}

pub async fn read_pod_row<'c, E>(executor: E, id: i64) -> Result<Option<PodRow>, PodsDbError>
where
    E: PgExecutor<'c>,
{
    let query = format!("select {POD_COLUMNS} from app.pods where id = $1");
    let row = sqlx::query_as(&query)
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(row)
}

pub async fn read_pod_row_by_name<'c, E>(
    executor: E,
    name: &str,
) -> Result<Option<PodRow>, PodsDbError>
where
    E: PgExecutor<'c>,
{
    let query = format!("select {POD_COLUMNS} from app.pods where name = $1");
    let row = sqlx::query_as(&query)
        .bind(name)
        .fetch_optional(executor)
        .await?;

    Ok(row)
}

async fn read_ports<'c, E>(executor: E, pod_id: i64) -> Result<Vec<PodPort>, PodsDbError>
where
    E: PgExecutor<'c>,
{
    let rows: Vec<PortRow> = sqlx::query_as(
        r#"
        select pod_id, container_port, host_port, protocol
        from app.pod_ports
        where pod_id = $1
        order by position
        "#,
    )
    .bind(pod_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn read_envs<'c, E>(executor: E, pod_id: i64) -> Result<Vec<PodEnv>, PodsDbError>
where
    E: PgExecutor<'c>,
{
    let rows: Vec<EnvRow> = sqlx::query_as(
        r#"
        select pod_id, key, value
        from app.pod_envs
        where pod_id = $1
        order by position
        "#,
    )
    .bind(pod_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Postgres backed [`PodStore`].
///
/// Every operation touching more than one table runs in a single transaction.
#[derive(Debug, Clone)]
pub struct PgPodStore {
    pool: PgPool,
}

impl PgPodStore {
    pub fn new(pool: PgPool) -> PgPodStore {
        PgPodStore { pool }
    }

    /// Loads the children of `row` within the transaction that read it.
    async fn with_children(
        mut txn: Transaction<'_, Postgres>,
        row: Option<PodRow>,
    ) -> Result<Option<Pod>, PodsDbError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let ports = read_ports(&mut *txn, row.id).await?;
        let env = read_envs(&mut *txn, row.id).await?;

        txn.commit().await?;

        Ok(Some(row.into_pod(ports, env)))
    }
}

#[async_trait]
impl PodStore for PgPodStore {
    async fn create_pod(&self, spec: &PodSpec) -> Result<i64, PodsDbError> {
        let mut txn = self.pool.begin().await?;

        let id = insert_pod(&mut *txn, spec).await?;
        for (position, port) in (0..).zip(&spec.ports) {
            insert_port(&mut *txn, id, position, port).await?;
        }
        for (position, env) in (0..).zip(&spec.env) {
            insert_env(&mut *txn, id, position, env).await?;
        }

        txn.commit().await?;

        Ok(id)
    }

    async fn read_pod(&self, id: i64) -> Result<Option<Pod>, PodsDbError> {
        let mut txn = self.pool.begin().await?;
        let row = read_pod_row(&mut *txn, id).await?;

        Self::with_children(txn, row).await
    }

    async fn read_pod_by_name(&self, name: &str) -> Result<Option<Pod>, PodsDbError> {
        let mut txn = self.pool.begin().await?;
        let row = read_pod_row_by_name(&mut *txn, name).await?;

        Self::with_children(txn, row).await
    }

    async fn update_pod(&self, pod: &Pod) -> Result<Option<i64>, PodsDbError> {
        let mut txn = self.pool.begin().await?;

        let Some(id) = update_pod_row(&mut *txn, pod.id, &pod.spec).await? else {
            return Ok(None);
        };

        // Children are replaced wholesale, dropping entries no longer present.
        delete_ports(&mut *txn, id).await?;
        delete_envs(&mut *txn, id).await?;
        for (position, port) in (0..).zip(&pod.spec.ports) {
            insert_port(&mut *txn, id, position, port).await?;
        }
        for (position, env) in (0..).zip(&pod.spec.env) {
            insert_env(&mut *txn, id, position, env).await?;
        }

        txn.commit().await?;

        Ok(Some(id))
    }

    async fn delete_pod(&self, id: i64) -> Result<Option<i64>, PodsDbError> {
        delete_pod_row(&self.pool, id).await
    }

    async fn read_all_pods(&self) -> Result<Vec<Pod>, PodsDbError> {
        let mut txn = self.pool.begin().await?;

        let query = format!("select {POD_COLUMNS} from app.pods order by id");
        let rows: Vec<PodRow> = sqlx::query_as(&query).fetch_all(&mut *txn).await?;

        let port_rows: Vec<PortRow> = sqlx::query_as(
            r#"
            select pod_id, container_port, host_port, protocol
            from app.pod_ports
            order by pod_id, position
            "#,
        )
        .fetch_all(&mut *txn)
        .await?;

        let env_rows: Vec<EnvRow> = sqlx::query_as(
            r#"
            select pod_id, key, value
            from app.pod_envs
            order by pod_id, position
            "#,
        )
        .fetch_all(&mut *txn)
        .await?;

        txn.commit().await?;

        let mut ports: HashMap<i64, Vec<PodPort>> = HashMap::new();
        for row in port_rows {
            ports.entry(row.pod_id).or_default().push(row.into());
        }
        let mut envs: HashMap<i64, Vec<PodEnv>> = HashMap::new();
        for row in env_rows {
            envs.entry(row.pod_id).or_default().push(row.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let pod_ports = ports.remove(&row.id).unwrap_or_default();
                let pod_env = envs.remove(&row.id).unwrap_or_default();
                row.into_pod(pod_ports, pod_env)
            })
            .collect())
    }
}
