use crate::framework::DatabaseProcessor;
use crate::model::ChannelConfig;
use kanau::processor::Processor;
use sqlx::types::Json;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelConfigRow {
    pub name: String,
    pub config: Json<ChannelConfig>,
}

#[derive(Debug, Clone)]
/// Insert or replace the config stored under `name`.
pub struct UpsertChannelConfig {
    pub name: String,
    pub config: ChannelConfig,
}

impl Processor<UpsertChannelConfig> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertChannelConfig")]
    async fn process(&self, cmd: UpsertChannelConfig) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO channel_configs (name, config)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE
            SET config = EXCLUDED.config, updated_at = NOW()
            "#,
        )
        .bind(cmd.name)
        .bind(Json(cmd.config))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetChannelConfig {
    pub name: String,
}

impl Processor<GetChannelConfig> for DatabaseProcessor {
    type Output = Option<ChannelConfig>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetChannelConfig")]
    async fn process(&self, query: GetChannelConfig) -> Result<Option<ChannelConfig>, sqlx::Error> {
        let row = sqlx::query_as::<_, ChannelConfigRow>(
            "SELECT name, config FROM channel_configs WHERE name = $1",
        )
        .bind(query.name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.config.0))
    }
}

#[derive(Debug, Clone)]
pub struct GetAllChannelConfigs;

impl Processor<GetAllChannelConfigs> for DatabaseProcessor {
    type Output = Vec<ChannelConfig>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetAllChannelConfigs")]
    async fn process(&self, _: GetAllChannelConfigs) -> Result<Vec<ChannelConfig>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ChannelConfigRow>(
            "SELECT name, config FROM channel_configs ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.config.0).collect())
    }
}

#[derive(Debug, Clone)]
pub struct DeleteChannelConfig {
    pub name: String,
}

impl Processor<DeleteChannelConfig> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteChannelConfig")]
    async fn process(&self, cmd: DeleteChannelConfig) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM channel_configs WHERE name = $1")
            .bind(cmd.name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
