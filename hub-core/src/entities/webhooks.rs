use crate::framework::DatabaseProcessor;
use crate::model::Webhook;
use kanau::processor::Processor;
use sqlx::types::Json;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebhookRow {
    pub name: String,
    pub definition: Json<Webhook>,
}

#[derive(Debug, Clone)]
pub struct UpsertWebhook {
    pub webhook: Webhook,
}

impl Processor<UpsertWebhook> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertWebhook")]
    async fn process(&self, cmd: UpsertWebhook) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO webhooks (name, definition)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE
            SET definition = EXCLUDED.definition, updated_at = NOW()
            "#,
        )
        .bind(cmd.webhook.name.clone())
        .bind(Json(cmd.webhook))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetWebhook {
    pub name: String,
}

impl Processor<GetWebhook> for DatabaseProcessor {
    type Output = Option<Webhook>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetWebhook")]
    async fn process(&self, query: GetWebhook) -> Result<Option<Webhook>, sqlx::Error> {
        let row = sqlx::query_as::<_, WebhookRow>(
            "SELECT name, definition FROM webhooks WHERE name = $1",
        )
        .bind(query.name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.definition.0))
    }
}

#[derive(Debug, Clone)]
pub struct GetAllWebhooks;

impl Processor<GetAllWebhooks> for DatabaseProcessor {
    type Output = Vec<Webhook>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetAllWebhooks")]
    async fn process(&self, _: GetAllWebhooks) -> Result<Vec<Webhook>, sqlx::Error> {
        let rows = sqlx::query_as::<_, WebhookRow>(
            "SELECT name, definition FROM webhooks ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.definition.0).collect())
    }
}

#[derive(Debug, Clone)]
pub struct DeleteWebhook {
    pub name: String,
}

impl Processor<DeleteWebhook> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteWebhook")]
    async fn process(&self, cmd: DeleteWebhook) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhooks WHERE name = $1")
            .bind(cmd.name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
