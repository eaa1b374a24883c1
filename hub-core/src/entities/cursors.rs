use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone)]
/// Store a cursor unless one already exists. Returns whether it was
/// inserted.
pub struct InsertCursorIfAbsent {
    pub name: String,
    pub kind: &'static str,
    pub content_key: String,
}

impl Processor<InsertCursorIfAbsent> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertCursorIfAbsent")]
    async fn process(&self, cmd: InsertCursorIfAbsent) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO cursors (name, kind, content_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (name, kind) DO NOTHING
            "#,
        )
        .bind(cmd.name)
        .bind(cmd.kind)
        .bind(cmd.content_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct UpsertCursor {
    pub name: String,
    pub kind: &'static str,
    pub content_key: String,
}

impl Processor<UpsertCursor> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertCursor")]
    async fn process(&self, cmd: UpsertCursor) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO cursors (name, kind, content_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (name, kind) DO UPDATE
            SET content_key = EXCLUDED.content_key, updated_at = NOW()
            "#,
        )
        .bind(cmd.name)
        .bind(cmd.kind)
        .bind(cmd.content_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// The encoded key stored for a cursor.
pub struct GetCursor {
    pub name: String,
    pub kind: &'static str,
}

impl Processor<GetCursor> for DatabaseProcessor {
    type Output = Option<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetCursor")]
    async fn process(&self, query: GetCursor) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT content_key FROM cursors WHERE name = $1 AND kind = $2",
        )
        .bind(query.name)
        .bind(query.kind)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct DeleteCursor {
    pub name: String,
    pub kind: &'static str,
}

impl Processor<DeleteCursor> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteCursor")]
    async fn process(&self, cmd: DeleteCursor) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cursors WHERE name = $1 AND kind = $2")
            .bind(cmd.name)
            .bind(cmd.kind)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
