use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ContentObjectRow {
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
/// Write an object. Items are immutable, so an existing name keeps its
/// first body.
pub struct PutContentObject {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl Processor<PutContentObject> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:PutContentObject")]
    async fn process(&self, cmd: PutContentObject) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO content_objects (name, content_type, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(cmd.name)
        .bind(cmd.content_type)
        .bind(cmd.data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetContentObject {
    pub name: String,
}

impl Processor<GetContentObject> for DatabaseProcessor {
    type Output = Option<ContentObjectRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetContentObject")]
    async fn process(
        &self,
        query: GetContentObject,
    ) -> Result<Option<ContentObjectRow>, sqlx::Error> {
        sqlx::query_as::<_, ContentObjectRow>(
            "SELECT content_type, data FROM content_objects WHERE name = $1",
        )
        .bind(query.name)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Names under `prefix` strictly after `marker`, ascending, at most
/// `limit` of them.
pub struct ListContentObjectNames {
    pub prefix: String,
    pub marker: Option<String>,
    pub limit: i64,
}

impl Processor<ListContentObjectNames> for DatabaseProcessor {
    type Output = Vec<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListContentObjectNames")]
    async fn process(&self, query: ListContentObjectNames) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT name
            FROM content_objects
            WHERE starts_with(name, $1)
              AND ($2::TEXT IS NULL OR name > $2)
            ORDER BY name COLLATE "C"
            LIMIT $3
            "#,
        )
        .bind(query.prefix)
        .bind(query.marker)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct DeleteContentObject {
    pub name: String,
}

impl Processor<DeleteContentObject> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteContentObject")]
    async fn process(&self, cmd: DeleteContentObject) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM content_objects WHERE name = $1")
            .bind(cmd.name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Delete every object under `prefix` whose name sorts before `before`.
pub struct DeleteContentObjectsBefore {
    pub prefix: String,
    pub before: String,
}

impl Processor<DeleteContentObjectsBefore> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteContentObjectsBefore")]
    async fn process(&self, cmd: DeleteContentObjectsBefore) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM content_objects WHERE starts_with(name, $1) AND name < $2",
        )
        .bind(cmd.prefix)
        .bind(cmd.before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
