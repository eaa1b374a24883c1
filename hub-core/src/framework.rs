use sqlx::PgPool;

/// Executes database queries. Each query is a struct with a
/// `kanau::processor::Processor` impl on this type.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
