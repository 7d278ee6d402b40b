use {
    crate::domain::{
        audit::NewAuditEntry,
        error::EscrowError,
        ports::{AuditLogger, BoxFuture},
    },
    sqlx::PgPool,
};

#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditLogger for PgAuditLog {
    fn record<'a>(&'a self, entry: &'a NewAuditEntry) -> BoxFuture<'a, Result<(), EscrowError>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO audit_log (id, entity_type, entity_id, action, actor, detail, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(entry.id)
            .bind(&entry.entity_type)
            .bind(&entry.entity_id)
            .bind(&entry.action)
            .bind(&entry.actor)
            .bind(&entry.detail)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }
}
