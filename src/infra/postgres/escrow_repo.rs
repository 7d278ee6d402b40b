use {
    crate::domain::{
        error::EscrowError,
        escrow::{Escrow, EscrowStatus, ReleaseConditions},
        id::{EscrowId, PaymentId, ProjectId, UserId},
        money::{Currency, Money, MoneyAmount},
        ports::{BoxFuture, Cas, EscrowRepository},
    },
    sqlx::{PgPool, Row, postgres::PgRow, types::Json},
    uuid::Uuid,
};

const ESCROW_COLUMNS: &str = "id, payment_id, amount, currency, seller_id, buyer_id, project_id, \
     release_conditions, status, metadata, created_at, updated_at";

#[derive(Clone)]
pub struct PgEscrowRepository {
    pool: PgPool,
}

impl PgEscrowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_id(&self, id: &EscrowId) -> Result<Option<Escrow>, EscrowError> {
        let sql = format!("SELECT {ESCROW_COLUMNS} FROM escrows WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| escrow_from_row(&row))
            .transpose()
    }
}

fn escrow_from_row(row: &PgRow) -> Result<Escrow, EscrowError> {
    let currency: String = row.try_get("currency")?;
    let status: String = row.try_get("status")?;
    let Json(release_conditions): Json<ReleaseConditions> = row.try_get("release_conditions")?;

    Ok(Escrow {
        id: EscrowId::from_uuid(row.try_get::<Uuid, _>("id")?),
        payment_id: PaymentId::new(row.try_get::<String, _>("payment_id")?)?,
        money: Money::new(
            MoneyAmount::new(row.try_get("amount")?)?,
            Currency::try_from(currency.as_str())?,
        ),
        seller_id: UserId::new(row.try_get::<String, _>("seller_id")?)?,
        buyer_id: UserId::new(row.try_get::<String, _>("buyer_id")?)?,
        project_id: ProjectId::new(row.try_get::<String, _>("project_id")?)?,
        release_conditions,
        status: EscrowStatus::try_from(status.as_str())?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl EscrowRepository for PgEscrowRepository {
    fn find<'a>(&'a self, id: &'a EscrowId) -> BoxFuture<'a, Result<Option<Escrow>, EscrowError>> {
        Box::pin(self.find_by_id(id))
    }

    fn find_by_payment<'a>(
        &'a self,
        payment_id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<Option<Escrow>, EscrowError>> {
        Box::pin(async move {
            let sql = format!("SELECT {ESCROW_COLUMNS} FROM escrows WHERE payment_id = $1");
            sqlx::query(&sql)
                .bind(payment_id.as_str())
                .fetch_optional(&self.pool)
                .await?
                .map(|row| escrow_from_row(&row))
                .transpose()
        })
    }

    fn insert<'a>(&'a self, escrow: &'a Escrow) -> BoxFuture<'a, Result<(), EscrowError>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO escrows
                    (id, payment_id, amount, currency, seller_id, buyer_id, project_id,
                     release_conditions, status, metadata, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(escrow.id.as_uuid())
            .bind(escrow.payment_id.as_str())
            .bind(escrow.money.amount().cents())
            .bind(escrow.money.currency().as_str())
            .bind(escrow.seller_id.as_str())
            .bind(escrow.buyer_id.as_str())
            .bind(escrow.project_id.as_str())
            .bind(Json(&escrow.release_conditions))
            .bind(escrow.status.as_str())
            .bind(&escrow.metadata)
            .bind(escrow.created_at)
            .bind(escrow.updated_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                // escrows.payment_id is UNIQUE: the 1:1 invariant lives in the schema.
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    Err(EscrowError::DuplicateEscrow(escrow.payment_id.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn transition<'a>(
        &'a self,
        id: &'a EscrowId,
        expected: EscrowStatus,
        next: EscrowStatus,
    ) -> BoxFuture<'a, Result<Cas<Escrow>, EscrowError>> {
        Box::pin(async move {
            if !expected.can_transition_to(&next) {
                return Err(EscrowError::InvalidTransition(format!("{expected} → {next}")));
            }
            let sql = format!(
                r#"
                UPDATE escrows
                SET status = $3, updated_at = now()
                WHERE id = $1 AND status = $2
                RETURNING {ESCROW_COLUMNS}
                "#
            );
            let row = sqlx::query(&sql)
                .bind(id.as_uuid())
                .bind(expected.as_str())
                .bind(next.as_str())
                .fetch_optional(&self.pool)
                .await?;

            match row {
                Some(row) => Ok(Cas::Applied(escrow_from_row(&row)?)),
                None => Ok(match self.find_by_id(id).await? {
                    Some(current) => Cas::Conflict(current),
                    None => Cas::Missing,
                }),
            }
        })
    }

    fn list_for_user<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, Result<Vec<Escrow>, EscrowError>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {ESCROW_COLUMNS} FROM escrows \
                 WHERE buyer_id = $1 OR seller_id = $1 \
                 ORDER BY created_at DESC, id DESC"
            );
            sqlx::query(&sql)
                .bind(user_id.as_str())
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(escrow_from_row)
                .collect()
        })
    }
}
