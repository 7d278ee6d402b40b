use {
    crate::domain::{
        error::EscrowError,
        escrow::EscrowIntent,
        id::{PaymentId, UserId},
        money::{Currency, Money, MoneyAmount},
        payment::{Payment, PaymentStatus, ProviderUpdate, TransactionRecord},
        ports::{BoxFuture, Cas, PaymentRepository},
    },
    sqlx::{PgPool, Row, postgres::PgRow, types::Json},
};

const PAYMENT_COLUMNS: &str = "id, user_id, amount, currency, status, provider_payment_id, \
     provider_signature, provider_timestamp, raw_provider_response, escrow_intent, \
     created_at, updated_at";

#[derive(Clone)]
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: &str,
    ) -> Result<Option<Payment>, EscrowError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE {clause} = $1");
        sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| payment_from_row(&row))
            .transpose()
    }
}

fn payment_from_row(row: &PgRow) -> Result<Payment, EscrowError> {
    let currency: String = row.try_get("currency")?;
    let status: String = row.try_get("status")?;
    let intent: Option<Json<EscrowIntent>> = row.try_get("escrow_intent")?;

    Ok(Payment {
        id: PaymentId::new(row.try_get::<String, _>("id")?)?,
        money: Money::new(
            MoneyAmount::new(row.try_get("amount")?)?,
            Currency::try_from(currency.as_str())?,
        ),
        status: PaymentStatus::try_from(status.as_str())?,
        provider_payment_id: row.try_get("provider_payment_id")?,
        provider_signature: row.try_get("provider_signature")?,
        provider_timestamp: row.try_get("provider_timestamp")?,
        raw_provider_response: row.try_get("raw_provider_response")?,
        user_id: UserId::new(row.try_get::<String, _>("user_id")?)?,
        escrow_intent: intent.map(|Json(i)| i),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PaymentRepository for PgPaymentRepository {
    fn find<'a>(
        &'a self,
        id: &'a PaymentId,
    ) -> BoxFuture<'a, Result<Option<Payment>, EscrowError>> {
        Box::pin(self.fetch_one_where("id", id.as_str()))
    }

    fn find_by_provider_id<'a>(
        &'a self,
        provider_payment_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Payment>, EscrowError>> {
        Box::pin(self.fetch_one_where("provider_payment_id", provider_payment_id))
    }

    fn insert<'a>(&'a self, payment: &'a Payment) -> BoxFuture<'a, Result<(), EscrowError>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO payments
                    (id, user_id, amount, currency, status, escrow_intent, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(payment.id.as_str())
            .bind(payment.user_id.as_str())
            .bind(payment.money.amount().cents())
            .bind(payment.money.currency().as_str())
            .bind(payment.status.as_str())
            .bind(payment.escrow_intent.as_ref().map(Json))
            .bind(payment.created_at)
            .bind(payment.updated_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(EscrowError::Validation(format!(
                    "payment {} already exists",
                    payment.id
                )));
            }
            Ok(())
        })
    }

    fn transition<'a>(
        &'a self,
        id: &'a PaymentId,
        expected: PaymentStatus,
        update: &'a ProviderUpdate,
    ) -> BoxFuture<'a, Result<Cas<Payment>, EscrowError>> {
        Box::pin(async move {
            // Single statement: the WHERE on status is the compare, the SET the swap.
            let sql = format!(
                r#"
                UPDATE payments
                SET status = $3, provider_payment_id = $4, provider_signature = $5,
                    provider_timestamp = $6, raw_provider_response = $7, updated_at = now()
                WHERE id = $1 AND status = $2
                RETURNING {PAYMENT_COLUMNS}
                "#
            );
            let row = sqlx::query(&sql)
                .bind(id.as_str())
                .bind(expected.as_str())
                .bind(update.status.as_str())
                .bind(update.provider_payment_id.as_deref())
                .bind(&update.provider_signature)
                .bind(update.provider_timestamp)
                .bind(&update.raw_provider_response)
                .fetch_optional(&self.pool)
                .await?;

            match row {
                Some(row) => Ok(Cas::Applied(payment_from_row(&row)?)),
                None => Ok(match self.fetch_one_where("id", id.as_str()).await? {
                    Some(current) => Cas::Conflict(current),
                    None => Cas::Missing,
                }),
            }
        })
    }

    fn record_transaction<'a>(
        &'a self,
        record: &'a TransactionRecord,
    ) -> BoxFuture<'a, Result<bool, EscrowError>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO transactions
                    (id, payment_id, user_id, amount, currency, provider_payment_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (payment_id) DO NOTHING
                "#,
            )
            .bind(record.id)
            .bind(record.payment_id.as_str())
            .bind(record.user_id.as_str())
            .bind(record.money.amount().cents())
            .bind(record.money.currency().as_str())
            .bind(record.provider_payment_id.as_deref())
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected() > 0)
        })
    }
}
