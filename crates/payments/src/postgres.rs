use async_trait::async_trait;
use common::{OrderId, PaymentId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{ListPayments, Payment, PaymentError, PaymentRepository, Result};

const PAYMENT_COLUMNS: &str = "id, order_id, user_id, amount, currency, status, method, description, transaction_id, provider, failure_reason, paid_at, created_at, updated_at";

/// PostgreSQL-backed payment repository.
#[derive(Clone)]
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/payments").run(&self.pool).await
    }

    fn row_to_payment(row: &PgRow) -> Result<Payment> {
        let status: String = row.try_get("status")?;
        let method: String = row.try_get("method")?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            status: status.parse()?,
            method: method.parse()?,
            description: row.try_get("description")?,
            transaction_id: row.try_get("transaction_id")?,
            provider: row.try_get("provider")?,
            failure_reason: row.try_get("failure_reason")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn rows_to_payments(rows: &[PgRow]) -> Result<Vec<Payment>> {
        rows.iter().map(Self::row_to_payment).collect()
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, user_id, amount, currency, status, method, description,
                                  transaction_id, provider, failure_reason, paid_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.method.as_str())
        .bind(&payment.description)
        .bind(&payment.transaction_id)
        .bind(&payment.provider)
        .bind(&payment.failure_reason)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("payments_order_id_key")
            {
                return PaymentError::AlreadyExists(payment.order_id);
            }
            PaymentError::Database(e)
        })?;
        Ok(())
    }

    async fn find(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_payment).transpose()
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_payment).transpose()
    }

    async fn find_many(&self, ids: &[PaymentId]) -> Result<Vec<Payment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let uuids: Vec<Uuid> = ids.iter().map(PaymentId::as_uuid).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ANY($1)"
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;
        Self::rows_to_payments(&rows)
    }

    async fn find_by_orders(&self, order_ids: &[OrderId]) -> Result<Vec<Payment>> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        let uuids: Vec<Uuid> = order_ids.iter().map(OrderId::as_uuid).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = ANY($1)"
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;
        Self::rows_to_payments(&rows)
    }

    async fn list(&self, query: &ListPayments) -> Result<(Vec<Payment>, u64)> {
        let mut filter = String::from(" WHERE 1=1");
        let mut param_count = 0;

        if query.user_id.is_some() {
            param_count += 1;
            filter.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if query.status.is_some() {
            param_count += 1;
            filter.push_str(&format!(" AND status = ${param_count}"));
        }

        let count_sql = format!("SELECT COUNT(*) FROM payments{filter}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(user_id) = query.user_id {
            count_query = count_query.bind(user_id.as_uuid());
        }
        if let Some(status) = query.status {
            count_query = count_query.bind(status.as_str());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments{filter} ORDER BY created_at DESC, id DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        );
        let mut page_query = sqlx::query(&page_sql);
        if let Some(user_id) = query.user_id {
            page_query = page_query.bind(user_id.as_uuid());
        }
        if let Some(status) = query.status {
            page_query = page_query.bind(status.as_str());
        }
        let rows = page_query
            .bind(i64::from(query.limit()))
            .bind(i64::from(query.offset()))
            .fetch_all(&self.pool)
            .await?;

        Ok((Self::rows_to_payments(&rows)?, total.max(0) as u64))
    }

    async fn update(&self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, transaction_id = $3, provider = $4, failure_reason = $5,
                paid_at = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.provider)
        .bind(&payment.failure_reason)
        .bind(payment.paid_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PaymentError::NotFound(payment.id));
        }
        Ok(())
    }
}
