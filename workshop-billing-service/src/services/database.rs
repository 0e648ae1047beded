//! PostgreSQL repository for workshop-billing-service.

use super::repository::{DocumentRepository, DuplicateNumber, StaleVersion};
use crate::models::{
    Invoice, InvoiceFilter, InvoiceRow, Page, Pagination, Quotation, QuotationFilter,
    QuotationRow, ServiceRecord, ServiceRecordStatus, ServiceRequest, StatusTally,
};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const QUOTATION_COLUMNS: &str = "id, service_request_id, store_id, customer_id, created_by_id, \
    quotation_number, line_items, tax_rate, subtotal, tax_amount, total, valid_until, status, \
    notes, created_at, updated_at, version";

const INVOICE_COLUMNS: &str = "id, service_record_id, store_id, customer_id, quotation_id, \
    created_by_id, invoice_number, line_items, tax_rate, subtotal, tax_amount, total, paid_amount, \
    payment_status, due_date, paid_date, payments, notes, created_at, updated_at, version";

/// Status as seen at `$1`: open quotations past validity read as expired.
const QUOTATION_EFFECTIVE_STATUS: &str = "CASE WHEN status IN ('draft', 'sent') AND valid_until < $1 \
    THEN 'expired' ELSE status END";

/// Payment status as seen at `$1`, mirroring `models::payment_status`.
const INVOICE_EFFECTIVE_STATUS: &str = "CASE \
    WHEN payment_status = 'cancelled' THEN 'cancelled' \
    WHEN paid_amount >= total THEN 'paid' \
    WHEN paid_amount > 0 THEN 'partial' \
    WHEN due_date < $1 THEN 'overdue' \
    ELSE 'pending' END";

const QUOTATION_NUMBER_CONSTRAINT: &str = "quotations_quotation_number_key";
const INVOICE_NUMBER_CONSTRAINT: &str = "invoices_invoice_number_key";
const INVOICE_QUOTATION_CONSTRAINT: &str = "invoices_quotation_id_unique";

#[derive(FromRow)]
struct ServiceRecordRow {
    id: Uuid,
    service_request_id: Uuid,
    status: String,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "workshop-billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn quotation_exists(&self, id: Uuid) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM quotations WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to check quotation: {}", e))
            })
    }

    async fn invoice_exists(&self, id: Uuid) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM invoices WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check invoice: {}", e)))
    }
}

fn unique_violation(e: &sqlx::Error) -> Option<&str> {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => db_err.constraint(),
        _ => None,
    }
}

#[async_trait]
impl DocumentRepository for Database {
    #[instrument(skip(self), fields(service_request_id = %id))]
    async fn get_service_request(&self, id: Uuid) -> Result<Option<ServiceRequest>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_service_request"])
            .start_timer();

        let request = sqlx::query_as::<_, ServiceRequest>(
            r#"
            SELECT id, customer_id, store_id
            FROM service_requests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get service request: {}", e))
        })?;

        timer.observe_duration();

        Ok(request)
    }

    #[instrument(skip(self), fields(service_record_id = %id))]
    async fn get_service_record(&self, id: Uuid) -> Result<Option<ServiceRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_service_record"])
            .start_timer();

        let row = sqlx::query_as::<_, ServiceRecordRow>(
            r#"
            SELECT id, service_request_id, status
            FROM service_records
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get service record: {}", e))
        })?;

        timer.observe_duration();

        Ok(row.map(|r| ServiceRecord {
            id: r.id,
            service_request_id: r.service_request_id,
            status: ServiceRecordStatus::from_string(&r.status),
        }))
    }

    // -------------------------------------------------------------------------
    // Quotation Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, quotation), fields(quotation_id = %quotation.id, quotation_number = %quotation.quotation_number()))]
    async fn insert_quotation(&self, quotation: &Quotation) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_quotation"])
            .start_timer();

        sqlx::query(&format!(
            "INSERT INTO quotations ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            QUOTATION_COLUMNS
        ))
        .bind(quotation.id)
        .bind(quotation.service_request_id)
        .bind(quotation.store_id)
        .bind(quotation.customer_id)
        .bind(quotation.created_by_id)
        .bind(quotation.quotation_number())
        .bind(Json(quotation.line_items()))
        .bind(quotation.tax_rate())
        .bind(quotation.subtotal())
        .bind(quotation.tax_amount())
        .bind(quotation.total())
        .bind(quotation.valid_until())
        .bind(quotation.status().as_str())
        .bind(quotation.notes())
        .bind(quotation.created_at)
        .bind(quotation.updated_at())
        .bind(quotation.version())
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(QUOTATION_NUMBER_CONSTRAINT) => AppError::Conflict(anyhow::Error::new(
                DuplicateNumber(quotation.quotation_number().to_string()),
            )),
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert quotation: {}", e)),
        })?;

        timer.observe_duration();

        info!("Quotation inserted");

        Ok(())
    }

    #[instrument(skip(self), fields(quotation_id = %id))]
    async fn get_quotation(&self, id: Uuid) -> Result<Option<Quotation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_quotation"])
            .start_timer();

        let row = sqlx::query_as::<_, QuotationRow>(&format!(
            "SELECT {} FROM quotations WHERE id = $1",
            QUOTATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get quotation: {}", e)))?;

        timer.observe_duration();

        row.map(Quotation::try_from).transpose()
    }

    #[instrument(skip(self, quotation), fields(quotation_id = %quotation.id, version = quotation.version()))]
    async fn save_quotation(&self, quotation: &Quotation) -> Result<Quotation, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_quotation"])
            .start_timer();

        let row = sqlx::query_as::<_, QuotationRow>(&format!(
            r#"
            UPDATE quotations
            SET line_items = $3, tax_rate = $4, subtotal = $5, tax_amount = $6, total = $7,
                valid_until = $8, status = $9, notes = $10, updated_at = $11,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            QUOTATION_COLUMNS
        ))
        .bind(quotation.id)
        .bind(quotation.version())
        .bind(Json(quotation.line_items()))
        .bind(quotation.tax_rate())
        .bind(quotation.subtotal())
        .bind(quotation.tax_amount())
        .bind(quotation.total())
        .bind(quotation.valid_until())
        .bind(quotation.status().as_str())
        .bind(quotation.notes())
        .bind(quotation.updated_at())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to save quotation: {}", e)))?;

        timer.observe_duration();

        match row {
            Some(row) => Quotation::try_from(row),
            None if self.quotation_exists(quotation.id).await? => {
                Err(AppError::Conflict(anyhow::Error::new(StaleVersion {
                    id: quotation.id,
                    expected: quotation.version(),
                })))
            }
            None => Err(AppError::NotFound(anyhow::anyhow!(
                "Quotation {} not found",
                quotation.id
            ))),
        }
    }

    #[instrument(skip(self, filter))]
    async fn list_quotations(
        &self,
        filter: &QuotationFilter,
        pagination: Pagination,
        now: DateTime<Utc>,
    ) -> Result<Page<Quotation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_quotations"])
            .start_timer();

        let status_str = filter.status.map(|s| s.as_str().to_string());
        let conditions = format!(
            "($2::uuid IS NULL OR store_id = $2) \
             AND ($3::uuid IS NULL OR customer_id = $3) \
             AND ($4::uuid IS NULL OR service_request_id = $4) \
             AND ($5::varchar IS NULL OR {} = $5)",
            QUOTATION_EFFECTIVE_STATUS
        );

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM quotations WHERE {}",
            conditions
        ))
        .bind(now)
        .bind(filter.store_id)
        .bind(filter.customer_id)
        .bind(filter.service_request_id)
        .bind(&status_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count quotations: {}", e)))?;

        let rows = sqlx::query_as::<_, QuotationRow>(&format!(
            "SELECT {} FROM quotations WHERE {} ORDER BY created_at DESC, id LIMIT $6 OFFSET $7",
            QUOTATION_COLUMNS, conditions
        ))
        .bind(now)
        .bind(filter.store_id)
        .bind(filter.customer_id)
        .bind(filter.service_request_id)
        .bind(&status_str)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list quotations: {}", e)))?;

        timer.observe_duration();

        let items = rows
            .into_iter()
            .map(Quotation::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, pagination, total.max(0) as u64))
    }

    #[instrument(skip(self))]
    async fn find_expirable_quotations(&self, now: DateTime<Utc>) -> Result<Vec<Quotation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_expirable_quotations"])
            .start_timer();

        let rows = sqlx::query_as::<_, QuotationRow>(&format!(
            "SELECT {} FROM quotations \
             WHERE status IN ('draft', 'sent') AND valid_until < $1 \
             ORDER BY valid_until",
            QUOTATION_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to find expirable quotations: {}", e))
        })?;

        timer.observe_duration();

        rows.into_iter().map(Quotation::try_from).collect()
    }

    #[instrument(skip(self), fields(quotation_id = %id))]
    async fn expire_quotation(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["expire_quotation"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE quotations
            SET status = 'expired', updated_at = $2, version = version + 1
            WHERE id = $1 AND status IN ('draft', 'sent') AND valid_until < $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to expire quotation: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, filter))]
    async fn quotation_stats(
        &self,
        filter: &QuotationFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusTally>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["quotation_stats"])
            .start_timer();

        let tallies = sqlx::query_as::<_, StatusTally>(&format!(
            r#"
            SELECT {status} AS status,
                   COUNT(*) AS count,
                   COALESCE(SUM(total), 0) AS amount,
                   0::numeric AS paid
            FROM quotations
            WHERE ($2::uuid IS NULL OR store_id = $2)
              AND ($3::uuid IS NULL OR customer_id = $3)
              AND ($4::uuid IS NULL OR service_request_id = $4)
            GROUP BY 1
            "#,
            status = QUOTATION_EFFECTIVE_STATUS
        ))
        .bind(now)
        .bind(filter.store_id)
        .bind(filter.customer_id)
        .bind(filter.service_request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to tally quotations: {}", e)))?;

        timer.observe_duration();

        Ok(tallies)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id, invoice_number = %invoice.invoice_number()))]
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        sqlx::query(&format!(
            "INSERT INTO invoices ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)",
            INVOICE_COLUMNS
        ))
        .bind(invoice.id)
        .bind(invoice.service_record_id)
        .bind(invoice.store_id)
        .bind(invoice.customer_id)
        .bind(invoice.quotation_id)
        .bind(invoice.created_by_id)
        .bind(invoice.invoice_number())
        .bind(Json(invoice.line_items()))
        .bind(invoice.tax_rate())
        .bind(invoice.subtotal())
        .bind(invoice.tax_amount())
        .bind(invoice.total())
        .bind(invoice.paid_amount())
        .bind(invoice.payment_status().as_str())
        .bind(invoice.due_date())
        .bind(invoice.paid_date())
        .bind(Json(invoice.payments()))
        .bind(invoice.notes())
        .bind(invoice.created_at)
        .bind(invoice.updated_at())
        .bind(invoice.version())
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(INVOICE_NUMBER_CONSTRAINT) => AppError::Conflict(anyhow::Error::new(
                DuplicateNumber(invoice.invoice_number().to_string()),
            )),
            Some(INVOICE_QUOTATION_CONSTRAINT) => AppError::Conflict(anyhow::anyhow!(
                "Quotation {} has already been invoiced",
                invoice.quotation_id.unwrap_or_default()
            )),
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert invoice: {}", e)),
        })?;

        timer.observe_duration();

        info!("Invoice inserted");

        Ok(())
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE id = $1",
            INVOICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        row.map(Invoice::try_from).transpose()
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id, version = invoice.version()))]
    async fn save_invoice(&self, invoice: &Invoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_invoice"])
            .start_timer();

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            UPDATE invoices
            SET paid_amount = $3, payment_status = $4, paid_date = $5, payments = $6,
                notes = $7, updated_at = $8, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(invoice.id)
        .bind(invoice.version())
        .bind(invoice.paid_amount())
        .bind(invoice.payment_status().as_str())
        .bind(invoice.paid_date())
        .bind(Json(invoice.payments()))
        .bind(invoice.notes())
        .bind(invoice.updated_at())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to save invoice: {}", e)))?;

        timer.observe_duration();

        match row {
            Some(row) => Invoice::try_from(row),
            None if self.invoice_exists(invoice.id).await? => {
                Err(AppError::Conflict(anyhow::Error::new(StaleVersion {
                    id: invoice.id,
                    expected: invoice.version(),
                })))
            }
            None => Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice {} not found",
                invoice.id
            ))),
        }
    }

    #[instrument(skip(self, filter))]
    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        pagination: Pagination,
        now: DateTime<Utc>,
    ) -> Result<Page<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let status_str = filter.payment_status.map(|s| s.as_str().to_string());
        let conditions = format!(
            "($2::uuid IS NULL OR store_id = $2) \
             AND ($3::uuid IS NULL OR customer_id = $3) \
             AND ($4::uuid IS NULL OR service_record_id = $4) \
             AND ($5::varchar IS NULL OR {} = $5)",
            INVOICE_EFFECTIVE_STATUS
        );

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM invoices WHERE {}",
            conditions
        ))
        .bind(now)
        .bind(filter.store_id)
        .bind(filter.customer_id)
        .bind(filter.service_record_id)
        .bind(&status_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count invoices: {}", e)))?;

        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE {} ORDER BY created_at DESC, id LIMIT $6 OFFSET $7",
            INVOICE_COLUMNS, conditions
        ))
        .bind(now)
        .bind(filter.store_id)
        .bind(filter.customer_id)
        .bind(filter.service_record_id)
        .bind(&status_str)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        let items = rows
            .into_iter()
            .map(Invoice::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, pagination, total.max(0) as u64))
    }

    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    async fn find_invoice_by_quotation(&self, quotation_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoice_by_quotation"])
            .start_timer();

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE quotation_id = $1 LIMIT 1",
            INVOICE_COLUMNS
        ))
        .bind(quotation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to find invoice by quotation: {}", e))
        })?;

        timer.observe_duration();

        row.map(Invoice::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_overdue_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_overdue_candidates"])
            .start_timer();

        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices \
             WHERE payment_status = 'pending' AND paid_amount = 0 AND due_date < $1 \
             ORDER BY due_date",
            INVOICE_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to find overdue invoices: {}", e))
        })?;

        timer.observe_duration();

        rows.into_iter().map(Invoice::try_from).collect()
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn mark_invoice_overdue(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_invoice_overdue"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET payment_status = 'overdue', updated_at = $2, version = version + 1
            WHERE id = $1 AND payment_status = 'pending' AND paid_amount = 0
              AND paid_amount < total AND due_date < $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark invoice overdue: {}", e))
        })?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, filter))]
    async fn invoice_stats(
        &self,
        filter: &InvoiceFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusTally>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["invoice_stats"])
            .start_timer();

        let tallies = sqlx::query_as::<_, StatusTally>(&format!(
            r#"
            SELECT {status} AS status,
                   COUNT(*) AS count,
                   COALESCE(SUM(total), 0) AS amount,
                   COALESCE(SUM(paid_amount), 0) AS paid
            FROM invoices
            WHERE ($2::uuid IS NULL OR store_id = $2)
              AND ($3::uuid IS NULL OR customer_id = $3)
              AND ($4::uuid IS NULL OR service_record_id = $4)
            GROUP BY 1
            "#,
            status = INVOICE_EFFECTIVE_STATUS
        ))
        .bind(now)
        .bind(filter.store_id)
        .bind(filter.customer_id)
        .bind(filter.service_record_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to tally invoices: {}", e)))?;

        timer.observe_duration();

        Ok(tallies)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}
