use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use acme_core::pagination::{total_pages, ITEMS_PER_PAGE};
use acme_core::types::{Cents, Invoice, InvoiceChanges, InvoiceStatus, InvoiceWrite, NewInvoice};

use crate::QueryError;

/// Repository for the `invoices` table.
#[derive(Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Runs one write statement and returns the id of the invoice it touched.
    pub async fn execute(&self, write: &InvoiceWrite) -> Result<String, InvoiceWriteError> {
        match write {
            InvoiceWrite::Insert(invoice) => self.insert(invoice).await,
            InvoiceWrite::Update { id, changes } => {
                self.update(id, changes).await?;
                Ok(id.clone())
            }
            InvoiceWrite::Delete { id } => {
                self.delete(id).await?;
                Ok(id.clone())
            }
        }
    }

    /// Inserts a new invoice under a freshly generated id.
    pub async fn insert(&self, invoice: &NewInvoice) -> Result<String, InvoiceWriteError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO invoices (id, customer_id, amount, status, date) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&invoice.customer_id)
        .bind(invoice.amount.get())
        .bind(invoice.status.as_str())
        .bind(invoice.issue_date)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(id)
    }

    /// Replaces customer, amount and status of an existing invoice. The issue date is kept.
    pub async fn update(
        &self,
        id: &str,
        changes: &InvoiceChanges,
    ) -> Result<(), InvoiceWriteError> {
        let result = sqlx::query(
            "UPDATE invoices SET customer_id = ?, amount = ?, status = ? WHERE id = ?",
        )
        .bind(&changes.customer_id)
        .bind(changes.amount.get())
        .bind(changes.status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(InvoiceWriteError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Deletes an invoice by id.
    pub async fn delete(&self, id: &str) -> Result<(), InvoiceWriteError> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(InvoiceWriteError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Loads one invoice for the edit form.
    pub async fn fetch_by_id(&self, id: &str) -> Result<Option<Invoice>, QueryError> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            "SELECT id, customer_id, amount, status, date FROM invoices WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(InvoiceRow::into_domain).transpose()
    }

    /// Lists the most recent invoices joined with their customer.
    pub async fn fetch_latest(&self, limit: u32) -> Result<Vec<LatestInvoiceRow>, QueryError> {
        let rows = sqlx::query_as::<_, LatestInvoiceRow>(
            r#"
SELECT invoices.id,
       invoices.amount,
       customers.name,
       customers.email,
       customers.image_url
  FROM invoices
  JOIN customers ON invoices.customer_id = customers.id
 ORDER BY invoices.date DESC, invoices.id ASC
 LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Lists one page of invoices matching `query` against customer, amount, date or status.
    pub async fn fetch_filtered(
        &self,
        query: &str,
        page: u32,
    ) -> Result<Vec<InvoiceTableRow>, QueryError> {
        let pattern = like_pattern(query);
        let offset = i64::from(page.saturating_sub(1)) * i64::from(ITEMS_PER_PAGE);
        let rows = sqlx::query_as::<_, InvoiceTableRow>(
            r#"
SELECT invoices.id,
       invoices.customer_id,
       invoices.amount,
       invoices.date,
       invoices.status,
       customers.name,
       customers.email,
       customers.image_url
  FROM invoices
  JOIN customers ON invoices.customer_id = customers.id
 WHERE customers.name LIKE ?
    OR customers.email LIKE ?
    OR CAST(invoices.amount AS TEXT) LIKE ?
    OR invoices.date LIKE ?
    OR invoices.status LIKE ?
 ORDER BY invoices.date DESC, invoices.id ASC
 LIMIT ? OFFSET ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(i64::from(ITEMS_PER_PAGE))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Returns how many pages [`Self::fetch_filtered`] can produce for `query`.
    pub async fn count_pages(&self, query: &str) -> Result<u32, QueryError> {
        let pattern = like_pattern(query);
        let row = sqlx::query(
            r#"
SELECT COUNT(*) AS total
  FROM invoices
  JOIN customers ON invoices.customer_id = customers.id
 WHERE customers.name LIKE ?
    OR customers.email LIKE ?
    OR CAST(invoices.amount AS TEXT) LIKE ?
    OR invoices.date LIKE ?
    OR invoices.status LIKE ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.get("total");
        Ok(total_pages(total.max(0) as u64, ITEMS_PER_PAGE))
    }

    /// Aggregates invoice count and paid/pending totals for the dashboard cards.
    pub async fn summary(&self) -> Result<InvoiceSummary, QueryError> {
        let row = sqlx::query(
            r#"
SELECT COUNT(*) AS invoice_count,
       COALESCE(SUM(CASE WHEN status = 'paid' THEN amount ELSE 0 END), 0) AS paid,
       COALESCE(SUM(CASE WHEN status = 'pending' THEN amount ELSE 0 END), 0) AS pending
  FROM invoices
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let invoice_count: i64 = row.get("invoice_count");
        Ok(InvoiceSummary {
            invoice_count: invoice_count.max(0) as u64,
            paid_total: row.get("paid"),
            pending_total: row.get("pending"),
        })
    }
}

fn like_pattern(query: &str) -> String {
    format!("%{}%", query.trim())
}

fn map_write_error(err: sqlx::Error) -> InvoiceWriteError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|code| code.into_owned());
            match code.as_deref() {
                Some("787") => InvoiceWriteError::UnknownCustomer,
                Some("275") => InvoiceWriteError::Constraint(db_err.message().to_string()),
                _ => InvoiceWriteError::Database(sqlx::Error::Database(db_err)),
            }
        }
        other => InvoiceWriteError::Database(other),
    }
}

/// Errors that can occur while writing invoices.
#[derive(Debug, Error)]
pub enum InvoiceWriteError {
    #[error("no invoice with id {0}")]
    NotFound(String),
    #[error("customer does not exist")]
    UnknownCustomer,
    #[error("invoice violates a table constraint: {0}")]
    Constraint(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    customer_id: String,
    amount: i64,
    status: String,
    date: NaiveDate,
}

impl InvoiceRow {
    fn into_domain(self) -> Result<Invoice, QueryError> {
        let status: InvoiceStatus = self
            .status
            .parse()
            .map_err(|err| QueryError::Malformed(format!("invoice {}: {err}", self.id)))?;
        let amount = Cents::try_from(self.amount)
            .map_err(|err| QueryError::Malformed(format!("invoice {}: {err}", self.id)))?;
        Ok(Invoice {
            id: self.id,
            customer_id: self.customer_id,
            amount,
            status,
            issue_date: self.date,
        })
    }
}

/// Recent invoice joined with its customer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LatestInvoiceRow {
    pub id: String,
    pub amount: i64,
    pub name: String,
    pub email: String,
    pub image_url: String,
}

/// Invoice table row joined with its customer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceTableRow {
    pub id: String,
    pub customer_id: String,
    pub amount: i64,
    pub date: NaiveDate,
    pub status: String,
    pub name: String,
    pub email: String,
    pub image_url: String,
}

/// Totals shown on the dashboard cards, amounts in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceSummary {
    pub invoice_count: u64,
    pub paid_total: i64,
    pub pending_total: i64,
}
