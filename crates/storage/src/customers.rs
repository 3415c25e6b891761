use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use acme_core::types::Customer;

use crate::QueryError;

/// Repository for the `customers` table.
#[derive(Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a customer and returns its generated id.
    pub async fn insert(&self, customer: &NewCustomer) -> Result<String, QueryError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO customers (id, name, email, image_url) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(&customer.name)
            .bind(&customer.email)
            .bind(&customer.image_url)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Lists all customers by name, for invoice form selects.
    pub async fn fetch_all(&self) -> Result<Vec<Customer>, QueryError> {
        let rows = sqlx::query("SELECT id, name FROM customers ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Customer {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    pub async fn count(&self) -> Result<u64, QueryError> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.0.max(0) as u64)
    }

    /// Lists customers whose name or email matches `query`, with invoice totals in cents.
    pub async fn fetch_filtered(&self, query: &str) -> Result<Vec<CustomerTotalsRow>, QueryError> {
        let pattern = format!("%{}%", query.trim());
        let rows = sqlx::query_as::<_, CustomerTotalsRow>(
            r#"
SELECT customers.id,
       customers.name,
       customers.email,
       customers.image_url,
       COUNT(invoices.id) AS total_invoices,
       COALESCE(SUM(CASE WHEN invoices.status = 'pending' THEN invoices.amount ELSE 0 END), 0) AS total_pending,
       COALESCE(SUM(CASE WHEN invoices.status = 'paid' THEN invoices.amount ELSE 0 END), 0) AS total_paid
  FROM customers
  LEFT JOIN invoices ON customers.id = invoices.customer_id
 WHERE customers.name LIKE ?
    OR customers.email LIKE ?
 GROUP BY customers.id, customers.name, customers.email, customers.image_url
 ORDER BY customers.name ASC
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Data required to create a customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub image_url: String,
}

/// Customer with aggregated invoice totals.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerTotalsRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image_url: String,
    pub total_invoices: i64,
    pub total_pending: i64,
    pub total_paid: i64,
}
