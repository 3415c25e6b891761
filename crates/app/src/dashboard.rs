use axum::{
    extract::{Query, State},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};

use acme_core::money::format_currency;
use acme_storage::{CustomerTotalsRow, LatestInvoiceRow};

use crate::problem::{load_failed, ProblemResponse};
use crate::router::AppState;

const LATEST_INVOICES: u32 = 5;

#[derive(Debug, Serialize)]
pub struct Card {
    title: &'static str,
    kind: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
pub struct LatestInvoiceView {
    id: String,
    name: String,
    email: String,
    image_url: String,
    amount: String,
}

impl From<LatestInvoiceRow> for LatestInvoiceView {
    fn from(row: LatestInvoiceRow) -> Self {
        Self {
            amount: format_currency(row.amount),
            id: row.id,
            name: row.name,
            email: row.email,
            image_url: row.image_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardOverview {
    cards: Vec<Card>,
    latest_invoices: Vec<LatestInvoiceView>,
}

/// `GET /dashboard`
pub async fn overview(
    State(state): State<AppState>,
) -> Result<Json<DashboardOverview>, ProblemResponse> {
    counter!("page_requests_total", "page" => "dashboard").increment(1);
    let invoices = state.storage().invoices();
    let customers = state.storage().customers();
    let (summary, customer_count, latest) = tokio::try_join!(
        invoices.summary(),
        customers.count(),
        invoices.fetch_latest(LATEST_INVOICES)
    )
    .map_err(|err| load_failed("dashboard", err))?;

    let cards = vec![
        Card {
            title: "Collected",
            kind: "collected",
            value: format_currency(summary.paid_total),
        },
        Card {
            title: "Pending",
            kind: "pending",
            value: format_currency(summary.pending_total),
        },
        Card {
            title: "Total Invoices",
            kind: "invoices",
            value: summary.invoice_count.to_string(),
        },
        Card {
            title: "Total Customers",
            kind: "customers",
            value: customer_count.to_string(),
        },
    ];

    Ok(Json(DashboardOverview {
        cards,
        latest_invoices: latest.into_iter().map(LatestInvoiceView::from).collect(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    #[serde(default)]
    query: String,
}

#[derive(Debug, Serialize)]
pub struct CustomerView {
    id: String,
    name: String,
    email: String,
    image_url: String,
    total_invoices: i64,
    total_pending: String,
    total_paid: String,
}

impl From<CustomerTotalsRow> for CustomerView {
    fn from(row: CustomerTotalsRow) -> Self {
        Self {
            total_pending: format_currency(row.total_pending),
            total_paid: format_currency(row.total_paid),
            id: row.id,
            name: row.name,
            email: row.email,
            image_url: row.image_url,
            total_invoices: row.total_invoices,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomersPage {
    query: String,
    customers: Vec<CustomerView>,
}

/// `GET /dashboard/customers`
pub async fn customers(
    State(state): State<AppState>,
    Query(query): Query<CustomerQuery>,
) -> Result<Json<CustomersPage>, ProblemResponse> {
    counter!("page_requests_total", "page" => "customers").increment(1);
    let search = query.query.trim().to_string();
    let rows = state
        .storage()
        .customers()
        .fetch_filtered(&search)
        .await
        .map_err(|err| load_failed("customers", err))?;

    Ok(Json(CustomersPage {
        query: search,
        customers: rows.into_iter().map(CustomerView::from).collect(),
    }))
}
