use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use acme_core::form::{Field, FormFields, FormResult, Submission, INVOICE_LIST_PATH};
use acme_core::money::{format_currency, format_major_units};
use acme_core::pagination::{generate_pagination, PageItem};
use acme_core::types::Customer;
use acme_storage::InvoiceTableRow;

use crate::problem::{load_failed, ProblemResponse};
use crate::router::AppState;

pub const INVOICE_NOT_FOUND: &str = "Could not find the requested invoice.";
pub const VIEW_CACHE_HEADER: &str = "x-view-cache";

#[derive(Debug, Clone, Serialize)]
pub struct Breadcrumb {
    label: &'static str,
    href: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    active: bool,
}

fn invoice_breadcrumbs(label: &'static str, href: String) -> Vec<Breadcrumb> {
    vec![
        Breadcrumb {
            label: "Invoices",
            href: INVOICE_LIST_PATH.to_string(),
            active: false,
        },
        Breadcrumb {
            label,
            href,
            active: true,
        },
    ]
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    query: String,
    #[serde(default)]
    page: Option<String>,
}

impl ListQuery {
    fn search(&self) -> &str {
        self.query.trim()
    }

    /// Missing, malformed or zero page numbers fall back to the first page.
    fn page(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|page| *page > 0)
            .unwrap_or(1)
    }
}

#[derive(Debug, Serialize)]
struct InvoiceListView {
    query: String,
    current_page: u32,
    total_pages: u32,
    pagination: Vec<PageItem>,
    invoices: Vec<InvoiceRowView>,
}

#[derive(Debug, Serialize)]
struct InvoiceRowView {
    id: String,
    customer_id: String,
    name: String,
    email: String,
    image_url: String,
    amount: String,
    date: String,
    status: String,
}

impl From<InvoiceTableRow> for InvoiceRowView {
    fn from(row: InvoiceTableRow) -> Self {
        Self {
            amount: format_currency(row.amount),
            date: row.date.format("%b %-d, %Y").to_string(),
            id: row.id,
            customer_id: row.customer_id,
            name: row.name,
            email: row.email,
            image_url: row.image_url,
            status: row.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceFormView {
    id: String,
    customer_id: String,
    amount: String,
    status: &'static str,
    date: String,
}

fn cache_header(mut response: Response, status: &'static str) -> Response {
    response
        .headers_mut()
        .insert(VIEW_CACHE_HEADER, HeaderValue::from_static(status));
    response
}

/// `GET /dashboard/invoices`, served through the view cache.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ProblemResponse> {
    counter!("page_requests_total", "page" => "invoices").increment(1);
    let search = query.search().to_string();
    let page = query.page();
    let variant = format!("query={search}&page={page}");

    if let Some(cached) = state.views().get(INVOICE_LIST_PATH, &variant).await {
        let body: Value = (*cached).clone();
        return Ok(cache_header(Json(body).into_response(), "hit"));
    }

    let generation = state.views().generation(INVOICE_LIST_PATH).await;
    let invoices = state.storage().invoices();
    let (rows, total_pages) = tokio::try_join!(
        invoices.fetch_filtered(&search, page),
        invoices.count_pages(&search)
    )
    .map_err(|err| load_failed("invoices", err))?;

    let view = InvoiceListView {
        query: search,
        current_page: page,
        total_pages,
        pagination: generate_pagination(page, total_pages),
        invoices: rows.into_iter().map(InvoiceRowView::from).collect(),
    };
    let body = serde_json::to_value(&view).map_err(|err| {
        error!(stage = "page", page = "invoices", error = %err, "failed to serialize view");
        ProblemResponse::internal("page_render_failed")
    })?;

    state
        .views()
        .store(INVOICE_LIST_PATH, &variant, generation, body.clone())
        .await;
    Ok(cache_header(Json(body).into_response(), "miss"))
}

#[derive(Debug, Serialize)]
pub struct CreateInvoicePage {
    breadcrumbs: Vec<Breadcrumb>,
    customers: Vec<Customer>,
    form: FormResult,
}

pub async fn create_page(
    State(state): State<AppState>,
) -> Result<Json<CreateInvoicePage>, ProblemResponse> {
    counter!("page_requests_total", "page" => "create_invoice").increment(1);
    let customers = state
        .storage()
        .customers()
        .fetch_all()
        .await
        .map_err(|err| load_failed("create_invoice", err))?;

    Ok(Json(CreateInvoicePage {
        breadcrumbs: invoice_breadcrumbs(
            "Create Invoice",
            format!("{INVOICE_LIST_PATH}/create"),
        ),
        customers,
        form: FormResult::Pristine,
    }))
}

#[derive(Debug, Serialize)]
pub struct EditInvoicePage {
    breadcrumbs: Vec<Breadcrumb>,
    invoice: InvoiceFormView,
    customers: Vec<Customer>,
    form: FormResult,
}

pub async fn edit_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EditInvoicePage>, ProblemResponse> {
    counter!("page_requests_total", "page" => "edit_invoice").increment(1);
    let invoices = state.storage().invoices();
    let customers = state.storage().customers();
    let (invoice, customers) = tokio::try_join!(invoices.fetch_by_id(&id), customers.fetch_all())
        .map_err(|err| load_failed("edit_invoice", err))?;

    let Some(invoice) = invoice else {
        return Err(ProblemResponse::new(
            StatusCode::NOT_FOUND,
            "invoice_not_found",
            INVOICE_NOT_FOUND,
        ));
    };

    Ok(Json(EditInvoicePage {
        breadcrumbs: invoice_breadcrumbs(
            "Edit Invoice",
            format!("{INVOICE_LIST_PATH}/{id}/edit"),
        ),
        invoice: InvoiceFormView {
            id: invoice.id,
            customer_id: invoice.customer_id,
            amount: format_major_units(invoice.amount.get()),
            status: invoice.status.as_str(),
            date: invoice.issue_date.to_string(),
        },
        customers,
        form: FormResult::Pristine,
    }))
}

/// `POST /dashboard/invoices`
pub async fn create(State(state): State<AppState>, Form(fields): Form<FormFields>) -> Response {
    let outcome = state
        .mutations()
        .create_invoice(&FormResult::Pristine, &fields)
        .await;
    submission_response(outcome)
}

/// `POST /dashboard/invoices/:id/edit`; the path segment is the invoice id.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(mut fields): Form<FormFields>,
) -> Response {
    fields.insert(Field::Id.as_str(), id);
    let outcome = state
        .mutations()
        .update_invoice(&FormResult::Pristine, &fields)
        .await;
    submission_response(outcome)
}

/// `POST /dashboard/invoices/:id/delete`
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.mutations().delete_invoice(&id).await {
        Ok(navigation) => Redirect::to(navigation.location()).into_response(),
        Err(_) => ProblemResponse::internal("invoice_delete_failed").into_response(),
    }
}

/// Maps a form outcome onto HTTP: navigation becomes `303 See Other`, a
/// rejected form is echoed back as JSON.
pub fn submission_response(outcome: Submission) -> Response {
    match outcome {
        Submission::Redirect(navigation) => Redirect::to(navigation.location()).into_response(),
        Submission::Rejected(result) => {
            let status = match result {
                FormResult::Invalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                FormResult::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                FormResult::Pristine => StatusCode::OK,
            };
            (status, Json(result)).into_response()
        }
    }
}
