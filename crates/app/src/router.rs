use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    middleware,
    response::{sse::Sse, IntoResponse},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;

use acme_storage::Database;
use acme_util::AppConfig;

use crate::mutation::{Clock, InvoiceMutations};
use crate::session::{self, Credentials, SessionKeys};
use crate::tap::{parse_stage_list, tap_keep_alive, tap_stream, TapFilter, TapHub};
use crate::views::ViewCache;
use crate::{dashboard, invoices, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    tap: TapHub,
    storage: Database,
    views: ViewCache,
    mutations: InvoiceMutations,
    sessions: SessionKeys,
    credentials: Credentials,
    clock: Clock,
    timezone: chrono_tz::Tz,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        tap: TapHub,
        storage: Database,
        config: &AppConfig,
    ) -> Self {
        let clock: Clock = Arc::new(Utc::now);
        let views = ViewCache::new();
        let mutations = build_mutations(&storage, &views, &tap, clock.clone(), config.timezone);
        Self {
            metrics,
            tap,
            storage,
            views,
            mutations,
            sessions: SessionKeys::new(
                &config.session_secret,
                config.session_ttl,
                config.environment.is_production(),
            ),
            credentials: Credentials::new(
                config.admin_username.clone(),
                config.admin_password.clone(),
            ),
            clock,
            timezone: config.timezone,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.mutations = build_mutations(
            &self.storage,
            &self.views,
            &self.tap,
            clock.clone(),
            self.timezone,
        );
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn tap(&self) -> &TapHub {
        &self.tap
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn views(&self) -> &ViewCache {
        &self.views
    }

    pub fn mutations(&self) -> &InvoiceMutations {
        &self.mutations
    }

    pub fn sessions(&self) -> &SessionKeys {
        &self.sessions
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

fn build_mutations(
    storage: &Database,
    views: &ViewCache,
    tap: &TapHub,
    clock: Clock,
    timezone: chrono_tz::Tz,
) -> InvoiceMutations {
    InvoiceMutations::new(
        Arc::new(storage.invoices()),
        Arc::new(views.clone()),
        tap.clone(),
        clock,
        timezone,
    )
}

pub fn app_router(state: AppState) -> Router {
    let dashboard = Router::new()
        .route("/dashboard", get(dashboard::overview))
        .route("/dashboard/customers", get(dashboard::customers))
        .route(
            "/dashboard/invoices",
            get(invoices::list).post(invoices::create),
        )
        .route("/dashboard/invoices/create", get(invoices::create_page))
        .route(
            "/dashboard/invoices/:id/edit",
            get(invoices::edit_page).post(invoices::update),
        )
        .route("/dashboard/invoices/:id/delete", post(invoices::delete))
        .route("/_debug/tap", get(debug_tap))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_session,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/", get(session::home))
        .route("/login", get(session::login_page).post(session::login))
        .route("/logout", post(session::logout))
        .merge(dashboard)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[derive(Debug, Deserialize)]
struct TapQuery {
    #[serde(default)]
    s: Option<String>,
}

async fn debug_tap(
    State(state): State<AppState>,
    Query(query): Query<TapQuery>,
) -> Result<
    Sse<impl tokio_stream::Stream<Item = Result<axum::response::sse::Event, serde_json::Error>>>,
    (StatusCode, String),
> {
    let stages =
        parse_stage_list(query.s.as_deref()).map_err(|err| (StatusCode::BAD_REQUEST, err))?;
    let stream = tap_stream(state.tap(), TapFilter::from_stages(stages));

    Ok(Sse::new(stream).keep_alive(tap_keep_alive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, Response},
    };
    use chrono::{NaiveDate, TimeZone};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;
    use tokio::time::{self, Duration};
    use tower::ServiceExt;

    use acme_core::types::InvoiceStatus;
    use acme_storage::NewCustomer;
    use acme_util::Environment;

    use crate::invoices::VIEW_CACHE_HEADER;
    use crate::problem::GENERIC_FAILURE;
    use crate::tap::{StageEvent, StageKind};

    struct TestApp {
        state: AppState,
        router: Router,
        customer_id: String,
        _dir: TempDir,
    }

    fn test_config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".parse().expect("addr"),
            environment: Environment::Test,
            database_url: String::new(),
            timezone: chrono_tz::UTC,
            session_secret: b"test-session-secret".to_vec(),
            session_ttl: StdDuration::from_secs(3600),
            admin_username: "admin".to_string(),
            admin_password: "password".to_string(),
        }
    }

    async fn setup() -> TestApp {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}/test.db?mode=rwc", dir.path().display());
        let database = Database::connect(&url).await.expect("connect");
        database.run_migrations().await.expect("migrations");

        let customer_id = database
            .customers()
            .insert(&NewCustomer {
                name: "Lee Robinson".to_string(),
                email: "lee@robinson.com".to_string(),
                image_url: "/customers/lee-robinson.png".to_string(),
            })
            .await
            .expect("customer");

        let state = AppState::new(metrics, TapHub::new(), database, &test_config())
            .with_clock(Arc::new(|| Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
        TestApp {
            router: app_router(state.clone()),
            state,
            customer_id,
            _dir: dir,
        }
    }

    async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
        app.router
            .clone()
            .oneshot(request)
            .await
            .expect("handler should respond")
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn form_request(uri: &str, cookie: Option<&str>, pairs: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = serde_urlencoded::to_string(pairs).expect("encode form");
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn location(response: &Response<Body>) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .expect("location header")
    }

    async fn login(app: &TestApp) -> String {
        let response = send(
            app,
            form_request(
                "/login",
                None,
                &[("username", "admin"), ("password", "password")],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard");
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .expect("session cookie");
        assert!(set_cookie.contains("HttpOnly"));
        set_cookie
            .split(';')
            .next()
            .expect("cookie pair")
            .to_string()
    }

    async fn create_invoice(app: &TestApp, cookie: &str, amount: &str) {
        let response = send(
            app,
            form_request(
                "/dashboard/invoices",
                Some(cookie),
                &[
                    ("customerId", app.customer_id.as_str()),
                    ("amount", amount),
                    ("status", "pending"),
                ],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard/invoices");
    }

    async fn first_listed_invoice(app: &TestApp, cookie: &str) -> Value {
        let response = send(app, get_request("/dashboard/invoices", Some(cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        body["invoices"][0].clone()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = setup().await;
        let response = send(&app, get_request("/healthz", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let app = setup().await;
        let response = send(&app, get_request("/metrics", None)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        let body = String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8");
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn dashboard_requires_session() {
        let app = setup().await;

        let response = send(&app, get_request("/dashboard/invoices", None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");

        let forged = send(
            &app,
            get_request("/dashboard", Some("acme_session=not-a-token")),
        )
        .await;
        assert_eq!(forged.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&forged), "/login");
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let app = setup().await;
        let response = send(
            &app,
            form_request(
                "/login",
                None,
                &[("username", "admin"), ("password", "nope")],
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Invalid credentials.");
    }

    #[tokio::test]
    async fn signed_in_home_redirects_to_dashboard() {
        let app = setup().await;
        let cookie = login(&app).await;

        let response = send(&app, get_request("/", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard");

        let anonymous = send(&app, get_request("/", None)).await;
        assert_eq!(anonymous.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_redirects_and_refreshes_cached_list() {
        let app = setup().await;
        let cookie = login(&app).await;

        let first = send(&app, get_request("/dashboard/invoices", Some(&cookie))).await;
        assert_eq!(first.headers().get(VIEW_CACHE_HEADER).unwrap(), "miss");
        let second = send(&app, get_request("/dashboard/invoices", Some(&cookie))).await;
        assert_eq!(second.headers().get(VIEW_CACHE_HEADER).unwrap(), "hit");
        assert_eq!(json_body(second).await["invoices"], Value::Array(Vec::new()));

        create_invoice(&app, &cookie, "19.99").await;

        let refreshed = send(&app, get_request("/dashboard/invoices", Some(&cookie))).await;
        assert_eq!(refreshed.headers().get(VIEW_CACHE_HEADER).unwrap(), "miss");
        let body = json_body(refreshed).await;
        assert_eq!(body["total_pages"], 1);
        assert_eq!(body["invoices"][0]["amount"], "$19.99");
        assert_eq!(body["invoices"][0]["date"], "Mar 1, 2024");
        assert_eq!(body["invoices"][0]["status"], "pending");
        assert_eq!(body["invoices"][0]["name"], "Lee Robinson");
    }

    #[tokio::test]
    async fn invalid_create_is_unprocessable_and_writes_nothing() {
        let app = setup().await;
        let cookie = login(&app).await;

        let response = send(
            &app,
            form_request(
                "/dashboard/invoices",
                Some(&cookie),
                &[("customerId", ""), ("amount", "-4"), ("status", "paid")],
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["state"], "invalid");
        assert_eq!(body["message"], "Validation failed. Failed to create invoice.");
        assert_eq!(body["errors"]["customerId"], "Customer is required");
        assert_eq!(body["errors"]["amount"], "Amount must be greater than 0");
        assert_eq!(body["values"]["amount"], "-4");

        let summary = app.state.storage().invoices().summary().await.expect("summary");
        assert_eq!(summary.invoice_count, 0);
    }

    #[tokio::test]
    async fn create_for_unknown_customer_fails_generically() {
        let app = setup().await;
        let cookie = login(&app).await;

        let response = send(
            &app,
            form_request(
                "/dashboard/invoices",
                Some(&cookie),
                &[("customerId", "missing"), ("amount", "10"), ("status", "paid")],
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["state"], "failed");
        assert_eq!(body["message"], "Failed to create invoice. Please try again.");
    }

    #[tokio::test]
    async fn edit_page_reports_missing_invoice() {
        let app = setup().await;
        let cookie = login(&app).await;

        let response = send(
            &app,
            get_request("/dashboard/invoices/does-not-exist/edit", Some(&cookie)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Could not find the requested invoice.");
    }

    #[tokio::test]
    async fn update_replaces_columns_but_keeps_issue_date() {
        let app = setup().await;
        let cookie = login(&app).await;
        create_invoice(&app, &cookie, "19.99").await;
        let id = first_listed_invoice(&app, &cookie).await["id"]
            .as_str()
            .expect("invoice id")
            .to_string();

        let edit = send(
            &app,
            get_request(&format!("/dashboard/invoices/{id}/edit"), Some(&cookie)),
        )
        .await;
        assert_eq!(edit.status(), StatusCode::OK);
        let edit_body = json_body(edit).await;
        assert_eq!(edit_body["invoice"]["amount"], "19.99");
        assert_eq!(edit_body["customers"][0]["name"], "Lee Robinson");

        let response = send(
            &app,
            form_request(
                &format!("/dashboard/invoices/{id}/edit"),
                Some(&cookie),
                &[
                    ("customerId", app.customer_id.as_str()),
                    ("amount", "25"),
                    ("status", "paid"),
                ],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard/invoices");

        let stored = app
            .state
            .storage()
            .invoices()
            .fetch_by_id(&id)
            .await
            .expect("query")
            .expect("invoice");
        assert_eq!(stored.amount.get(), 2500);
        assert_eq!(stored.status, InvoiceStatus::Paid);
        assert_eq!(stored.issue_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[tokio::test]
    async fn second_delete_escalates_to_error_boundary() {
        let app = setup().await;
        let cookie = login(&app).await;
        create_invoice(&app, &cookie, "5").await;
        let id = first_listed_invoice(&app, &cookie).await["id"]
            .as_str()
            .expect("invoice id")
            .to_string();
        let uri = format!("/dashboard/invoices/{id}/delete");

        let first = send(&app, form_request(&uri, Some(&cookie), &[])).await;
        assert_eq!(first.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&first), "/dashboard/invoices");

        let second = send(&app, form_request(&uri, Some(&cookie), &[])).await;
        assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(second).await;
        assert_eq!(body["detail"], GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn dashboard_overview_formats_cards() {
        let app = setup().await;
        let cookie = login(&app).await;
        create_invoice(&app, &cookie, "1234.5").await;

        let response = send(&app, get_request("/dashboard", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["cards"][1]["value"], "$1,234.50");
        assert_eq!(body["cards"][2]["value"], "1");
        assert_eq!(body["cards"][3]["value"], "1");
        assert_eq!(body["latest_invoices"][0]["email"], "lee@robinson.com");

        let customers = send(
            &app,
            get_request("/dashboard/customers?query=lee", Some(&cookie)),
        )
        .await;
        let body = json_body(customers).await;
        assert_eq!(body["customers"][0]["total_invoices"], 1);
        assert_eq!(body["customers"][0]["total_pending"], "$1,234.50");
    }

    #[tokio::test]
    async fn tap_requires_session() {
        let app = setup().await;
        let _listener = app.state.tap().subscribe();

        let response = send(&app, get_request("/_debug/tap?s=persistence", None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");

        let forged = send(
            &app,
            get_request("/_debug/tap", Some("acme_session=not-a-token")),
        )
        .await;
        assert_eq!(forged.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&forged), "/login");
    }

    #[tokio::test]
    async fn tap_rejects_unknown_stage() {
        let app = setup().await;
        let cookie = login(&app).await;
        let response = send(&app, get_request("/_debug/tap?s=webhook", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tap_stream_emits_events() {
        let app = setup().await;
        let cookie = login(&app).await;
        let tap = app.state.tap().clone();

        let publish = tokio::spawn(async move {
            time::sleep(Duration::from_millis(25)).await;
            tap.publish(StageEvent::new(Utc::now(), StageKind::Navigation, "test.event"));
        });

        let mut response = send(
            &app,
            get_request("/_debug/tap?s=navigation", Some(&cookie)),
        )
        .await;

        let frame = time::timeout(Duration::from_secs(1), response.body_mut().frame())
            .await
            .expect("stream produced chunk")
            .expect("chunk ok")
            .expect("chunk available");

        let data = match frame.into_data() {
            Ok(data) => data,
            Err(_) => panic!("expected data frame"),
        };
        let text = String::from_utf8(data.to_vec()).expect("utf-8");
        assert!(text.contains("data:"));
        assert!(text.contains("\"stage\":\"navigation\""));

        publish.await.expect("publish task");
    }
}
