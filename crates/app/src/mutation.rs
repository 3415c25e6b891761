use std::{sync::Arc, time::Instant};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use metrics::{counter, histogram};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

use acme_core::form::{
    FieldErrors, FormFields, FormResult, Navigation, Submission, INVOICE_LIST_PATH,
};
use acme_core::types::InvoiceWrite;
use acme_core::validation::{validate_create, validate_invoice_id, validate_update};

use crate::gateway::{GatewayError, InvoiceGateway};
use crate::tap::{StageEvent, StageKind, TapHub};
use crate::views::ViewInvalidator;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub const CREATE_INVALID: &str = "Validation failed. Failed to create invoice.";
pub const UPDATE_INVALID: &str = "Validation failed. Failed to update invoice.";
pub const CREATE_FAILED: &str = "Failed to create invoice. Please try again.";
pub const UPDATE_FAILED: &str = "Failed to update invoice. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

impl MutationOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Failures of the delete path. These are escalated to the caller's error
/// boundary instead of being rendered back into a form.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("invoice id is required")]
    MissingId,
    #[error("failed to delete invoice: {0}")]
    Delete(#[source] GatewayError),
}

/// Runs the validate, persist, invalidate, navigate pipeline for invoices.
#[derive(Clone)]
pub struct InvoiceMutations {
    gateway: Arc<dyn InvoiceGateway>,
    views: Arc<dyn ViewInvalidator>,
    tap: TapHub,
    clock: Clock,
    timezone: Tz,
}

impl InvoiceMutations {
    pub fn new(
        gateway: Arc<dyn InvoiceGateway>,
        views: Arc<dyn ViewInvalidator>,
        tap: TapHub,
        clock: Clock,
        timezone: Tz,
    ) -> Self {
        Self {
            gateway,
            views,
            tap,
            clock,
            timezone,
        }
    }

    /// Calendar day, in the configured zone, that a new invoice is issued on.
    fn issue_date(&self) -> NaiveDate {
        (self.clock)().with_timezone(&self.timezone).date_naive()
    }

    /// Handles a create form. `_previous` is the state the form was rendered
    /// with; the outcome never depends on it.
    pub async fn create_invoice(&self, _previous: &FormResult, fields: &FormFields) -> Submission {
        let started = Instant::now();
        let op = MutationOp::Create;

        let input = match validate_create(fields) {
            Ok(input) => input,
            Err(errors) => {
                return self.reject_invalid(op, CREATE_INVALID, errors, fields, started);
            }
        };
        self.emit_validated(op, None, input.amount.get());

        let write = InvoiceWrite::Insert(input.into_new_invoice(self.issue_date()));
        self.persist(op, write, CREATE_FAILED, started).await
    }

    /// Handles an update form. The `id` field selects the row; the issue date
    /// is left untouched.
    pub async fn update_invoice(&self, _previous: &FormResult, fields: &FormFields) -> Submission {
        let started = Instant::now();
        let op = MutationOp::Update;

        let input = match validate_update(fields) {
            Ok(input) => input,
            Err(errors) => {
                return self.reject_invalid(op, UPDATE_INVALID, errors, fields, started);
            }
        };
        self.emit_validated(op, Some(&input.id), input.changes.amount.get());

        let write = InvoiceWrite::Update {
            id: input.id,
            changes: input.changes,
        };
        self.persist(op, write, UPDATE_FAILED, started).await
    }

    pub async fn delete_invoice(&self, id: &str) -> Result<Navigation, MutationError> {
        let started = Instant::now();
        let op = MutationOp::Delete;

        let id = validate_invoice_id(id).map_err(|_| {
            self.record(op, "invalid", started);
            MutationError::MissingId
        })?;

        let write = InvoiceWrite::Delete { id };
        let deleted = match self.gateway.execute(&write).await {
            Ok(deleted) => deleted,
            Err(err) => {
                self.log_write_failure(op, &write, &err);
                self.record(op, "failed", started);
                return Err(MutationError::Delete(err));
            }
        };

        Ok(self.complete(op, &deleted, started).await)
    }

    async fn persist(
        &self,
        op: MutationOp,
        write: InvoiceWrite,
        failure: &'static str,
        started: Instant,
    ) -> Submission {
        let id = match self.gateway.execute(&write).await {
            Ok(id) => id,
            Err(err) => {
                self.log_write_failure(op, &write, &err);
                self.record(op, "failed", started);
                return Submission::Rejected(FormResult::failed(failure));
            }
        };

        // The write is committed; nothing below may turn this into a failure.
        Submission::Redirect(self.complete(op, &id, started).await)
    }

    async fn complete(&self, op: MutationOp, id: &str, started: Instant) -> Navigation {
        self.emit(
            StageEvent::new(self.now(), StageKind::Persistence, "invoice written")
                .with_op(op.as_str())
                .with_invoice(id),
        );

        self.views.revalidate_path(INVOICE_LIST_PATH).await;
        self.emit(
            StageEvent::new(self.now(), StageKind::Invalidation, "invoice list revalidated")
                .with_op(op.as_str())
                .with_payload(json!({ "path": INVOICE_LIST_PATH })),
        );

        let navigation = Navigation::to(INVOICE_LIST_PATH);
        self.emit(
            StageEvent::new(self.now(), StageKind::Navigation, "redirecting")
                .with_op(op.as_str())
                .with_invoice(id)
                .with_payload(json!({ "location": navigation.location() })),
        );

        info!(stage = "mutation", op = op.as_str(), invoice_id = %id, "invoice mutation applied");
        self.record(op, "redirected", started);
        navigation
    }

    fn reject_invalid(
        &self,
        op: MutationOp,
        message: &'static str,
        errors: FieldErrors,
        fields: &FormFields,
        started: Instant,
    ) -> Submission {
        debug!(
            stage = "validation",
            op = op.as_str(),
            fields = errors.len(),
            "invoice form rejected"
        );
        if self.tap.has_listeners() {
            self.emit(
                StageEvent::new(self.now(), StageKind::Validation, message)
                    .with_op(op.as_str())
                    .with_payload(json!({ "errors": &errors })),
            );
        }
        self.record(op, "invalid", started);
        Submission::Rejected(FormResult::invalid(message, errors, fields.clone()))
    }

    fn emit_validated(&self, op: MutationOp, id: Option<&str>, amount_cents: i64) {
        if !self.tap.has_listeners() {
            return;
        }
        let mut event = StageEvent::new(self.now(), StageKind::Validation, "invoice form accepted")
            .with_op(op.as_str())
            .with_payload(json!({ "amount_cents": amount_cents }));
        if let Some(id) = id {
            event = event.with_invoice(id);
        }
        self.emit(event);
    }

    fn log_write_failure(&self, op: MutationOp, write: &InvoiceWrite, err: &GatewayError) {
        error!(
            stage = "persistence",
            op = op.as_str(),
            statement = write.kind_str(),
            invoice_id = write.target_id().unwrap_or("-"),
            not_found = err.is_not_found(),
            error = %err,
            "invoice write failed"
        );
        if self.tap.has_listeners() {
            let message = "invoice write failed";
            let mut event = StageEvent::new(self.now(), StageKind::Persistence, message)
                .with_op(op.as_str())
                .with_payload(json!({ "statement": write.kind_str() }));
            if let Some(id) = write.target_id() {
                event = event.with_invoice(id);
            }
            self.emit(event);
        }
    }

    fn emit(&self, event: StageEvent) {
        if self.tap.has_listeners() {
            self.tap.publish(event);
        }
    }

    fn record(&self, op: MutationOp, result: &'static str, started: Instant) {
        counter!("invoice_mutations_total", "op" => op.as_str(), "result" => result).increment(1);
        histogram!("invoice_mutation_seconds", "op" => op.as_str())
            .record(started.elapsed().as_secs_f64());
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}
