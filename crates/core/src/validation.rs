//! Invoice form validation.
//!
//! One canonical schema describes every invoice field and its rules. The
//! create and update schemas are projections of it, so the rules for a field
//! are defined exactly once. Each field reports only the first rule it fails;
//! failures on different fields are collected together.

use chrono::NaiveDate;

use crate::form::{Field, FieldErrors, FormFields};
use crate::money::{parse_major_units, AmountError};
use crate::types::{Cents, InvoiceChanges, InvoiceStatus, NewInvoice};

pub const CUSTOMER_REQUIRED: &str = "Customer is required";
pub const AMOUNT_NOT_POSITIVE: &str = "Amount must be greater than 0";
pub const AMOUNT_TOO_LARGE: &str = "Amount is too large";
pub const STATUS_INVALID: &str = "Status must be either pending or paid";
pub const ID_REQUIRED: &str = "Invoice id is required";
pub const DATE_INVALID: &str = "Date must be a valid YYYY-MM-DD date";

/// Set of fields a submission is validated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSchema {
    fields: Vec<Field>,
}

impl InvoiceSchema {
    /// Every invoice field.
    pub fn canonical() -> Self {
        Self {
            fields: vec![
                Field::Id,
                Field::CustomerId,
                Field::Amount,
                Field::Status,
                Field::IssueDate,
            ],
        }
    }

    /// Schema used by the create form: the id is assigned by storage and the
    /// issue date is stamped by the handler.
    pub fn create() -> Self {
        Self::canonical().omit(&[Field::Id, Field::IssueDate])
    }

    /// Schema used by the update form: the issue date never changes.
    pub fn update() -> Self {
        Self::canonical().omit(&[Field::IssueDate])
    }

    pub fn omit(mut self, omitted: &[Field]) -> Self {
        self.fields.retain(|field| !omitted.contains(field));
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Checks every field of the schema, returning normalized values or the collected errors.
    pub fn validate(&self, input: &FormFields) -> Result<ValidatedInvoice, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut valid = ValidatedInvoice::default();

        for &field in &self.fields {
            let raw = input.field(field).unwrap_or("");
            let outcome = match field {
                Field::Id => required_text(raw, ID_REQUIRED).map(|id| valid.id = Some(id)),
                Field::CustomerId => required_text(raw, CUSTOMER_REQUIRED)
                    .map(|customer_id| valid.customer_id = Some(customer_id)),
                Field::Amount => amount(raw).map(|amount| valid.amount = Some(amount)),
                Field::Status => status(raw).map(|status| valid.status = Some(status)),
                Field::IssueDate => {
                    issue_date(raw).map(|issue_date| valid.issue_date = Some(issue_date))
                }
            };
            if let Err(message) = outcome {
                errors.reject(field, message);
            }
        }

        if errors.is_empty() {
            Ok(valid)
        } else {
            Err(errors)
        }
    }
}

/// Normalized values for the fields present in the schema that produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedInvoice {
    pub id: Option<String>,
    pub customer_id: Option<String>,
    pub amount: Option<Cents>,
    pub status: Option<InvoiceStatus>,
    pub issue_date: Option<NaiveDate>,
}

/// Validated create form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInvoice {
    pub customer_id: String,
    pub amount: Cents,
    pub status: InvoiceStatus,
}

impl CreateInvoice {
    pub fn into_new_invoice(self, issue_date: NaiveDate) -> NewInvoice {
        NewInvoice {
            customer_id: self.customer_id,
            amount: self.amount,
            status: self.status,
            issue_date,
        }
    }
}

/// Validated update form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInvoice {
    pub id: String,
    pub changes: InvoiceChanges,
}

/// Validates a create submission (`customerId`, `amount`, `status`).
pub fn validate_create(input: &FormFields) -> Result<CreateInvoice, FieldErrors> {
    let valid = InvoiceSchema::create().validate(input)?;
    match (valid.customer_id, valid.amount, valid.status) {
        (Some(customer_id), Some(amount), Some(status)) => Ok(CreateInvoice {
            customer_id,
            amount,
            status,
        }),
        (customer_id, amount, status) => Err(absent(&[
            (Field::CustomerId, customer_id.is_none()),
            (Field::Amount, amount.is_none()),
            (Field::Status, status.is_none()),
        ])),
    }
}

/// Validates an update submission (`id`, `customerId`, `amount`, `status`).
pub fn validate_update(input: &FormFields) -> Result<UpdateInvoice, FieldErrors> {
    let valid = InvoiceSchema::update().validate(input)?;
    match (valid.id, valid.customer_id, valid.amount, valid.status) {
        (Some(id), Some(customer_id), Some(amount), Some(status)) => Ok(UpdateInvoice {
            id,
            changes: InvoiceChanges {
                customer_id,
                amount,
                status,
            },
        }),
        (id, customer_id, amount, status) => Err(absent(&[
            (Field::Id, id.is_none()),
            (Field::CustomerId, customer_id.is_none()),
            (Field::Amount, amount.is_none()),
            (Field::Status, status.is_none()),
        ])),
    }
}

/// Validates a bare invoice identifier, as used by delete.
pub fn validate_invoice_id(raw: &str) -> Result<String, FieldErrors> {
    required_text(raw, ID_REQUIRED).map_err(|message| {
        let mut errors = FieldErrors::new();
        errors.reject(Field::Id, message);
        errors
    })
}

fn absent(fields: &[(Field, bool)]) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for &(field, missing) in fields {
        if missing {
            errors.reject(field, required_message(field));
        }
    }
    errors
}

fn required_message(field: Field) -> &'static str {
    match field {
        Field::Id => ID_REQUIRED,
        Field::CustomerId => CUSTOMER_REQUIRED,
        Field::Amount => AMOUNT_NOT_POSITIVE,
        Field::Status => STATUS_INVALID,
        Field::IssueDate => DATE_INVALID,
    }
}

fn required_text(raw: &str, message: &'static str) -> Result<String, &'static str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(message)
    } else {
        Ok(trimmed.to_string())
    }
}

fn amount(raw: &str) -> Result<Cents, &'static str> {
    parse_major_units(raw).map_err(|err| match err {
        AmountError::NotANumber | AmountError::NotPositive => AMOUNT_NOT_POSITIVE,
        AmountError::TooLarge => AMOUNT_TOO_LARGE,
    })
}

fn status(raw: &str) -> Result<InvoiceStatus, &'static str> {
    raw.parse().map_err(|_| STATUS_INVALID)
}

fn issue_date(raw: &str) -> Result<NaiveDate, &'static str> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| DATE_INVALID)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> FormFields {
        pairs.iter().copied().collect()
    }

    #[test]
    fn create_accepts_valid_input_and_converts_amount() {
        let input = fields(&[
            ("customerId", "c-1"),
            ("amount", "19.99"),
            ("status", "pending"),
        ]);
        let valid = validate_create(&input).expect("valid input");
        assert_eq!(valid.customer_id, "c-1");
        assert_eq!(valid.amount.get(), 1999);
        assert_eq!(valid.status, InvoiceStatus::Pending);

        let input = fields(&[("customerId", "c-1"), ("amount", "200"), ("status", "paid")]);
        let valid = validate_create(&input).expect("valid input");
        assert_eq!(valid.amount.get(), 20000);
        assert_eq!(valid.status, InvoiceStatus::Paid);
    }

    #[test]
    fn create_trims_customer_id() {
        let input = fields(&[
            ("customerId", "  c-1 "),
            ("amount", "1"),
            ("status", "paid"),
        ]);
        let valid = validate_create(&input).expect("valid input");
        assert_eq!(valid.customer_id, "c-1");
    }

    #[test]
    fn create_ignores_submitted_id_and_date() {
        let input = fields(&[
            ("id", ""),
            ("date", "not-a-date"),
            ("customerId", "c-1"),
            ("amount", "1"),
            ("status", "paid"),
        ]);
        assert!(validate_create(&input).is_ok());
    }

    #[test]
    fn non_positive_amounts_fail_on_amount_only() {
        for raw in ["0", "-3", "abc", "", "0.001"] {
            let input = fields(&[("customerId", "c-1"), ("amount", raw), ("status", "paid")]);
            let errors = validate_create(&input).expect_err("amount must be rejected");
            assert_eq!(errors.len(), 1, "input {raw:?}");
            assert_eq!(errors.get(Field::Amount), Some(AMOUNT_NOT_POSITIVE));
        }
    }

    #[test]
    fn oversized_amount_reports_its_own_message() {
        let input = fields(&[
            ("customerId", "c-1"),
            ("amount", "100000000000000000000"),
            ("status", "paid"),
        ]);
        let errors = validate_create(&input).expect_err("too large");
        assert_eq!(errors.get(Field::Amount), Some(AMOUNT_TOO_LARGE));
    }

    #[test]
    fn errors_on_distinct_fields_aggregate() {
        let input = fields(&[("customerId", "   "), ("amount", "0"), ("status", "paid")]);
        let errors = validate_create(&input).expect_err("invalid");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get(Field::CustomerId), Some(CUSTOMER_REQUIRED));
        assert_eq!(errors.get(Field::Amount), Some(AMOUNT_NOT_POSITIVE));
    }

    #[test]
    fn missing_fields_are_reported() {
        let errors = validate_create(&FormFields::new()).expect_err("empty form");
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec![Field::CustomerId, Field::Amount, Field::Status]
        );
    }

    #[test]
    fn unknown_status_is_rejected() {
        for raw in ["overdue", "PAID", "", " pending"] {
            let input = fields(&[("customerId", "c-1"), ("amount", "5"), ("status", raw)]);
            let errors = validate_create(&input).expect_err("status must be rejected");
            assert_eq!(errors.get(Field::Status), Some(STATUS_INVALID), "input {raw:?}");
        }
    }

    #[test]
    fn update_requires_id() {
        let input = fields(&[("customerId", "c-1"), ("amount", "5"), ("status", "paid")]);
        let errors = validate_update(&input).expect_err("missing id");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get(Field::Id), Some(ID_REQUIRED));

        let input = fields(&[
            ("id", "inv-1"),
            ("customerId", "c-2"),
            ("amount", "5.5"),
            ("status", "paid"),
        ]);
        let valid = validate_update(&input).expect("valid update");
        assert_eq!(valid.id, "inv-1");
        assert_eq!(
            valid.changes,
            InvoiceChanges {
                customer_id: "c-2".to_string(),
                amount: Cents::try_from(550).expect("cents"),
                status: InvoiceStatus::Paid,
            }
        );
    }

    #[test]
    fn projections_derive_from_canonical_schema() {
        assert_eq!(
            InvoiceSchema::create().fields(),
            &[Field::CustomerId, Field::Amount, Field::Status]
        );
        assert_eq!(
            InvoiceSchema::update().fields(),
            &[Field::Id, Field::CustomerId, Field::Amount, Field::Status]
        );
    }

    #[test]
    fn canonical_schema_checks_issue_date() {
        let input = fields(&[
            ("id", "inv-1"),
            ("customerId", "c-1"),
            ("amount", "5"),
            ("status", "paid"),
            ("date", "2024-02-30"),
        ]);
        let errors = InvoiceSchema::canonical()
            .validate(&input)
            .expect_err("bad date");
        assert_eq!(errors.get(Field::IssueDate), Some(DATE_INVALID));

        let mut input = input;
        input.insert("date", "2024-02-29");
        let valid = InvoiceSchema::canonical()
            .validate(&input)
            .expect("leap day is valid");
        assert_eq!(valid.issue_date, NaiveDate::from_ymd_opt(2024, 2, 29));
    }

    #[test]
    fn bare_id_validation() {
        assert_eq!(validate_invoice_id(" inv-9 ").as_deref(), Ok("inv-9"));
        let errors = validate_invoice_id("  ").expect_err("blank id");
        assert_eq!(errors.get(Field::Id), Some(ID_REQUIRED));
    }
}
