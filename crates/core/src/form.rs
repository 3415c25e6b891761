use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Location of the invoice list view; every successful mutation navigates here.
pub const INVOICE_LIST_PATH: &str = "/dashboard/invoices";

/// Invoice form fields known to the validation schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Id,
    CustomerId,
    Amount,
    Status,
    #[serde(rename = "date")]
    IssueDate,
}

impl Field {
    /// Returns the form field name the value is submitted under.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::CustomerId => "customerId",
            Self::Amount => "amount",
            Self::Status => "status",
            Self::IssueDate => "date",
        }
    }
}

/// Raw submitted form values keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormFields(BTreeMap<String, String>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn field(&self, field: Field) -> Option<&str> {
        self.get(field.as_str())
    }
}

impl<K, V> FromIterator<(K, V)> for FormFields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Per-field validation messages. Holds at most one message per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` for `field` unless the field already failed an earlier rule.
    pub fn reject(&mut self, field: Field, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.keys().copied()
    }
}

/// State handed back to an invoice form when a submission does not navigate away.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FormResult {
    /// Nothing has been submitted yet.
    #[default]
    Pristine,
    /// User-correctable input problems.
    Invalid {
        message: String,
        errors: FieldErrors,
        values: FormFields,
    },
    /// The write could not be completed; the message never carries internal detail.
    Failed { message: String },
}

impl FormResult {
    pub fn invalid(message: impl Into<String>, errors: FieldErrors, values: FormFields) -> Self {
        Self::Invalid {
            message: message.into(),
            errors,
            values,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Pristine => None,
            Self::Invalid { message, .. } | Self::Failed { message } => Some(message),
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Invalid { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

/// Instruction to move the user to another location after a successful write.
#[must_use = "a navigation must be handed to the caller"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    location: String,
}

impl Navigation {
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

/// Outcome of a form submission: either the form is re-rendered or the user navigates.
#[must_use = "a submission outcome must be rendered or followed"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Rejected(FormResult),
    Redirect(Navigation),
}

impl Submission {
    pub fn navigation(&self) -> Option<&Navigation> {
        match self {
            Self::Redirect(navigation) => Some(navigation),
            Self::Rejected(_) => None,
        }
    }

    pub fn form_result(&self) -> Option<&FormResult> {
        match self {
            Self::Rejected(result) => Some(result),
            Self::Redirect(_) => None,
        }
    }
}
