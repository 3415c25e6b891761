//! Domain layer for the Acme invoice dashboard.
//!
//! Holds the invoice and customer types, the form validation schema, the
//! outcome types returned by the mutation handlers, and the pure formatting
//! helpers shared by page handlers. Nothing in this crate performs I/O.

pub mod form;
pub mod money;
pub mod pagination;
pub mod types;
pub mod validation;
