use acme_core::types::InvoiceWrite;
use acme_storage::{InvoiceRepository, InvoiceWriteError};
use async_trait::async_trait;
use thiserror::Error;

/// Executes exactly one invoice statement against the record store.
///
/// Returns the id of the affected invoice. Mutation handlers depend only on
/// this contract so tests can substitute a recording fake.
#[async_trait]
pub trait InvoiceGateway: Send + Sync {
    async fn execute(&self, write: &InvoiceWrite) -> Result<String, GatewayError>;
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct GatewayError(#[from] InvoiceWriteError);

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self.0, InvoiceWriteError::NotFound(_))
    }
}

#[async_trait]
impl InvoiceGateway for InvoiceRepository {
    async fn execute(&self, write: &InvoiceWrite) -> Result<String, GatewayError> {
        Ok(InvoiceRepository::execute(self, write).await?)
    }
}
