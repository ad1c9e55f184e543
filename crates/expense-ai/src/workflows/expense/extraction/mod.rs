mod schema;
mod vision;

pub use schema::{json_schema, parse_receipt};
pub use vision::VisionExtractionGateway;

use super::domain::{Receipt, ReceiptId, ReceiptSource};
use super::llm::LlmError;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Converts one receipt image into a structured receipt.
///
/// Implementations only see the source handle; they never touch run state.
pub trait ExtractionGateway: Send + Sync {
    fn extract(
        &self,
        source: &ReceiptSource,
    ) -> impl Future<Output = Result<Receipt, ExtractionFailure>> + Send;
}

/// Why a single extraction did not produce a receipt.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("unable to read receipt image: {0}")]
    Io(#[from] std::io::Error),
    #[error("extraction service error: {0}")]
    Service(#[from] LlmError),
    #[error("response violated the receipt schema: {0}")]
    Schema(String),
    #[error("extraction service is not configured: {0}")]
    Unconfigured(String),
    #[error("extraction deadline of {0:?} exceeded")]
    DeadlineExceeded(std::time::Duration),
}

/// Item-level failure recorded in the run state instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionFailed {
    pub source: ReceiptSource,
    pub receipt_id: ReceiptId,
    pub cause: String,
}

impl ExtractionFailed {
    pub fn new(source: &ReceiptSource, cause: &ExtractionFailure) -> Self {
        Self {
            source: source.clone(),
            receipt_id: source.receipt_id(),
            cause: cause.to_string(),
        }
    }
}
