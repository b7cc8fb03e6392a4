//! Identity, workload and RBAC extraction over normalized manifest documents.
//!
//! Each extractor is a pure function of its input slice: one linear pass, no
//! state kept between calls. A failed call returns no partial results.

pub mod identity;
pub mod pipeline;
pub mod rbac;
pub mod workload;

pub use identity::{IdentityExtraction, IdentityExtractor};
pub use pipeline::{Extraction, Pipeline, Summary};
pub use rbac::{RbacExtraction, RbacExtractor, correlate};
pub use workload::{WorkloadExtraction, WorkloadExtractor};

use pkg_manifest::Document;
use pkg_types::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Reject an empty document set.
fn ensure_input(documents: &[Document]) -> Result<()> {
    if documents.is_empty() {
        return Err(Error::InvalidInput("document set is empty".to_string()));
    }
    Ok(())
}

/// Per-document cancellation point.
fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}
