//! Untyped manifest documents and the multi-document normalizer.

pub mod document;
pub mod normalize;

pub use document::{Document, FieldError, Node, Origin};
pub use normalize::{Normalized, Normalizer, RawManifest};

use pkg_types::config::ExtractOptions;
use pkg_types::{Error, Result};
use tracing::warn;

/// Apply the strict/lenient policy to a per-document problem.
///
/// Strict mode returns the error; lenient mode records it as a warning so the
/// caller can skip the document and carry on. Errors that are not about a
/// single document (I/O, cancellation) always propagate.
pub fn tolerate(options: &ExtractOptions, err: Error, warnings: &mut Vec<String>) -> Result<()> {
    if options.strict || !err.is_recoverable() {
        return Err(err);
    }
    warn!("Skipping document: {}", err);
    warnings.push(err.to_string());
    Ok(())
}
