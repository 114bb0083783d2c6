//! Error taxonomy and classification.
//!
//! Every failure surfaced by this crate is a [`ClassifiedError`]: a raw signal
//! ([`RawFailure`]) tagged with an [`ErrorCode`] from the fixed taxonomy and the
//! retry/recovery policy that code carries.

pub mod classification;
pub mod classifier;
pub mod raw;
pub mod taxonomy;

pub use classification::ClassifiedError;
pub use classifier::{ErrorClassifier, ErrorPattern};
pub use raw::RawFailure;
pub use taxonomy::{lookup, metadata, ErrorCategory, ErrorCode, ErrorMetadata, Severity};
