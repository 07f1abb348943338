use thiserror::Error;

/// Fatal failures of a whole processing run.
///
/// Per-stream and per-image problems never surface here: they are logged,
/// counted in [`crate::InvertReport`], and the affected piece is left
/// unchanged in the output document.
#[derive(Error, Debug)]
pub enum InvertError {
  #[error("input is not a parseable PDF: {0}")]
  InvalidDocument(#[source] lopdf::Error),

  #[error("document is encrypted; decrypt it before processing")]
  Encrypted,

  #[error("failed to serialize output document: {0}")]
  Serialization(#[source] std::io::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("processing cancelled")]
  Cancelled,
}

/// Convenience Result type alias for InvertError.
pub type Result<T> = std::result::Result<T, InvertError>;
