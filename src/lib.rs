#![deny(clippy::all)]

//! Dark-mode transformation for PDF documents.
//!
//! The input stays a true PDF: text remains selectable, vectors stay vectors,
//! outlines, metadata, links and form fields survive. Only colors change —
//! color-setting operators in page, form and annotation-appearance content
//! streams are rewritten operand by operand, embedded raster images are
//! decoded, remapped pixel by pixel and re-encoded, and every processed page
//! is painted onto an inverted background first.
//!
//! ```no_run
//! use pdfnight::{invert_pdf, InvertRequest};
//!
//! let input = std::fs::read("report.pdf")?;
//! let output = invert_pdf(&input, &InvertRequest::default())?;
//! std::fs::write("report-dark.pdf", output)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod core;
mod error;
mod types;

pub use crate::core::document::{invert_file, invert_pdf, invert_pdf_with_cancel, process_document};
pub use crate::error::{InvertError, Result};
pub use crate::types::{InversionMode, InvertReport, InvertRequest, PageRange};
