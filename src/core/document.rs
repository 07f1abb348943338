use crate::core::pages::select_pages;
use crate::core::walker::{self, WalkState};
use crate::error::{InvertError, Result};
use crate::types::{InvertReport, InvertRequest};
use lopdf::{Document, ObjectId};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Invert a PDF held in memory and return the serialized result.
pub fn invert_pdf(bytes: &[u8], request: &InvertRequest) -> Result<Vec<u8>> {
  let mut doc = load(bytes)?;
  process_inner(&mut doc, request, None)?;
  save_bytes(&mut doc)
}

/// Like [`invert_pdf`], with a cancellation flag checked between pages.
/// Once the flag is set the partial document is discarded and nothing is
/// written.
pub fn invert_pdf_with_cancel(
  bytes: &[u8],
  request: &InvertRequest,
  cancel: &AtomicBool,
) -> Result<Vec<u8>> {
  let mut doc = load(bytes)?;
  process_inner(&mut doc, request, Some(cancel))?;
  save_bytes(&mut doc)
}

/// Read `input`, invert, and write the result to `output`.
pub fn invert_file(input: &Path, output: &Path, request: &InvertRequest) -> Result<InvertReport> {
  let bytes = std::fs::read(input)?;
  let mut doc = load(&bytes)?;
  let report = process_inner(&mut doc, request, None)?;
  doc.save(output).map_err(InvertError::Serialization)?;
  Ok(report)
}

/// Run the inversion on an already-loaded document, mutating it in place.
/// Callers that manage loading and saving themselves use this directly.
pub fn process_document(
  doc: &mut Document,
  request: &InvertRequest,
  cancel: Option<&AtomicBool>,
) -> Result<InvertReport> {
  process_inner(doc, request, cancel)
}

fn load(bytes: &[u8]) -> Result<Document> {
  Document::load_mem(bytes).map_err(InvertError::InvalidDocument)
}

fn save_bytes(doc: &mut Document) -> Result<Vec<u8>> {
  let mut out = Vec::new();
  doc
    .save_to(&mut out)
    .map_err(InvertError::Serialization)?;
  Ok(out)
}

fn process_inner(
  doc: &mut Document,
  request: &InvertRequest,
  cancel: Option<&AtomicBool>,
) -> Result<InvertReport> {
  // Decryption is the loader's concern; a document that still carries an
  // /Encrypt dictionary here cannot be rewritten meaningfully.
  if doc.trailer.get(b"Encrypt").is_ok() {
    return Err(InvertError::Encrypted);
  }

  let page_ids: Vec<(u32, ObjectId)> = doc.get_pages().iter().map(|(&n, &id)| (n, id)).collect();
  let total = page_ids.len() as u32;

  let mut selected = select_pages(&request.range, total);
  if selected.is_empty() {
    // An empty (or unparsable) selection widens to every page.
    selected = (0..total).collect();
  }

  // The raw hint drives image scaling; quality-tier snapping happens at the
  // JPEG encoder.
  let mut state = WalkState::new(request.mode, request.compress_images, request.output_dpi_hint);

  for &index in &selected {
    if let Some(flag) = cancel
      && flag.load(Ordering::Relaxed)
    {
      return Err(InvertError::Cancelled);
    }
    let (page_num, page_id) = page_ids[index as usize];
    if let Err(err) = walker::process_page(doc, page_id, &mut state) {
      warn!(page = page_num, %err, "page processing failed, continuing with the rest");
      state.report.pages_failed += 1;
    }
  }

  // Drop everything outside the selection, highest page first so the
  // remaining numbering stays valid during removal.
  if (selected.len() as u32) < total {
    let keep: HashSet<u32> = selected.iter().map(|&i| i + 1).collect();
    let dropped: Vec<u32> = (1..=total).rev().filter(|n| !keep.contains(n)).collect();
    doc.delete_pages(&dropped);
  }

  // Replaced content streams and dropped pages leave orphans behind.
  doc.prune_objects();
  doc.compress();
  Ok(state.report)
}

#[cfg(test)]
mod tests {
  use super::*;
  use lopdf::{Object, dictionary};

  #[test]
  fn encrypted_documents_are_rejected() {
    let mut doc = Document::with_version("1.5");
    let encrypt_id = doc.add_object(dictionary! { "Filter" => "Standard" });
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));

    let err = process_inner(&mut doc, &InvertRequest::default(), None).unwrap_err();
    assert!(matches!(err, InvertError::Encrypted));
  }

  #[test]
  fn preset_cancel_flag_stops_before_any_page() {
    let bytes = minimal_one_page_pdf();
    let cancel = AtomicBool::new(true);
    let err = invert_pdf_with_cancel(&bytes, &InvertRequest::default(), &cancel).unwrap_err();
    assert!(matches!(err, InvertError::Cancelled));
  }

  #[test]
  fn garbage_bytes_are_an_invalid_document() {
    let err = invert_pdf(b"not a pdf at all", &InvertRequest::default()).unwrap_err();
    assert!(matches!(err, InvertError::InvalidDocument(_)));
  }

  // A minimal one-page document, serialized.
  fn minimal_one_page_pdf() -> Vec<u8> {
    use lopdf::Stream;
    use lopdf::content::{Content, Operation};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = Content {
      operations: vec![Operation::new("n", vec![])],
    };
    let content_id = doc.add_object(Stream::new(
      dictionary! {},
      content.encode().expect("encode"),
    ));
    let page_id = doc.add_object(dictionary! {
      "Type" => "Page",
      "Parent" => pages_id,
      "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
      "Contents" => content_id,
    });
    doc.objects.insert(
      pages_id,
      Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
      }),
    );
    let catalog_id = doc.add_object(dictionary! {
      "Type" => "Catalog",
      "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save");
    out
  }
}
