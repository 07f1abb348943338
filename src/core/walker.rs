use crate::core::{images, ops, stream};
use crate::types::{InversionMode, InvertReport};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Traversal state for one processing run.
///
/// The visited set is document-scoped and keyed on object identity, never on
/// local resource names: the same name in two resource dictionaries can be
/// two different objects, and one object can hide behind many names. A form
/// shared by several pages must be rewritten exactly once — full inversion is
/// an involution, so a second pass would silently restore the original.
pub(crate) struct WalkState {
  pub mode: InversionMode,
  pub compress_images: bool,
  pub dpi_hint: u32,
  pub visited: HashSet<ObjectId>,
  pub report: InvertReport,
}

impl WalkState {
  pub fn new(mode: InversionMode, compress_images: bool, dpi_hint: u32) -> Self {
    WalkState {
      mode,
      compress_images,
      dpi_hint,
      visited: HashSet::new(),
      report: InvertReport::default(),
    }
  }
}

/// Process one page: rewrite its content stream behind a background prelude,
/// then its image and form XObjects, then its annotation appearances.
pub(crate) fn process_page(
  doc: &mut Document,
  page_id: ObjectId,
  state: &mut WalkState,
) -> lopdf::Result<()> {
  rewrite_page_content(doc, page_id, state)?;

  if let Some(resources) = page_resources(doc, page_id) {
    process_resources(doc, &resources, state);
  }
  process_annotations(doc, page_id, state);

  state.report.pages_processed += 1;
  Ok(())
}

// ── Page content ────────────────────────────────────────────────

fn rewrite_page_content(
  doc: &mut Document,
  page_id: ObjectId,
  state: &mut WalkState,
) -> lopdf::Result<()> {
  let media_box = page_media_box(doc, page_id).unwrap_or_else(|| {
    warn!(page = page_id.0, "page has no MediaBox, assuming US Letter");
    [0.0, 0.0, 612.0, 792.0]
  });
  let prelude = ops::background_prelude(state.mode, media_box);

  let decoded = doc
    .get_page_content(page_id)
    .and_then(|bytes| stream::decode_operations(&bytes));

  match decoded {
    Ok(mut content) => {
      ops::rewrite_operations(&mut content.operations, state.mode);
      let mut operations = prelude;
      operations.append(&mut content.operations);

      let rebuilt = stream::rebuild_stream(&Dictionary::new(), &Content { operations })?;
      let content_id = doc.add_object(rebuilt);
      set_page_contents(doc, page_id, Object::Reference(content_id))?;
      state.report.streams_rewritten += 1;
    }
    Err(err) => {
      // The original stream stays in place, but the page still gets its
      // background: a prelude-only stream prepended to the Contents array.
      warn!(page = page_id.0, %err, "content stream not tokenizable, left unchanged");
      state.report.streams_failed += 1;

      let rebuilt = stream::rebuild_stream(&Dictionary::new(), &Content { operations: prelude })?;
      let prelude_id = doc.add_object(rebuilt);
      prepend_page_contents(doc, page_id, prelude_id)?;
    }
  }
  Ok(())
}

fn set_page_contents(doc: &mut Document, page_id: ObjectId, contents: Object) -> lopdf::Result<()> {
  let mut page = doc.get_dictionary(page_id)?.clone();
  page.set("Contents", contents);
  doc.objects.insert(page_id, Object::Dictionary(page));
  Ok(())
}

fn prepend_page_contents(
  doc: &mut Document,
  page_id: ObjectId,
  prelude_id: ObjectId,
) -> lopdf::Result<()> {
  let page = doc.get_dictionary(page_id)?.clone();
  let mut contents = vec![Object::Reference(prelude_id)];
  match page.get(b"Contents") {
    Ok(Object::Reference(id)) => contents.push(Object::Reference(*id)),
    Ok(Object::Array(arr)) => contents.extend(arr.iter().cloned()),
    _ => {}
  }
  set_page_contents(doc, page_id, Object::Array(contents))
}

// ── XObject resources ───────────────────────────────────────────

enum XObjectKind {
  Image,
  Form,
}

/// Walk a resources dictionary: transform images first, then rewrite forms
/// and recurse into their own resources, each object at most once per run.
fn process_resources(doc: &mut Document, resources: &Dictionary, state: &mut WalkState) {
  let Some(xobjects) = resources
    .get(b"XObject")
    .ok()
    .and_then(|obj| as_dict(doc, obj))
    .cloned()
  else {
    return;
  };

  let mut entries: Vec<(ObjectId, XObjectKind)> = Vec::new();
  for (_, value) in xobjects.iter() {
    let Object::Reference(id) = value else { continue };
    let Ok(Object::Stream(s)) = doc.get_object(*id) else {
      continue;
    };
    match s.dict.get(b"Subtype") {
      Ok(Object::Name(n)) if n == b"Image" => entries.push((*id, XObjectKind::Image)),
      Ok(Object::Name(n)) if n == b"Form" => entries.push((*id, XObjectKind::Form)),
      _ => {}
    }
  }

  for (id, kind) in &entries {
    if matches!(kind, XObjectKind::Image) {
      if !state.visited.insert(*id) {
        debug!(object = id.0, "image already transformed, skipping");
        continue;
      }
      if state.mode == InversionMode::TextOnly {
        debug!(object = id.0, "text-only mode, image untouched");
        state.report.images_skipped += 1;
        continue;
      }
      images::transform_image(
        doc,
        *id,
        state.mode,
        state.compress_images,
        state.dpi_hint,
        &mut state.report,
      );
    }
  }

  for (id, kind) in &entries {
    if matches!(kind, XObjectKind::Form) {
      if !state.visited.insert(*id) {
        debug!(object = id.0, "form already rewritten, skipping");
        continue;
      }
      // The form's own stream is rewritten before anything it references.
      rewrite_stream_contents(doc, *id, state);
      if let Some(nested) = stream_resources(doc, *id) {
        process_resources(doc, &nested, state);
      }
    }
  }
}

/// Rewrite the operations of a standalone content stream (form XObject or
/// annotation appearance), keeping its dictionary. No background prelude:
/// only pages get one.
fn rewrite_stream_contents(doc: &mut Document, id: ObjectId, state: &mut WalkState) {
  let original = match doc.get_object(id) {
    Ok(Object::Stream(s)) => s.clone(),
    _ => return,
  };

  match stream::decode_operations(&stream::plain_bytes(&original)) {
    Ok(mut content) => {
      ops::rewrite_operations(&mut content.operations, state.mode);
      match stream::rebuild_stream(&original.dict, &content) {
        Ok(rebuilt) => {
          doc.objects.insert(id, Object::Stream(rebuilt));
          state.report.streams_rewritten += 1;
        }
        Err(err) => {
          warn!(object = id.0, %err, "stream re-encode failed, left unchanged");
          state.report.streams_failed += 1;
        }
      }
    }
    Err(err) => {
      warn!(object = id.0, %err, "stream not tokenizable, left unchanged");
      state.report.streams_failed += 1;
    }
  }
}

/// A stream object's own /Resources, resolved to a dictionary.
fn stream_resources(doc: &Document, id: ObjectId) -> Option<Dictionary> {
  let Ok(Object::Stream(s)) = doc.get_object(id) else {
    return None;
  };
  as_dict(doc, s.dict.get(b"Resources").ok()?).cloned()
}

// ── Annotation appearances ──────────────────────────────────────

/// Rewrite every appearance stream reachable from the page's annotations:
/// the normal, rollover and down entries, each either a single stream or a
/// state-name sub-dictionary of streams.
fn process_annotations(doc: &mut Document, page_id: ObjectId, state: &mut WalkState) {
  let Ok(page) = doc.get_dictionary(page_id) else {
    return;
  };
  let annots: Vec<Object> = match page.get(b"Annots") {
    Ok(Object::Array(arr)) => arr.clone(),
    Ok(Object::Reference(id)) => match doc.get_object(*id) {
      Ok(Object::Array(arr)) => arr.clone(),
      _ => return,
    },
    _ => return,
  };

  for entry in annots {
    let annot = match &entry {
      Object::Reference(id) => match doc.get_dictionary(*id) {
        Ok(d) => d.clone(),
        Err(_) => continue,
      },
      Object::Dictionary(d) => d.clone(),
      _ => continue,
    };

    let Some(appearance) = annot.get(b"AP").ok().and_then(|obj| as_dict(doc, obj)).cloned()
    else {
      continue;
    };

    for key in [b"N".as_slice(), b"R".as_slice(), b"D".as_slice()] {
      if let Ok(value) = appearance.get(key) {
        for id in appearance_streams(doc, value) {
          process_appearance_stream(doc, id, state);
        }
      }
    }
  }
}

/// The appearance streams behind one /AP entry: either a direct stream
/// reference or a state-name sub-dictionary of stream references.
fn appearance_streams(doc: &Document, value: &Object) -> Vec<ObjectId> {
  let from_states = |states: &Dictionary| -> Vec<ObjectId> {
    states
      .iter()
      .filter_map(|(_, v)| match v {
        Object::Reference(sid) if matches!(doc.get_object(*sid), Ok(Object::Stream(_))) => {
          Some(*sid)
        }
        _ => None,
      })
      .collect()
  };

  match value {
    Object::Reference(id) => match doc.get_object(*id) {
      Ok(Object::Stream(_)) => vec![*id],
      Ok(Object::Dictionary(states)) => from_states(states),
      _ => Vec::new(),
    },
    Object::Dictionary(states) => from_states(states),
    _ => Vec::new(),
  }
}

/// An appearance stream behaves like a form: rewrite its operations, then
/// walk whatever its own resources reference.
fn process_appearance_stream(doc: &mut Document, id: ObjectId, state: &mut WalkState) {
  if !state.visited.insert(id) {
    debug!(object = id.0, "appearance already rewritten, skipping");
    return;
  }
  rewrite_stream_contents(doc, id, state);
  if let Some(resources) = stream_resources(doc, id) {
    process_resources(doc, &resources, state);
  }
}

// ── Inherited page attributes ───────────────────────────────────

/// Follow at most one level of indirection to a dictionary.
fn as_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
  let target = match obj {
    Object::Reference(id) => doc.get_object(*id).ok()?,
    direct => direct,
  };
  target.as_dict().ok()
}

/// Pages inherit attributes like /Resources and /MediaBox from their
/// ancestors; climb /Parent links until a node carries the key.
fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
  let mut node = page_id;
  loop {
    let dict = doc.get_dictionary(node).ok()?;
    if let Ok(value) = dict.get(key) {
      return Some(value);
    }
    node = match dict.get(b"Parent") {
      Ok(Object::Reference(parent)) => *parent,
      _ => return None,
    };
  }
}

fn page_resources(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
  let found = inherited_attribute(doc, page_id, b"Resources")?;
  as_dict(doc, found).cloned()
}

fn page_media_box(doc: &Document, page_id: ObjectId) -> Option<[f64; 4]> {
  let found = inherited_attribute(doc, page_id, b"MediaBox")?;
  let rect = match found {
    Object::Reference(id) => doc.get_object(*id).ok()?,
    direct => direct,
  };
  parse_rect(rect)
}

fn parse_rect(obj: &Object) -> Option<[f64; 4]> {
  let Object::Array(arr) = obj else {
    return None;
  };
  if arr.len() < 4 {
    return None;
  }
  let mut out = [0.0f64; 4];
  for (slot, item) in out.iter_mut().zip(arr) {
    *slot = match item {
      Object::Integer(v) => *v as f64,
      Object::Real(v) => *v as f64,
      _ => return None,
    };
  }
  Some(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_rect_mixed_number_types() {
    let obj = Object::Array(vec![
      Object::Integer(0),
      Object::Real(0.5),
      Object::Integer(612),
      Object::Real(792.0),
    ]);
    assert_eq!(parse_rect(&obj), Some([0.0, 0.5, 612.0, 792.0]));
  }

  #[test]
  fn parse_rect_rejects_short_and_non_numeric() {
    assert_eq!(parse_rect(&Object::Array(vec![Object::Integer(1)])), None);
    assert_eq!(
      parse_rect(&Object::Array(vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Name(b"bad".to_vec()),
        Object::Integer(10),
      ])),
      None
    );
    assert_eq!(parse_rect(&Object::Integer(3)), None);
  }
}
