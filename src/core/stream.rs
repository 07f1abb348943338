use lopdf::content::Content;
use lopdf::{Dictionary, Stream};

/// Tokenize raw content-stream bytes into operations.
pub(crate) fn decode_operations(bytes: &[u8]) -> lopdf::Result<Content> {
  Content::decode(bytes)
}

/// A stream's decoded payload, or the raw bytes when the filter chain cannot
/// be undone (the caller decides whether raw bytes are usable).
pub(crate) fn plain_bytes(stream: &Stream) -> Vec<u8> {
  stream
    .decompressed_content()
    .unwrap_or_else(|_| stream.content.clone())
}

/// Rebuild a stream object around freshly encoded operations.
///
/// The dictionary is carried over minus the entries describing the old
/// encoding (`Filter`, `DecodeParms`, `Length`); the new payload is written
/// in canonical textual form and deflated.
pub(crate) fn rebuild_stream(dict: &Dictionary, content: &Content) -> lopdf::Result<Stream> {
  let mut dict = dict.clone();
  dict.remove(b"Filter");
  dict.remove(b"DecodeParms");
  dict.remove(b"Length");
  let mut stream = Stream::new(dict, content.encode()?);
  // Failure leaves a valid uncompressed stream behind.
  let _ = stream.compress();
  Ok(stream)
}

#[cfg(test)]
mod tests {
  use super::*;
  use lopdf::content::Operation;
  use lopdf::{Object, dictionary};

  #[test]
  fn rebuild_roundtrips_operations() {
    let content = Content {
      operations: vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![0.25.into(), 0.5.into(), 1.into()]),
        Operation::new("Q", vec![]),
      ],
    };
    let stream = rebuild_stream(&dictionary! {}, &content).unwrap();

    let decoded = decode_operations(&plain_bytes(&stream)).unwrap();
    assert_eq!(decoded.operations.len(), 3);
    assert_eq!(decoded.operations[1].operator, "rg");
    assert_eq!(decoded.operations[1].operands.len(), 3);
  }

  #[test]
  fn rebuild_drops_stale_encoding_entries() {
    let dict = dictionary! {
      "Type" => "XObject",
      "Subtype" => "Form",
      "Filter" => "ASCIIHexDecode",
      "Length" => 999,
    };
    let content = Content {
      operations: vec![Operation::new("n", vec![])],
    };
    let stream = rebuild_stream(&dict, &content).unwrap();

    // Subtype survives; the old filter entry does not linger as ASCIIHex.
    assert_eq!(
      stream.dict.get(b"Subtype").and_then(Object::as_name).unwrap(),
      b"Form"
    );
    if let Ok(filter) = stream.dict.get(b"Filter").and_then(Object::as_name) {
      assert_ne!(filter, b"ASCIIHexDecode");
    }
  }
}
