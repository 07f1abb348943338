use crate::core::color;
use crate::types::{InversionMode, InvertReport, jpeg_quality, snap_dpi};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage, imageops};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use rayon::prelude::*;
use std::io::Cursor;
use tracing::{debug, warn};

enum Outcome {
  Transformed,
  Skipped(&'static str),
}

/// Decode one image XObject, remap its pixels for `mode`, re-encode and
/// substitute it. Failures leave the object untouched; both skips and
/// failures are logged and counted.
pub(crate) fn transform_image(
  doc: &mut Document,
  id: ObjectId,
  mode: InversionMode,
  compress: bool,
  dpi_hint: u32,
  report: &mut InvertReport,
) {
  match try_transform(doc, id, mode, compress, dpi_hint) {
    Ok(Outcome::Transformed) => report.images_transformed += 1,
    Ok(Outcome::Skipped(reason)) => {
      debug!(object = id.0, reason, "image left unchanged");
      report.images_skipped += 1;
    }
    Err(reason) => {
      warn!(object = id.0, %reason, "image transform failed, keeping original");
      report.images_failed += 1;
    }
  }
}

fn try_transform(
  doc: &mut Document,
  id: ObjectId,
  mode: InversionMode,
  compress: bool,
  dpi_hint: u32,
) -> Result<Outcome, String> {
  let stream = match doc.get_object(id) {
    Ok(Object::Stream(s)) => s.clone(),
    _ => return Err("object is not a stream".into()),
  };

  // A stencil mask paints the current fill color wherever its bits are set;
  // its pixels carry coverage, not color, and must stay byte-identical.
  if matches!(stream.dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
    return Ok(Outcome::Skipped("stencil mask"));
  }

  let source = SourceImage::from_stream(doc, &stream)?;
  let rgb = source.decode(doc, &stream).ok_or_else(|| {
    format!(
      "cannot decode image ({}x{}, {} bpc)",
      source.width, source.height, source.bits
    )
  })?;

  let masked = stream.dict.has(b"SMask");
  let alpha = if masked {
    alpha_channel(doc, &stream.dict)
  } else {
    None
  };

  let (w, h) = rgb.dimensions();
  let mut raw = rgb.into_raw();

  raw
    .par_chunks_exact_mut(3)
    .for_each(|px| color::map_pixel(mode, px));

  // Fully transparent pixels carry no visible color; write them as zero so
  // the transform cannot bleed through antialiased mask edges.
  if let Some(mask) = &alpha
    && mask.len() >= (w * h) as usize
  {
    for (i, &a) in mask.iter().take((w * h) as usize).enumerate() {
      if a == 0 {
        raw[i * 3..i * 3 + 3].fill(0);
      }
    }
  }

  let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
    ImageBuffer::from_raw(w, h, raw).ok_or("pixel buffer size mismatch")?;

  // Downscale (never upscale) when the caller asked for a low-DPI output.
  // The ratio follows the raw hint; snapping only picks the quality tier.
  let buffer = if dpi_hint < 300 {
    let scale = dpi_hint as f32 / 300.0;
    let nw = ((w as f32 * scale).round() as u32).max(1);
    let nh = ((h as f32 * scale).round() as u32).max(1);
    imageops::resize(&buffer, nw, nh, imageops::FilterType::Triangle)
  } else {
    buffer
  };
  let (out_w, out_h) = buffer.dimensions();

  let mut dict = stream.dict.clone();
  dict.remove(b"Filter");
  dict.remove(b"DecodeParms");
  dict.remove(b"Decode");
  dict.remove(b"Length");
  dict.set("Width", out_w as i64);
  dict.set("Height", out_h as i64);
  dict.set("ColorSpace", "DeviceRGB");
  dict.set("BitsPerComponent", 8);

  let new_stream = if compress && !masked {
    let mut jpeg = Cursor::new(Vec::new());
    let quality = jpeg_quality(snap_dpi(dpi_hint));
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
      .encode_image(&buffer)
      .map_err(|e| format!("jpeg encode failed: {e}"))?;
    dict.set("Filter", "DCTDecode");
    Stream::new(dict, jpeg.into_inner()).with_compression(false)
  } else {
    // Lossless: deflated raw samples; an existing soft mask stays in the
    // dictionary untouched, so the alpha channel survives as-is.
    let mut s = Stream::new(dict, buffer.into_raw());
    let _ = s.compress();
    s
  };

  doc.objects.insert(id, Object::Stream(new_stream));
  Ok(Outcome::Transformed)
}

// ── Source image model ──────────────────────────────────────────

/// Everything the pipeline needs to know about an embedded raster before a
/// byte of payload is touched, probed once from the stream dictionary.
struct SourceImage {
  width: u32,
  height: u32,
  bits: u32,
  coding: Coding,
  /// `None` for color models the remapper cannot normalize (Indexed,
  /// Separation, Lab); decoding such samples fails instead of guessing.
  color: Option<SourceColor>,
}

/// Sample layouts the remapper can widen to 3-byte RGB pixels.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SourceColor {
  Gray,
  Rgb,
  Cmyk,
}

impl SourceColor {
  fn channels(self) -> u32 {
    match self {
      SourceColor::Gray => 1,
      SourceColor::Rgb => 3,
      SourceColor::Cmyk => 4,
    }
  }
}

/// How the payload bytes are encoded.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Coding {
  Jpeg,
  Jpeg2000,
  Samples { deflated: bool },
}

impl SourceImage {
  fn from_stream(doc: &Document, stream: &Stream) -> Result<SourceImage, String> {
    let dict = &stream.dict;
    let width = dict.get(b"Width").and_then(Object::as_i64).unwrap_or(0);
    let height = dict.get(b"Height").and_then(Object::as_i64).unwrap_or(0);
    if width <= 0 || height <= 0 {
      return Err("missing or zero dimensions".into());
    }
    let bits = dict.get(b"BitsPerComponent").and_then(Object::as_i64).unwrap_or(8);

    Ok(SourceImage {
      width: width as u32,
      height: height as u32,
      bits: bits.clamp(1, 16) as u32,
      coding: coding_of(dict),
      color: color_of(doc, dict),
    })
  }

  /// Decode the payload to the RGB raster the per-pixel remapper runs over.
  fn decode(&self, doc: &Document, stream: &Stream) -> Option<RgbImage> {
    match self.coding {
      Coding::Jpeg => image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
        .ok()
        .map(|img| img.to_rgb8()),
      Coding::Jpeg2000 => {
        let jp2 = hayro_jpeg2000::Image::new(
          &stream.content,
          &hayro_jpeg2000::DecodeSettings::default(),
        )
        .ok()?;
        Some(DynamicImage::from_decoder(jp2).ok()?.to_rgb8())
      }
      Coding::Samples { .. } => {
        let color = self.color?;
        let samples = self.samples(doc, stream)?;
        RgbImage::from_raw(self.width, self.height, widen_to_rgb(color, samples))
      }
    }
  }

  /// Raw samples inflated, un-predicted and normalized to one byte per
  /// channel, ready for `widen_to_rgb`.
  ///
  /// lopdf's own `decompress()` tries to reverse predictors internally and
  /// corrupts some real-world streams, so the inflate and the predictor
  /// reversal are done here; lopdf is only the fallback for exotic chains.
  fn samples(&self, doc: &Document, stream: &Stream) -> Option<Vec<u8>> {
    let Coding::Samples { deflated } = self.coding else {
      return None;
    };
    let channels = self.color?.channels();

    let data = if deflated {
      inflate_stream(&stream.content).or_else(|| stream.decompressed_content().ok())?
    } else {
      stream.content.clone()
    };

    let row_stride = ((self.width * channels * self.bits).div_ceil(8)) as usize;
    let group = ((channels * self.bits) / 8).max(1) as usize;
    let data = undo_predictor(data, declared_predictor(doc, &stream.dict), group, row_stride)?;

    normalize_bit_depth(&data, self.width, self.height, channels, self.bits)
  }
}

// ── Dictionary probes ───────────────────────────────────────────

/// The innermost filter decides how the payload decodes; FlateDecode
/// anywhere in the chain means the samples need inflating first.
fn coding_of(dict: &Dictionary) -> Coding {
  let (innermost, deflated) = match dict.get(b"Filter") {
    Ok(Object::Name(n)) => (Some(n.as_slice()), n == b"FlateDecode"),
    Ok(Object::Array(chain)) => {
      let names: Vec<&[u8]> = chain
        .iter()
        .filter_map(|o| match o {
          Object::Name(n) => Some(n.as_slice()),
          _ => None,
        })
        .collect();
      (
        names.last().copied(),
        names.iter().any(|n| *n == b"FlateDecode"),
      )
    }
    _ => (None, false),
  };

  match innermost {
    Some(b"DCTDecode") => Coding::Jpeg,
    Some(b"JPXDecode") => Coding::Jpeg2000,
    _ => Coding::Samples { deflated },
  }
}

/// Classify /ColorSpace into the layouts the remapper handles. ICCBased
/// spaces are classified by the profile's /N channel count.
fn color_of(doc: &Document, dict: &Dictionary) -> Option<SourceColor> {
  let entry = match dict.get(b"ColorSpace") {
    Ok(Object::Reference(id)) => doc.get_object(*id).ok()?,
    Ok(direct) => direct,
    // JPEG and JPX carry their own model; bare samples default to RGB.
    Err(_) => return Some(SourceColor::Rgb),
  };

  match entry {
    Object::Name(n) => named_color(n),
    Object::Array(parts) => match parts.first() {
      Some(Object::Name(n)) if n == b"ICCBased" => {
        let Some(Object::Reference(profile)) = parts.get(1) else {
          return Some(SourceColor::Rgb);
        };
        let n = match doc.get_object(*profile) {
          Ok(Object::Stream(s)) => s.dict.get(b"N").and_then(Object::as_i64).unwrap_or(3),
          _ => 3,
        };
        Some(match n {
          1 => SourceColor::Gray,
          4 => SourceColor::Cmyk,
          _ => SourceColor::Rgb,
        })
      }
      // [/CalRGB <<...>>] and friends: the leading name is enough.
      Some(Object::Name(n)) => named_color(n),
      _ => None,
    },
    _ => None,
  }
}

fn named_color(name: &[u8]) -> Option<SourceColor> {
  match name {
    b"DeviceGray" | b"CalGray" | b"G" => Some(SourceColor::Gray),
    b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(SourceColor::Rgb),
    b"DeviceCMYK" | b"CMYK" => Some(SourceColor::Cmyk),
    _ => None,
  }
}

/// The /Predictor declared by /DecodeParms, following indirect references
/// and per-filter parameter arrays; 1 (no predictor) when absent.
fn declared_predictor(doc: &Document, dict: &Dictionary) -> i64 {
  fn probe(doc: &Document, obj: &Object, depth: u8) -> Option<i64> {
    if depth == 0 {
      return None;
    }
    match obj {
      Object::Dictionary(d) => d.get(b"Predictor").and_then(Object::as_i64).ok(),
      Object::Reference(id) => probe(doc, doc.get_object(*id).ok()?, depth - 1),
      Object::Array(items) => items.iter().find_map(|item| probe(doc, item, depth - 1)),
      _ => None,
    }
  }

  dict
    .get(b"DecodeParms")
    .ok()
    .and_then(|obj| probe(doc, obj, 4))
    .unwrap_or(1)
}

// ── Sample decoding ─────────────────────────────────────────────

/// Inflate a deflated payload. PDF streams are normally zlib-wrapped, but
/// some writers emit bare deflate.
fn inflate_stream(data: &[u8]) -> Option<Vec<u8>> {
  use flate2::read::{DeflateDecoder, ZlibDecoder};
  use std::io::Read;

  let mut out = Vec::new();
  match ZlibDecoder::new(data).read_to_end(&mut out) {
    Ok(_) => Some(out),
    Err(_) => {
      out.clear();
      DeflateDecoder::new(data).read_to_end(&mut out).ok().map(|_| out)
    }
  }
}

/// Reverse the declared predictor. TIFF horizontal differencing (2) works in
/// place; PNG row filters (10-15) reconstruct each byte from its left, up
/// and up-left neighbors in the already-reconstructed output, consuming the
/// per-row filter tag. Unknown predictors pass the data through.
fn undo_predictor(data: Vec<u8>, predictor: i64, group: usize, row_stride: usize) -> Option<Vec<u8>> {
  // The nearest of the three neighbors to their linear prediction.
  fn nearest(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let (pa, pb, pc) = ((p - a as i16).abs(), (p - b as i16).abs(), (p - c as i16).abs());
    if pa <= pb && pa <= pc {
      a
    } else if pb <= pc {
      b
    } else {
      c
    }
  }

  match predictor {
    2 => {
      let mut data = data;
      for row in data.chunks_exact_mut(row_stride.max(1)) {
        for i in group..row.len() {
          row[i] = row[i].wrapping_add(row[i - group]);
        }
      }
      Some(data)
    }
    10..=15 => {
      if row_stride == 0 || !data.len().is_multiple_of(row_stride + 1) {
        return None;
      }
      let rows = data.len() / (row_stride + 1);
      let mut out = vec![0u8; rows * row_stride];

      for (r, src) in data.chunks_exact(row_stride + 1).enumerate() {
        let start = r * row_stride;
        for i in 0..row_stride {
          let left = if i >= group { out[start + i - group] } else { 0 };
          let up = if r > 0 { out[start + i - row_stride] } else { 0 };
          let up_left = if r > 0 && i >= group {
            out[start + i - row_stride - group]
          } else {
            0
          };
          let delta = match src[0] {
            0 => 0,
            1 => left,
            2 => up,
            3 => ((left as u16 + up as u16) / 2) as u8,
            4 => nearest(left, up, up_left),
            _ => return None,
          };
          out[start + i] = src[1 + i].wrapping_add(delta);
        }
      }
      Some(out)
    }
    _ => Some(data),
  }
}

/// Reduce samples to one byte per channel: 16-bit keeps the high byte,
/// sub-byte grayscale rows are unpacked bit by bit.
fn normalize_bit_depth(
  data: &[u8],
  width: u32,
  height: u32,
  channels: u32,
  bits: u32,
) -> Option<Vec<u8>> {
  match bits {
    8 => {
      let expected = (width * height * channels) as usize;
      if data.len() < expected {
        return None;
      }
      Some(data[..expected].to_vec())
    }
    16 => {
      let expected = (width * height * channels * 2) as usize;
      if data.len() < expected {
        return None;
      }
      Some(data[..expected].iter().step_by(2).copied().collect())
    }
    1 | 2 | 4 if channels == 1 => expand_gray_bits(data, width, height, bits),
    _ => None,
  }
}

/// Unpack 1/2/4-bit grayscale rows (byte-aligned per row) to 8-bit samples.
fn expand_gray_bits(content: &[u8], width: u32, height: u32, bits: u32) -> Option<Vec<u8>> {
  let row_bytes = ((width * bits).div_ceil(8)) as usize;
  if content.len() < row_bytes * height as usize {
    return None;
  }
  let max = (1u16 << bits) - 1;
  let mut out = Vec::with_capacity((width * height) as usize);

  for row in content[..row_bytes * height as usize].chunks_exact(row_bytes) {
    for x in 0..width as usize {
      let bit_pos = x * bits as usize;
      let byte = row[bit_pos / 8];
      let shift = 8 - bits as usize - (bit_pos % 8);
      let value = ((byte >> shift) as u16) & max;
      out.push((value * 255 / max) as u8);
    }
  }

  Some(out)
}

/// Spread normalized samples into the 3-byte pixels the remapper works on:
/// gray replicates, CMYK collapses through its naive RGB projection.
fn widen_to_rgb(color: SourceColor, samples: Vec<u8>) -> Vec<u8> {
  match color {
    SourceColor::Rgb => samples,
    SourceColor::Gray => samples.iter().flat_map(|&v| [v, v, v]).collect(),
    SourceColor::Cmyk => samples
      .chunks_exact(4)
      .flat_map(|px| {
        let k = px[3] as f32 / 255.0;
        [0usize, 1, 2].map(|i| (255.0 * (1.0 - px[i] as f32 / 255.0) * (1.0 - k)) as u8)
      })
      .collect(),
  }
}

/// The alpha samples behind the image's soft mask, decoded through the same
/// pipeline as the image itself (red channel of the widened raster). The
/// mask object is never modified.
fn alpha_channel(doc: &Document, dict: &Dictionary) -> Option<Vec<u8>> {
  let Ok(Object::Reference(id)) = dict.get(b"SMask") else {
    return None;
  };
  let Ok(Object::Stream(mask)) = doc.get_object(*id) else {
    return None;
  };
  let source = SourceImage::from_stream(doc, mask).ok()?;
  let rgb = source.decode(doc, mask)?;
  Some(rgb.into_raw().into_iter().step_by(3).collect())
}
