// ── Request / report types (library boundary) ───────────────────

/// How colors are remapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InversionMode {
  /// Invert every channel: `c → 1-c`.
  #[default]
  Full,
  /// Collapse to inverted luminance: `(r,g,b) → (1-Y, 1-Y, 1-Y)`.
  Grayscale,
  /// Invert vectors and text like `Full`, leave raster images alone.
  TextOnly,
  /// Three-zone dark-theme palette: bright → dark gray background,
  /// dark → light gray foreground, midtones softly inverted.
  Custom,
}

/// Which pages to process (and keep) — 1-based in the custom grammar.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageRange {
  #[default]
  All,
  Odd,
  Even,
  /// Comma-separated pages and ranges, e.g. `"2-3,7"`. An empty or
  /// malformed selector falls back to `All`.
  Custom(String),
}

/// Processing options. `Default` gives full inversion of every page with
/// lossless image write-back at the 300 DPI quality tier.
#[derive(Debug, Clone)]
pub struct InvertRequest {
  pub mode: InversionMode,
  pub range: PageRange,
  /// Re-encode opaque images as JPEG instead of deflated raw samples.
  pub compress_images: bool,
  /// Nominal output density. Hints below 300 downscale images by
  /// `hint/300`; for JPEG quality the hint snaps to the nearest of
  /// 150, 300 or 600.
  pub output_dpi_hint: u32,
}

impl Default for InvertRequest {
  fn default() -> Self {
    InvertRequest {
      mode: InversionMode::Full,
      range: PageRange::All,
      compress_images: false,
      output_dpi_hint: 300,
    }
  }
}

/// What a processing run touched. Counters only; per-item details go to the
/// log stream as they happen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvertReport {
  /// Pages the walker visited.
  pub pages_processed: u32,
  /// Content streams rewritten (pages, forms, annotation appearances).
  pub streams_rewritten: u32,
  /// Streams left unchanged because tokenizing or re-encoding failed.
  pub streams_failed: u32,
  /// Raster images decoded, transformed and substituted.
  pub images_transformed: u32,
  /// Images deliberately left alone (stencil masks, text-only mode).
  pub images_skipped: u32,
  /// Images left unchanged because decode or re-encode failed.
  pub images_failed: u32,
  /// Pages abandoned mid-walk on an unexpected error.
  pub pages_failed: u32,
}

const DPI_TIERS: [u32; 3] = [150, 300, 600];

/// Snap an arbitrary DPI hint to the nearest supported tier; ties go up.
pub(crate) fn snap_dpi(hint: u32) -> u32 {
  let mut best = DPI_TIERS[0];
  for &tier in &DPI_TIERS[1..] {
    if tier.abs_diff(hint) <= best.abs_diff(hint) {
      best = tier;
    }
  }
  best
}

/// JPEG quality for a (snapped) DPI tier.
pub(crate) fn jpeg_quality(dpi: u32) -> u8 {
  match dpi {
    150 => 70,
    600 => 92,
    _ => 85,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn snap_exact_tiers() {
    assert_eq!(snap_dpi(150), 150);
    assert_eq!(snap_dpi(300), 300);
    assert_eq!(snap_dpi(600), 600);
  }

  #[test]
  fn snap_nearest() {
    assert_eq!(snap_dpi(72), 150);
    assert_eq!(snap_dpi(200), 150);
    assert_eq!(snap_dpi(280), 300);
    assert_eq!(snap_dpi(500), 600);
    assert_eq!(snap_dpi(1200), 600);
  }

  #[test]
  fn snap_ties_go_up() {
    assert_eq!(snap_dpi(225), 300);
    assert_eq!(snap_dpi(450), 600);
  }

  #[test]
  fn quality_tiers() {
    assert_eq!(jpeg_quality(150), 70);
    assert_eq!(jpeg_quality(300), 85);
    assert_eq!(jpeg_quality(600), 92);
  }

  #[test]
  fn default_request() {
    let req = InvertRequest::default();
    assert_eq!(req.mode, InversionMode::Full);
    assert_eq!(req.range, PageRange::All);
    assert!(!req.compress_images);
    assert_eq!(req.output_dpi_hint, 300);
  }
}
