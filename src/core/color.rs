use crate::types::InversionMode;

// ── Custom-palette constants (8-bit values over 255) ────────────

const CUSTOM_BG: f64 = 42.0 / 255.0;
const CUSTOM_FG: f64 = 232.0 / 255.0;
const CUSTOM_LIFT: f64 = 30.0 / 255.0;
const CUSTOM_HI: f64 = 0.78;
const CUSTOM_LO: f64 = 0.22;

pub(crate) fn clamp_unit(v: f64) -> f64 {
  v.clamp(0.0, 1.0)
}

/// Rec. 601 luma, the weighting used for both operand- and pixel-level work.
fn luminance(r: f64, g: f64, b: f64) -> f64 {
  0.299 * r + 0.587 * g + 0.114 * b
}

// ── Operand-level transforms (unit-interval floats) ─────────────

/// Remap an RGB triple. All inputs and outputs lie in [0, 1].
pub(crate) fn map_rgb(mode: InversionMode, rgb: [f64; 3]) -> [f64; 3] {
  let [r, g, b] = rgb;
  match mode {
    // Text-only differs from full inversion at the image level (images are
    // skipped entirely), not at the operand level.
    InversionMode::Full | InversionMode::TextOnly => {
      [clamp_unit(1.0 - r), clamp_unit(1.0 - g), clamp_unit(1.0 - b)]
    }
    InversionMode::Grayscale => {
      let v = clamp_unit(1.0 - luminance(r, g, b));
      [v, v, v]
    }
    InversionMode::Custom => {
      let y = luminance(r, g, b);
      if y > CUSTOM_HI {
        [CUSTOM_BG, CUSTOM_BG, CUSTOM_BG]
      } else if y < CUSTOM_LO {
        [CUSTOM_FG, CUSTOM_FG, CUSTOM_FG]
      } else {
        [
          clamp_unit(1.0 - r + CUSTOM_LIFT),
          clamp_unit(1.0 - g + CUSTOM_LIFT),
          clamp_unit(1.0 - b + CUSTOM_LIFT),
        ]
      }
    }
  }
}

/// Remap a single gray level by broadcasting it through the RGB transform.
/// The channels stay equal for every mode, so the red channel is the result.
pub(crate) fn map_gray(mode: InversionMode, gray: f64) -> f64 {
  map_rgb(mode, [gray, gray, gray])[0]
}

/// Remap a CMYK quadruple through an RGB round-trip.
///
/// Inverting the four channels directly is not a perceptual inverse because
/// of the black-generation channel: `1-K` alone turns rich black into rich
/// white plus leftover ink. Instead: naive CMYK→RGB, remap in RGB, then
/// regenerate K from the darkest channel on the way back.
pub(crate) fn map_cmyk(mode: InversionMode, cmyk: [f64; 4]) -> [f64; 4] {
  let [c, m, y, k] = cmyk.map(clamp_unit);
  let rgb = [
    (1.0 - c) * (1.0 - k),
    (1.0 - m) * (1.0 - k),
    (1.0 - y) * (1.0 - k),
  ];
  let [r2, g2, b2] = map_rgb(mode, rgb);

  let k2 = 1.0 - r2.max(g2).max(b2);
  if k2 >= 1.0 {
    return [0.0, 0.0, 0.0, 1.0];
  }
  [
    clamp_unit((1.0 - r2 - k2) / (1.0 - k2)),
    clamp_unit((1.0 - g2 - k2) / (1.0 - k2)),
    clamp_unit((1.0 - b2 - k2) / (1.0 - k2)),
    clamp_unit(k2),
  ]
}

// ── Pixel-level transforms (8-bit channels) ─────────────────────

fn luminance8(px: &[u8]) -> f64 {
  luminance(
    px[0] as f64 / 255.0,
    px[1] as f64 / 255.0,
    px[2] as f64 / 255.0,
  )
}

/// Remap one RGB pixel in place. `px` must hold exactly the three channels;
/// alpha is managed by the caller.
pub(crate) fn map_pixel(mode: InversionMode, px: &mut [u8]) {
  match mode {
    InversionMode::Full => {
      for c in px.iter_mut() {
        *c = 255 - *c;
      }
    }
    InversionMode::Grayscale => {
      let v = 255 - (luminance8(px) * 255.0).round().min(255.0) as u8;
      px.fill(v);
    }
    InversionMode::TextOnly => {
      // Invert only dark pixels (text strokes rendered into the raster);
      // photographs and bright regions pass through.
      let mean = (px[0] as u16 + px[1] as u16 + px[2] as u16) / 3;
      if mean < 128 {
        for c in px.iter_mut() {
          *c = 255 - *c;
        }
      }
    }
    InversionMode::Custom => {
      let y = luminance8(px);
      if y > CUSTOM_HI {
        px.fill((CUSTOM_BG * 255.0) as u8);
      } else if y < CUSTOM_LO {
        px.fill((CUSTOM_FG * 255.0) as u8);
      } else {
        for c in px.iter_mut() {
          *c = (255 - *c).saturating_add((CUSTOM_LIFT * 255.0) as u8);
        }
      }
    }
  }
}

/// The background a processed page is painted with before its own content,
/// and the color text falls back to when the source relied on the default
/// black. RGB in [0, 1].
pub(crate) fn default_colors(mode: InversionMode) -> ([f64; 3], [f64; 3]) {
  match mode {
    InversionMode::Custom => (
      [CUSTOM_BG, CUSTOM_BG, CUSTOM_BG],
      [CUSTOM_FG, CUSTOM_FG, CUSTOM_FG],
    ),
    // Inverted paper is black, inverted ink is white.
    _ => ([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
  }
}
