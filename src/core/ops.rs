use crate::core::color;
use crate::types::InversionMode;
use lopdf::Object;
use lopdf::content::Operation;

fn operand_value(obj: &Object) -> Option<f64> {
  match obj {
    Object::Integer(i) => Some(*i as f64),
    Object::Real(r) => Some(*r as f64),
    _ => None,
  }
}

fn real(v: f64) -> Object {
  Object::Real(v as f32)
}

/// Rewrite the operands of every color-setting operator in place. Everything
/// else (paths, text, transforms, inline images) passes through untouched,
/// in source order and with operand arity preserved.
pub(crate) fn rewrite_operations(operations: &mut [Operation], mode: InversionMode) {
  for op in operations.iter_mut() {
    rewrite_color_operation(op, mode);
  }
}

fn rewrite_color_operation(op: &mut Operation, mode: InversionMode) {
  match op.operator.as_str() {
    "g" | "G" => {
      if op.operands.len() == 1
        && let Some(v) = operand_value(&op.operands[0])
      {
        op.operands[0] = real(color::map_gray(mode, v));
      }
    }
    "rg" | "RG" => {
      if op.operands.len() == 3
        && let Some(rgb) = fixed_values::<3>(&op.operands)
      {
        for (slot, v) in op.operands.iter_mut().zip(color::map_rgb(mode, rgb)) {
          *slot = real(v);
        }
      }
    }
    "k" | "K" => {
      if op.operands.len() == 4
        && let Some(cmyk) = fixed_values::<4>(&op.operands)
      {
        for (slot, v) in op.operands.iter_mut().zip(color::map_cmyk(mode, cmyk)) {
          *slot = real(v);
        }
      }
    }
    // Color-space-dependent setters. Without simulating cs/CS state the
    // numeric-operand count decides: 1 ⇒ gray, 3 ⇒ RGB, 4 ⇒ CMYK, anything
    // else gets a per-channel inversion. Pattern names stay in place.
    "sc" | "SC" | "scn" | "SCN" => {
      let numeric: Vec<(usize, f64)> = op
        .operands
        .iter()
        .enumerate()
        .filter_map(|(i, o)| operand_value(o).map(|v| (i, v)))
        .collect();

      let mapped: Vec<f64> = match numeric.len() {
        0 => return,
        1 => vec![color::map_gray(mode, numeric[0].1)],
        3 => color::map_rgb(mode, [numeric[0].1, numeric[1].1, numeric[2].1]).to_vec(),
        4 => {
          color::map_cmyk(mode, [numeric[0].1, numeric[1].1, numeric[2].1, numeric[3].1]).to_vec()
        }
        _ => numeric
          .iter()
          .map(|&(_, v)| color::clamp_unit(1.0 - v))
          .collect(),
      };
      for (&(idx, _), v) in numeric.iter().zip(mapped) {
        op.operands[idx] = real(v);
      }
    }
    _ => {}
  }
}

fn fixed_values<const N: usize>(operands: &[Object]) -> Option<[f64; N]> {
  let mut out = [0.0; N];
  for (slot, obj) in out.iter_mut().zip(operands) {
    *slot = operand_value(obj)?;
  }
  Some(out)
}

/// The operations painted ahead of a page's own content: fill the MediaBox
/// with the inverted paper color inside a `q`/`Q` bracket, then reset the
/// fill and stroke colors to the inverted ink.
///
/// The trailing color resets matter as much as the rectangle: the implicit
/// initial color of a content stream is black, and body text that never sets
/// a color would otherwise disappear into the dark background.
pub(crate) fn background_prelude(mode: InversionMode, media_box: [f64; 4]) -> Vec<Operation> {
  let (bg, fg) = color::default_colors(mode);
  let [x1, y1, x2, y2] = media_box;
  let fill: Vec<Object> = bg.iter().map(|&v| real(v)).collect();
  let ink: Vec<Object> = fg.iter().map(|&v| real(v)).collect();

  vec![
    Operation::new("q", vec![]),
    Operation::new("rg", fill),
    Operation::new(
      "re",
      vec![real(x1), real(y1), real(x2 - x1), real(y2 - y1)],
    ),
    Operation::new("f", vec![]),
    Operation::new("Q", vec![]),
    Operation::new("rg", ink.clone()),
    Operation::new("RG", ink),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::InversionMode::*;

  const EPS: f64 = 1e-5;

  fn op(operator: &str, operands: Vec<Object>) -> Operation {
    Operation::new(operator, operands)
  }

  fn values(op: &Operation) -> Vec<f64> {
    op.operands.iter().filter_map(operand_value).collect()
  }

  fn assert_values(op: &Operation, expected: &[f64]) {
    let got = values(op);
    assert_eq!(got.len(), expected.len(), "{op:?}");
    for (g, e) in got.iter().zip(expected) {
      assert!((g - e).abs() < EPS, "{op:?}: {got:?} vs {expected:?}");
    }
  }

  #[test]
  fn rg_inverts_under_full() {
    let mut o = op("rg", vec![0.8.into(), 0.2.into(), 0.1.into()]);
    rewrite_color_operation(&mut o, Full);
    assert_values(&o, &[0.2, 0.8, 0.9]);
  }

  #[test]
  fn gray_inverts_under_grayscale() {
    let mut o = op("g", vec![0.6.into()]);
    rewrite_color_operation(&mut o, Grayscale);
    assert_values(&o, &[0.4]);
  }

  #[test]
  fn integer_operands_are_handled() {
    let mut o = op("sc", vec![1.into(), 1.into(), 1.into()]);
    rewrite_color_operation(&mut o, Full);
    assert_values(&o, &[0.0, 0.0, 0.0]);
  }

  #[test]
  fn cmyk_keeps_arity_four() {
    let mut o = op("k", vec![0.into(), 0.into(), 0.into(), 1.into()]);
    rewrite_color_operation(&mut o, Full);
    assert_eq!(o.operands.len(), 4);
    assert_values(&o, &[0.0, 0.0, 0.0, 0.0]);
  }

  #[test]
  fn scn_single_operand_treated_as_gray() {
    let mut o = op("scn", vec![0.25.into()]);
    rewrite_color_operation(&mut o, Full);
    assert_values(&o, &[0.75]);
  }

  #[test]
  fn scn_pattern_name_preserved_in_place() {
    let mut o = op(
      "scn",
      vec![0.2.into(), 0.4.into(), 0.6.into(), Object::Name(b"P0".to_vec())],
    );
    rewrite_color_operation(&mut o, Full);
    assert_values(&o, &[0.8, 0.6, 0.4]);
    assert_eq!(o.operands[3], Object::Name(b"P0".to_vec()));
    assert_eq!(o.operands.len(), 4);
  }

  #[test]
  fn scn_bare_pattern_name_untouched() {
    let mut o = op("scn", vec![Object::Name(b"P1".to_vec())]);
    rewrite_color_operation(&mut o, Full);
    assert_eq!(o.operands, vec![Object::Name(b"P1".to_vec())]);
  }

  #[test]
  fn sc_unusual_count_inverts_each_channel() {
    let mut o = op("sc", vec![0.1.into(), 0.2.into()]);
    rewrite_color_operation(&mut o, Custom);
    assert_values(&o, &[0.9, 0.8]);
  }

  #[test]
  fn non_color_operators_pass_through() {
    let original = op("cm", vec![1.into(), 0.into(), 0.into(), 1.into(), 10.into(), 20.into()]);
    let mut o = original.clone();
    rewrite_color_operation(&mut o, Full);
    assert_eq!(o.operands, original.operands);
  }

  #[test]
  fn malformed_arity_passes_through() {
    let mut o = op("rg", vec![0.5.into(), 0.5.into()]);
    rewrite_color_operation(&mut o, Full);
    assert_values(&o, &[0.5, 0.5]);
  }

  #[test]
  fn rewrite_preserves_operator_order() {
    let mut ops = vec![
      op("q", vec![]),
      op("rg", vec![1.into(), 1.into(), 1.into()]),
      op("re", vec![0.into(), 0.into(), 10.into(), 10.into()]),
      op("f", vec![]),
      op("Q", vec![]),
    ];
    rewrite_operations(&mut ops, Full);
    let names: Vec<&str> = ops.iter().map(|o| o.operator.as_str()).collect();
    assert_eq!(names, ["q", "rg", "re", "f", "Q"]);
    assert_values(&ops[1], &[0.0, 0.0, 0.0]);
    assert_values(&ops[2], &[0.0, 0.0, 10.0, 10.0]);
  }

  #[test]
  fn prelude_shape_for_full() {
    let ops = background_prelude(Full, [0.0, 0.0, 612.0, 792.0]);
    let names: Vec<&str> = ops.iter().map(|o| o.operator.as_str()).collect();
    assert_eq!(names, ["q", "rg", "re", "f", "Q", "rg", "RG"]);
    assert_values(&ops[1], &[0.0, 0.0, 0.0]);
    assert_values(&ops[2], &[0.0, 0.0, 612.0, 792.0]);
    assert_values(&ops[5], &[1.0, 1.0, 1.0]);
    assert_values(&ops[6], &[1.0, 1.0, 1.0]);
  }

  #[test]
  fn prelude_uses_custom_palette() {
    let ops = background_prelude(Custom, [0.0, 0.0, 595.0, 842.0]);
    assert_values(&ops[1], &[42.0 / 255.0, 42.0 / 255.0, 42.0 / 255.0]);
    assert_values(&ops[5], &[232.0 / 255.0, 232.0 / 255.0, 232.0 / 255.0]);
  }

  #[test]
  fn prelude_rect_offsets_from_media_origin() {
    let ops = background_prelude(Full, [10.0, 20.0, 110.0, 220.0]);
    assert_values(&ops[2], &[10.0, 20.0, 100.0, 200.0]);
  }
}
