use crate::types::PageRange;
use std::collections::BTreeSet;
use tracing::warn;

/// Resolve a range selector to the sorted 0-based page indices to process.
///
/// Custom selectors use 1-based pages: `"2-3,7"`, with `a-b` bounds swapped
/// when reversed and out-of-bounds entries dropped. A selector that does not
/// parse at all yields the empty list, which the caller widens to every page.
pub(crate) fn select_pages(range: &PageRange, total: u32) -> Vec<u32> {
  match range {
    PageRange::All => (0..total).collect(),
    PageRange::Odd => (0..total).step_by(2).collect(),
    PageRange::Even => (0..total).skip(1).step_by(2).collect(),
    PageRange::Custom(selector) => match parse_custom(selector, total) {
      Some(indices) => indices,
      None => {
        warn!(%selector, "unparsable page range, falling back to all pages");
        Vec::new()
      }
    },
  }
}

/// Parse `part ("," part)*` where `part := N | N-N`, 1-based, whitespace
/// ignored. Returns `None` when any part violates the grammar.
fn parse_custom(selector: &str, total: u32) -> Option<Vec<u32>> {
  let cleaned: String = selector.chars().filter(|c| !c.is_whitespace()).collect();
  if cleaned.is_empty() {
    return None;
  }

  let mut selected = BTreeSet::new();
  for part in cleaned.split(',') {
    let (lo, hi) = match part.split_once('-') {
      Some((a, b)) => {
        let a: u32 = a.parse().ok()?;
        let b: u32 = b.parse().ok()?;
        if a <= b { (a, b) } else { (b, a) }
      }
      None => {
        let n: u32 = part.parse().ok()?;
        (n, n)
      }
    };
    if lo == 0 {
      return None;
    }
    for page in lo..=hi {
      if page <= total {
        selected.insert(page - 1);
      }
    }
  }

  Some(selected.into_iter().collect())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn all_pages() {
    assert_eq!(select_pages(&PageRange::All, 4), vec![0, 1, 2, 3]);
    assert_eq!(select_pages(&PageRange::All, 0), Vec::<u32>::new());
  }

  #[test]
  fn odd_pages_are_first_third_fifth() {
    assert_eq!(select_pages(&PageRange::Odd, 5), vec![0, 2, 4]);
  }

  #[test]
  fn even_pages_are_second_fourth() {
    assert_eq!(select_pages(&PageRange::Even, 5), vec![1, 3]);
    assert_eq!(select_pages(&PageRange::Even, 1), Vec::<u32>::new());
  }

  #[test]
  fn custom_singles_and_ranges() {
    let range = PageRange::Custom("2-3,7".into());
    assert_eq!(select_pages(&range, 10), vec![1, 2, 6]);
  }

  #[test]
  fn custom_whitespace_ignored() {
    let range = PageRange::Custom(" 1 , 3 - 4 ".into());
    assert_eq!(select_pages(&range, 5), vec![0, 2, 3]);
  }

  #[test]
  fn custom_reversed_bounds_swap() {
    let range = PageRange::Custom("5-2".into());
    assert_eq!(select_pages(&range, 10), vec![1, 2, 3, 4]);
  }

  #[test]
  fn custom_out_of_bounds_dropped() {
    let range = PageRange::Custom("1,9,12-14".into());
    assert_eq!(select_pages(&range, 3), vec![0]);
  }

  #[test]
  fn custom_duplicates_collapse() {
    let range = PageRange::Custom("2,2,1-3,3".into());
    assert_eq!(select_pages(&range, 5), vec![0, 1, 2]);
  }

  #[test]
  fn custom_empty_yields_empty() {
    assert_eq!(select_pages(&PageRange::Custom(String::new()), 5), Vec::<u32>::new());
    assert_eq!(select_pages(&PageRange::Custom("  ".into()), 5), Vec::<u32>::new());
  }

  #[test]
  fn custom_malformed_voids_selector() {
    for bad in ["abc", "1,x", "1--3", "-2", "3-", "1;2", "0", "0-2"] {
      let range = PageRange::Custom(bad.into());
      assert_eq!(select_pages(&range, 5), Vec::<u32>::new(), "selector {bad:?}");
    }
  }
}
