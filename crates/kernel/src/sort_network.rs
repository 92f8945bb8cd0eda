//! Batcher's odd-even merge sort as a fixed schedule of data-parallel passes.
//!
//! Each pass is gather-only: every slot reads itself and one partner and writes
//! only its own output slot, so a pass maps onto one device dispatch with a
//! ping-pong pair of buffers. [`apply_pass`] is the host rendition of the same
//! per-slot rule the device pass runs.

use crate::neighbor::KeyIndexPair;

/// Key given to padding slots so they sort after every real cell.
pub const PADDING_KEY: i32 = i32::MAX;

/// One merge pass of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortPass {
    /// Width of the sorted runs being merged in this stage.
    pub stage_width: u32,
    /// Offset between compared slots.
    pub compare_width: u32,
}

/// Size of the padded array for `n` elements.
pub fn padded_len(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// Full pass schedule for `n` elements: stage widths double from 1 below the
/// padded length, compare widths halve from the stage width down to 1.
pub fn schedule(n: usize) -> Vec<SortPass> {
    let len = padded_len(n) as u32;
    let mut passes = Vec::new();
    let mut stage_width = 1;
    while stage_width < len {
        let mut compare_width = stage_width;
        while compare_width >= 1 {
            passes.push(SortPass {
                stage_width,
                compare_width,
            });
            compare_width /= 2;
        }
        stage_width *= 2;
    }
    passes
}

/// Partner of `slot` in `pass`, as `(lower, upper)`, or `None` when the slot
/// sits this pass out.
pub fn compare_pair(slot: u32, pass: SortPass, len: u32) -> Option<(u32, u32)> {
    let SortPass {
        stage_width,
        compare_width,
    } = pass;
    let offset = if compare_width == stage_width { 0 } else { compare_width };
    if slot < offset {
        return None;
    }
    let (lower, upper) = if (slot - offset) % (2 * compare_width) < compare_width {
        (slot, slot + compare_width)
    } else {
        (slot - compare_width, slot)
    };
    if upper >= len || lower / (2 * stage_width) != upper / (2 * stage_width) {
        return None;
    }
    Some((lower, upper))
}

/// Run one pass over `input`, returning the next buffer.
pub fn apply_pass(input: &[KeyIndexPair], pass: SortPass) -> Vec<KeyIndexPair> {
    let len = input.len() as u32;
    (0..len)
        .map(|slot| match compare_pair(slot, pass, len) {
            None => input[slot as usize],
            Some((lower, upper)) => {
                let a = input[lower as usize];
                let b = input[upper as usize];
                let (min, max) = if b < a { (b, a) } else { (a, b) };
                if slot == lower {
                    min
                } else {
                    max
                }
            }
        })
        .collect()
}

/// Pad `pairs` to [`padded_len`] and run the whole schedule. Padding carries
/// [`PADDING_KEY`] and indices `n..`, so the first `n` outputs are the sorted input.
pub fn sort_pairs(pairs: &[KeyIndexPair]) -> Vec<KeyIndexPair> {
    let n = pairs.len();
    let mut buffer: Vec<KeyIndexPair> = pairs.to_vec();
    buffer.extend((n..padded_len(n)).map(|i| KeyIndexPair {
        key: PADDING_KEY,
        index: i as i32,
    }));
    for pass in schedule(n) {
        buffer = apply_pass(&buffer, pass);
    }
    buffer.truncate(n);
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs_from_keys(keys: &[i32]) -> Vec<KeyIndexPair> {
        keys.iter()
            .enumerate()
            .map(|(i, &key)| KeyIndexPair { key, index: i as i32 })
            .collect()
    }

    fn check_sorted_permutation(keys: &[i32]) {
        let input = pairs_from_keys(keys);
        let output = sort_pairs(&input);

        assert_eq!(output.len(), input.len());
        assert!(output.windows(2).all(|w| w[0].key <= w[1].key), "{output:?}");

        let mut seen: Vec<i32> = output.iter().map(|p| p.index).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..keys.len() as i32).collect::<Vec<_>>());

        let mut expected = input.clone();
        expected.sort_by_key(|p| p.key);
        assert_eq!(output, expected, "must equal a stable sort");
    }

    #[test]
    fn schedule_sizes() {
        assert!(schedule(0).is_empty());
        assert!(schedule(1).is_empty());
        assert_eq!(schedule(2), vec![SortPass { stage_width: 1, compare_width: 1 }]);
        // log2(P) (log2(P) + 1) / 2 passes
        assert_eq!(schedule(8).len(), 6);
        assert_eq!(schedule(1000).len(), 55);
    }

    #[test]
    fn four_element_network() {
        let len = 4;
        let pairs: Vec<Vec<(u32, u32)>> = schedule(4)
            .into_iter()
            .map(|pass| {
                let mut found: Vec<(u32, u32)> =
                    (0..len).filter_map(|s| compare_pair(s, pass, len)).collect();
                found.dedup();
                found
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                vec![(0, 1), (2, 3)],
                vec![(0, 2), (1, 3)],
                vec![(1, 2)],
            ]
        );
    }

    #[test]
    fn sorts_random_keys() {
        let mut state = 12345_u32;
        for n in [3usize, 17, 64, 100, 257] {
            let keys: Vec<i32> = (0..n)
                .map(|_| {
                    state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    ((state >> 16) % 97) as i32
                })
                .collect();
            check_sorted_permutation(&keys);
        }
    }

    #[test]
    fn sorts_duplicates() {
        check_sorted_permutation(&[5, 5, 5, 1, 1, 5, 0, 0, 5, 1, 1]);
        check_sorted_permutation(&[7; 33]);
    }

    #[test]
    fn sorts_already_sorted() {
        check_sorted_permutation(&(0..50).collect::<Vec<_>>());
    }

    #[test]
    fn sorts_reverse_sorted() {
        check_sorted_permutation(&(0..77).rev().collect::<Vec<_>>());
    }

    #[test]
    fn single_and_empty() {
        check_sorted_permutation(&[]);
        check_sorted_permutation(&[42]);
    }
}
