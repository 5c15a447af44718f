use crate::models::{Element, ElementCategory};
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_TABLE_MATCH_THRESHOLD: f64 = 70.0;

/// Attaches HTML renderings to locally parsed tables.
///
/// Each `Table` element is compared against every API table by [`partial_ratio`]
/// over trimmed text. The best-scoring API table (first one wins ties) donates its
/// `text_as_html` when the score reaches `threshold`. Returns how many tables were
/// enriched.
pub fn enrich_tables_with_html(
    elements: &mut [Element],
    api_tables: &[Element],
    threshold: f64,
) -> usize {
    let mut enriched = 0;

    for element in elements
        .iter_mut()
        .filter(|element| element.category == ElementCategory::Table)
    {
        let local_text = element.text.trim();

        let mut best: Option<&Element> = None;
        let mut best_score = 0.0;
        for candidate in api_tables {
            let score = partial_ratio(local_text, candidate.text.trim());
            if score > best_score {
                best = Some(candidate);
                best_score = score;
            }
        }

        if let Some(html) = best
            .filter(|_| best_score >= threshold)
            .and_then(|matched| matched.text_as_html.clone())
        {
            debug!(element_id = %element.element_id, score = best_score, "table enriched with html");
            element.text_as_html = Some(html);
            enriched += 1;
        }
    }

    enriched
}

/// Similarity in `[0, 100]` of the shorter string against its best-aligned
/// window of the longer one.
///
/// Full-length windows are only scored when their character histogram leaves
/// room to beat the best score so far. Windows hanging off either end are scored
/// in a single pass per side.
pub fn partial_ratio(left: &str, right: &str) -> f64 {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();

    let (short, long) = if left.len() <= right.len() {
        (left, right)
    } else {
        (right, left)
    };

    if short.is_empty() {
        return 0.0;
    }

    let m = short.len();
    let n = long.len();
    let forward = LcsMatcher::new(&short);
    let mut best = 0.0f64;

    let mut histogram = WindowHistogram::new(&short);
    for ch in &long[..m] {
        histogram.add(*ch);
    }
    for start in 0..=(n - m) {
        if start > 0 {
            histogram.remove(long[start - 1]);
            histogram.add(long[start + m - 1]);
        }

        if indel_ratio(histogram.overlap, m, m) <= best {
            continue;
        }
        best = best.max(indel_ratio(forward.lcs(&long[start..start + m]), m, m));
        if best >= 100.0 {
            return 100.0;
        }
    }

    // Windows that hang off either end of the longer string.
    for (index, lcs) in forward.prefix_lcs(&long[..m - 1]).into_iter().enumerate() {
        best = best.max(indel_ratio(lcs, m, index + 1));
    }

    let reversed: Vec<char> = short.iter().rev().copied().collect();
    let backward = LcsMatcher::new(&reversed);
    let tail: Vec<char> = long[n - (m - 1)..].iter().rev().copied().collect();
    for (index, lcs) in backward.prefix_lcs(&tail).into_iter().enumerate() {
        best = best.max(indel_ratio(lcs, m, index + 1));
    }

    best
}

fn indel_ratio(lcs: usize, left_len: usize, right_len: usize) -> f64 {
    let total = left_len + right_len;
    if total == 0 {
        return 0.0;
    }
    200.0 * lcs as f64 / total as f64
}

/// Sliding character counts of a window against the pattern's counts.
/// `overlap` bounds the LCS of the window and the pattern from above.
struct WindowHistogram {
    needed: HashMap<char, usize>,
    window: HashMap<char, usize>,
    overlap: usize,
}

impl WindowHistogram {
    fn new(pattern: &[char]) -> Self {
        let mut needed = HashMap::new();
        for ch in pattern {
            *needed.entry(*ch).or_insert(0) += 1;
        }

        Self {
            needed,
            window: HashMap::new(),
            overlap: 0,
        }
    }

    fn add(&mut self, ch: char) {
        let needed = self.needed.get(&ch).copied().unwrap_or(0);
        let count = self.window.entry(ch).or_insert(0);
        if *count < needed {
            self.overlap += 1;
        }
        *count += 1;
    }

    fn remove(&mut self, ch: char) {
        let needed = self.needed.get(&ch).copied().unwrap_or(0);
        if let Some(count) = self.window.get_mut(&ch) {
            *count = count.saturating_sub(1);
            if *count < needed {
                self.overlap -= 1;
            }
        }
    }
}

/// Bit-parallel longest common subsequence against a fixed pattern.
struct LcsMatcher {
    len: usize,
    words: usize,
    masks: HashMap<char, Vec<u64>>,
}

impl LcsMatcher {
    fn new(pattern: &[char]) -> Self {
        let words = pattern.len().div_ceil(64);
        let mut masks: HashMap<char, Vec<u64>> = HashMap::new();
        for (index, ch) in pattern.iter().enumerate() {
            let mask = masks.entry(*ch).or_insert_with(|| vec![0u64; words]);
            mask[index / 64] |= 1u64 << (index % 64);
        }

        Self {
            len: pattern.len(),
            words,
            masks,
        }
    }

    fn step(&self, state: &mut [u64], ch: char) {
        let Some(mask) = self.masks.get(&ch) else {
            return;
        };

        let mut carry = 0u64;
        for (word, matched) in state.iter_mut().zip(mask.iter()) {
            let u = *word & matched;
            let (sum, first) = word.overflowing_add(u);
            let (sum, second) = sum.overflowing_add(carry);
            carry = u64::from(first || second);
            *word = sum | (*word & !matched);
        }
    }

    fn count(&self, state: &[u64]) -> usize {
        let mut unset = 0usize;
        for (index, word) in state.iter().enumerate() {
            let bits = (self.len - index * 64).min(64);
            let relevant = if bits == 64 { *word } else { *word & ((1u64 << bits) - 1) };
            unset += bits - relevant.count_ones() as usize;
        }
        unset
    }

    fn lcs(&self, text: &[char]) -> usize {
        let mut state = vec![u64::MAX; self.words];
        for ch in text {
            self.step(&mut state, *ch);
        }
        self.count(&state)
    }

    /// LCS of the pattern with every prefix of `text`, shortest first.
    fn prefix_lcs(&self, text: &[char]) -> Vec<usize> {
        let mut state = vec![u64::MAX; self.words];
        text.iter()
            .map(|ch| {
                self.step(&mut state, *ch);
                self.count(&state)
            })
            .collect()
    }
}
