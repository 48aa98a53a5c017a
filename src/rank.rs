//! Top-K label ranking.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;

use crate::iter::zip_exact;
use crate::labels::LabelSet;
use crate::num::TotalF32;

/// A label together with its smoothed score.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub label: String,
    pub score: f32,
}

/// The highest-scoring labels of a frame, in descending score order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedReport {
    entries: Vec<RankedEntry>,
}

impl RankedReport {
    /// Returns the ranked entries, best first.
    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Renders one newline-terminated `label:  score` line per entry, best label first.
impl fmt::Display for RankedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}:  {:.2}", entry.label, entry.score)?;
        }
        Ok(())
    }
}

/// Heap entry ordered by score. Among equal scores the *higher* index compares smaller,
/// so eviction removes later labels first and ties resolve stably in favor of earlier
/// label-set entries.
struct Candidate<'a> {
    score: TotalF32,
    index: usize,
    label: &'a str,
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Selects the `k` highest-scoring labels without sorting the full score vector.
///
/// `scores` must be index-aligned with `labels`. All label/score pairs are pushed into a
/// bounded min-heap; whenever it outgrows `k` the worst entry is evicted. An empty label
/// set yields an empty report, and fewer than `k` labels yield that many entries.
///
/// # Panics
///
/// Panics if `labels` and `scores` have different lengths.
pub fn top_k(labels: &LabelSet, scores: &[f32], k: usize) -> RankedReport {
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (index, (label, &score)) in zip_exact(labels.iter(), scores).enumerate() {
        heap.push(Reverse(Candidate {
            score: TotalF32(score),
            index,
            label,
        }));
        if heap.len() > k {
            heap.pop();
        }
    }

    let mut entries = Vec::with_capacity(heap.len());
    while let Some(Reverse(candidate)) = heap.pop() {
        entries.push(RankedEntry {
            label: candidate.label.to_owned(),
            score: candidate.score.0,
        });
    }
    entries.reverse();
    RankedReport { entries }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_descending_and_drops_the_worst() {
        let labels = LabelSet::parse("A,B,C,D");
        let report = top_k(&labels, &[0.10, 0.90, 0.50, 0.20], 3);
        assert_eq!(report.to_string(), "B:  0.90\nC:  0.50\nD:  0.20\n");
    }

    #[test]
    fn fewer_labels_than_k() {
        let labels = LabelSet::parse("yes,no");
        let report = top_k(&labels, &[0.2, 0.8], 3);
        assert_eq!(report.entries().len(), 2);
        assert_eq!(report.to_string(), "no:  0.80\nyes:  0.20\n");
    }

    #[test]
    fn empty_label_set_yields_empty_report() {
        let labels = LabelSet::parse("");
        let report = top_k(&labels, &[], 3);
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "");
    }

    #[test]
    fn k_zero_yields_empty_report() {
        let labels = LabelSet::parse("a,b");
        assert!(top_k(&labels, &[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn ties_resolve_by_label_order() {
        let labels = LabelSet::parse("a,b,c,d");
        let report = top_k(&labels, &[0.5, 0.5, 0.5, 0.5], 2);
        let names: Vec<_> = report.entries().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn matches_full_sort_on_random_scores() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let labels = LabelSet::parse(&(0..20).map(|i| i.to_string()).collect::<Vec<_>>().join(","));
        for _ in 0..100 {
            let scores: Vec<f32> = (0..20).map(|_| rng.f32()).collect();
            let report = top_k(&labels, &scores, 3);

            assert_eq!(report.entries().len(), 3);
            for pair in report.entries().windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }

            let mut sorted = scores.clone();
            sorted.sort_by(|a, b| b.total_cmp(a));
            let expected: Vec<f32> = sorted[..3].to_vec();
            let actual: Vec<f32> = report.entries().iter().map(|e| e.score).collect();
            assert_eq!(actual, expected);
        }
    }
}
