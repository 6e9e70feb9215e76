//! Strategies for consolidating several labeling passes into one.
use super::Labeling;
use std::collections::{BTreeMap, BTreeSet};

/// Consolidates independent labeling passes, oldest first.
pub trait Reconciler {
    fn name(&self) -> &'static str;
    fn reconcile(&self, passes: &[Labeling]) -> Labeling;
}

/// Per element, the most frequent label wins.
///
/// Ties go to whichever tied label appeared in the most recent pass, so the
/// final (hinted) pass breaks deadlocks. An element labeled by any pass is
/// labeled in the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityVote;

impl Reconciler for MajorityVote {
    fn name(&self) -> &'static str {
        "majority_vote"
    }

    fn reconcile(&self, passes: &[Labeling]) -> Labeling {
        // element -> label -> (votes, last pass seen)
        let mut tallies: BTreeMap<usize, BTreeMap<&str, (usize, usize)>> = BTreeMap::new();
        for (pass_idx, pass) in passes.iter().enumerate() {
            for (element, label) in pass {
                let tally = tallies
                    .entry(*element)
                    .or_default()
                    .entry(label.as_str())
                    .or_insert((0, pass_idx));
                tally.0 += 1;
                tally.1 = pass_idx;
            }
        }
        tallies
            .into_iter()
            .filter_map(|(element, labels)| {
                labels
                    .into_iter()
                    .max_by_key(|(_, (votes, last_seen))| (*votes, *last_seen))
                    .map(|(label, _)| (element, label.to_string()))
            })
            .collect()
    }
}

/// Trust only the most recent pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestPass;

impl Reconciler for LatestPass {
    fn name(&self) -> &'static str {
        "latest_pass"
    }

    fn reconcile(&self, passes: &[Labeling]) -> Labeling {
        passes.last().cloned().unwrap_or_default()
    }
}

/// Fraction of elements labeled in either pass on which both agree.
pub fn agreement(a: &Labeling, b: &Labeling) -> f64 {
    let elements: BTreeSet<usize> = a.keys().chain(b.keys()).copied().collect();
    if elements.is_empty() {
        return 1.0;
    }
    let agreed = elements
        .iter()
        .filter(|element| a.get(element).is_some() && a.get(element) == b.get(element))
        .count();
    agreed as f64 / elements.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeling(pairs: &[(usize, &str)]) -> Labeling {
        pairs
            .iter()
            .map(|(element, label)| (*element, label.to_string()))
            .collect()
    }

    #[test]
    fn majority_wins_per_element() {
        let passes = vec![
            labeling(&[(0, "circle"), (1, "square")]),
            labeling(&[(0, "square"), (1, "square")]),
            labeling(&[(0, "circle")]),
        ];
        let result = MajorityVote.reconcile(&passes);
        assert_eq!(result, labeling(&[(0, "circle"), (1, "square")]));
    }

    #[test]
    fn ties_go_to_most_recent_pass() {
        let passes = vec![
            labeling(&[(0, "circle"), (2, "sun")]),
            labeling(&[(0, "square"), (2, "moon")]),
        ];
        let result = MajorityVote.reconcile(&passes);
        assert_eq!(result, labeling(&[(0, "square"), (2, "moon")]));
    }

    #[test]
    fn any_vote_labels_an_element() {
        let passes = vec![labeling(&[]), labeling(&[(3, "star")]), labeling(&[])];
        assert_eq!(MajorityVote.reconcile(&passes), labeling(&[(3, "star")]));
        assert!(MajorityVote.reconcile(&[]).is_empty());
    }

    #[test]
    fn latest_pass_ignores_history() {
        let passes = vec![labeling(&[(0, "a")]), labeling(&[(1, "b")])];
        assert_eq!(LatestPass.reconcile(&passes), labeling(&[(1, "b")]));
    }

    #[test]
    fn agreement_counts_matching_labels() {
        let a = labeling(&[(0, "x"), (1, "y")]);
        let b = labeling(&[(0, "x"), (1, "z"), (2, "w")]);
        assert!((agreement(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert!((agreement(&Labeling::new(), &Labeling::new()) - 1.0).abs() < 1e-9);
    }
}
