//! Brute-force Hamming matching with cross-check

use super::features::Descriptor;

/// A mutual nearest-neighbour pair of descriptor indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correspondence {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

/// Index and distance of the nearest descriptor in `candidates`; ties keep the first
fn nearest(descriptor: &Descriptor, candidates: &[Descriptor]) -> Option<(usize, u32)> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, descriptor.hamming(c)))
        .min_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
}

/// Match every query descriptor to its nearest train descriptor, keeping only
/// pairs that are also nearest in the reverse direction
///
/// Each query and each train descriptor appears in at most one correspondence.
pub fn cross_check_match(query: &[Descriptor], train: &[Descriptor]) -> Vec<Correspondence> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }

    let reverse: Vec<Option<usize>> = train
        .iter()
        .map(|t| nearest(t, query).map(|(i, _)| i))
        .collect();

    query
        .iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            let (ti, distance) = nearest(q, train)?;
            (reverse[ti] == Some(qi)).then_some(Correspondence {
                query: qi,
                train: ti,
                distance,
            })
        })
        .collect()
}
