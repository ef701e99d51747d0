//! Stereo pair detection
//!
//! Four policies turn a list of images into pairs plus leftovers:
//! - strict adjacency, for cameras that shoot a two-frame burst per stereo shot
//! - greedy thresholds, for mixed folders (time window + perceptual similarity)
//! - sequential, consecutive file names taken two at a time
//! - `Left/` + `Right/` folders, zipped by file name
//!
//! Images are matched within their own folder unless grouping is turned off.
//! Every input image ends up exactly once in the output, either in a pair or
//! as a single.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::library::data::seconds_between;
use crate::library::{ImageRecord, Matching, Pair};
use crate::similarity::Similarity;

pub const LEFT_DIR: &str = "Left";
pub const RIGHT_DIR: &str = "Right";

/// How a folder listing is turned into pairs
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PairingMode {
    /// Time window plus perceptual similarity, first fit
    #[default]
    Greedy,
    /// Two-frame bursts with no third frame between them
    Strict,
    /// Consecutive file names, two at a time
    Sequential,
}

impl std::str::FromStr for PairingMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "greedy" | "similarity" => Ok(PairingMode::Greedy),
            "strict" | "burst" => Ok(PairingMode::Strict),
            "sequential" | "single" | "names" => Ok(PairingMode::Sequential),
            other => Err(crate::error::Error::Config(format!(
                "unknown pairing mode '{}'",
                other
            ))),
        }
    }
}

/// Matcher thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    /// Greedy: maximum capture-time gap in seconds
    pub time_diff_threshold: f64,
    /// Greedy: accept when the hash distance is strictly below this
    pub hash_diff_threshold: u32,
    pub mode: PairingMode,
    /// Match each folder's images separately
    pub per_folder: bool,
    /// Strict: shortest accepted gap between the two frames of a burst
    pub min_burst_gap: f64,
    /// Strict: longest accepted gap
    pub max_burst_gap: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            time_diff_threshold: 2.0,
            hash_diff_threshold: 10,
            mode: PairingMode::Greedy,
            per_folder: true,
            min_burst_gap: 1.0,
            max_burst_gap: 4.0,
        }
    }
}

/// Split into (dated records sorted by time, undated records)
///
/// Ties on the timestamp are broken by path so the result is deterministic.
fn sort_by_time(images: &[ImageRecord]) -> (Vec<ImageRecord>, Vec<ImageRecord>) {
    let (mut dated, undated): (Vec<_>, Vec<_>) =
        images.iter().cloned().partition(|r| r.timestamp.is_some());
    dated.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));
    (dated, undated)
}

fn pair_group(images: &[ImageRecord], config: &MatchConfig, oracle: &dyn Similarity) -> Matching {
    match config.mode {
        PairingMode::Greedy => pair_greedy(images, config, oracle),
        PairingMode::Strict => pair_strict(images, config),
        PairingMode::Sequential => pair_sequential(images),
    }
}

/// Pair images with the policy selected by `config`
///
/// With `per_folder` set, each directory is matched on its own (in path order) and
/// the results are concatenated, so no pair spans two folders.
pub fn pair_images(
    images: &[ImageRecord],
    config: &MatchConfig,
    oracle: &dyn Similarity,
) -> Matching {
    let matching = if config.per_folder {
        let mut groups: BTreeMap<&Path, Vec<ImageRecord>> = BTreeMap::new();
        for record in images {
            groups.entry(record.dir()).or_default().push(record.clone());
        }
        let mut matching = Matching::default();
        for (dir, group) in groups {
            log::debug!("Matching {} images in {}", group.len(), dir.display());
            let part = pair_group(&group, config, oracle);
            matching.pairs.extend(part.pairs);
            matching.singles.extend(part.singles);
        }
        matching
    } else {
        pair_group(images, config, oracle)
    };
    log::info!(
        "Matched {} pairs, {} singles from {} images",
        matching.pairs.len(),
        matching.singles.len(),
        images.len()
    );
    matching
}

/// Strict adjacency: consecutive frames `min_burst_gap..=max_burst_gap` seconds apart
///
/// After sorting, adjacent records have no other timestamp strictly between them.
/// An accepted pair advances past both frames; a rejection advances by one.
pub fn pair_strict(images: &[ImageRecord], config: &MatchConfig) -> Matching {
    let (dated, undated) = sort_by_time(images);
    let mut matching = Matching::default();

    let mut i = 0;
    while i < dated.len() {
        if let Some(next) = dated.get(i + 1) {
            let current = &dated[i];
            if let (Some(a), Some(b)) = (current.timestamp, next.timestamp) {
                let gap = seconds_between(a, b);
                if gap >= config.min_burst_gap && gap <= config.max_burst_gap {
                    log::debug!("Burst pair ({:.1}s): {} + {}", gap, current.file_name(), next.file_name());
                    matching.pairs.push(Pair::new(current.clone(), next.clone()));
                    i += 2;
                    continue;
                }
            }
        }
        matching.singles.push(dated[i].clone());
        i += 1;
    }

    matching.singles.extend(undated);
    matching
}

/// Greedy thresholds: first-fit within the time window, never backtracks
pub fn pair_greedy(
    images: &[ImageRecord],
    config: &MatchConfig,
    oracle: &dyn Similarity,
) -> Matching {
    let (dated, undated) = sort_by_time(images);
    let mut used = vec![false; dated.len()];
    let mut matching = Matching::default();

    for i in 0..dated.len() {
        if used[i] {
            continue;
        }
        let a = &dated[i];
        let Some(ta) = a.timestamp else { continue };

        for j in (i + 1)..dated.len() {
            if used[j] {
                continue;
            }
            let b = &dated[j];
            let Some(tb) = b.timestamp else { continue };
            if seconds_between(ta, tb) > config.time_diff_threshold {
                break;
            }

            match oracle.distance(a, b) {
                Ok(d) if d < config.hash_diff_threshold => {
                    log::debug!("Pair (distance {}): {} + {}", d, a.file_name(), b.file_name());
                    used[i] = true;
                    used[j] = true;
                    matching.pairs.push(Pair::new(a.clone(), b.clone()));
                    break;
                }
                Ok(d) => {
                    log::trace!("Not similar (distance {}): {} + {}", d, a.file_name(), b.file_name());
                }
                Err(e) => {
                    log::warn!(
                        "Similarity check failed for {} + {}: {}",
                        a.path.display(),
                        b.path.display(),
                        e
                    );
                }
            }
        }
    }

    matching.singles.extend(
        dated
            .into_iter()
            .zip(used)
            .filter(|(_, used)| !used)
            .map(|(record, _)| record),
    );
    matching.singles.extend(undated);
    matching
}

/// Sequential: sort by path and take consecutive files two at a time
///
/// Timestamps are ignored; an odd last file becomes a single.
pub fn pair_sequential(images: &[ImageRecord]) -> Matching {
    let mut sorted = images.to_vec();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut matching = Matching::default();
    let mut chunks = sorted.chunks_exact(2);
    for chunk in chunks.by_ref() {
        matching.pairs.push(Pair::new(chunk[0].clone(), chunk[1].clone()));
    }
    matching.singles.extend(chunks.remainder().iter().cloned());
    matching
}

/// Pair two pre-separated lists by file name order
///
/// The longer side's surplus becomes singles.
pub fn pair_by_folders(left: &[ImageRecord], right: &[ImageRecord]) -> Matching {
    let mut left = left.to_vec();
    let mut right = right.to_vec();
    left.sort_by_key(|r| r.file_name());
    right.sort_by_key(|r| r.file_name());

    let paired = left.len().min(right.len());
    let mut matching = Matching::default();
    let mut left = left.into_iter();
    let mut right = right.into_iter();
    for (l, r) in left.by_ref().zip(right.by_ref()).take(paired) {
        matching.pairs.push(Pair::new(l, r));
    }
    matching.singles.extend(left);
    matching.singles.extend(right);

    if !matching.singles.is_empty() {
        log::warn!(
            "Left/Right folders differ in size; {} images left unpaired",
            matching.singles.len()
        );
    }
    matching
}

/// Detect a `Left/` + `Right/` layout directly under `root`
pub fn find_folder_layout(root: &Path) -> Option<(PathBuf, PathBuf)> {
    let left = root.join(LEFT_DIR);
    let right = root.join(RIGHT_DIR);
    (left.is_dir() && right.is_dir()).then_some((left, right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::HashMap;

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            + chrono::Duration::milliseconds(secs * 1000)
    }

    fn at_f(secs: f64) -> NaiveDateTime {
        at(0) + chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
    }

    fn rec(name: &str, secs: f64) -> ImageRecord {
        ImageRecord::new(format!("/photos/{}", name), Some(at_f(secs)), 100)
    }

    /// Oracle returning fixed distances keyed by file names (order-insensitive)
    struct FixedDistances {
        distances: HashMap<(String, String), u32>,
        default: u32,
        broken: Option<String>,
    }

    impl FixedDistances {
        fn new(default: u32) -> Self {
            Self {
                distances: HashMap::new(),
                default,
                broken: None,
            }
        }

        fn with(mut self, a: &str, b: &str, d: u32) -> Self {
            self.distances.insert((a.to_string(), b.to_string()), d);
            self.distances.insert((b.to_string(), a.to_string()), d);
            self
        }
    }

    impl Similarity for FixedDistances {
        fn distance(&self, a: &ImageRecord, b: &ImageRecord) -> Result<u32> {
            if let Some(broken) = &self.broken {
                if &a.file_name() == broken || &b.file_name() == broken {
                    return Err(Error::decode(
                        &a.path,
                        image::ImageError::IoError(std::io::Error::other("corrupt")),
                    ));
                }
            }
            Ok(*self
                .distances
                .get(&(a.file_name(), b.file_name()))
                .unwrap_or(&self.default))
        }
    }

    fn names(pair: &Pair) -> (String, String) {
        (pair.left.file_name(), pair.right.file_name())
    }

    fn assert_each_once(images: &[ImageRecord], matching: &Matching) {
        assert_eq!(matching.image_count(), images.len());
        let mut seen: Vec<_> = matching
            .pairs
            .iter()
            .flat_map(|p| [p.left.path.clone(), p.right.path.clone()])
            .chain(matching.singles.iter().map(|s| s.path.clone()))
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), images.len());
    }

    #[test]
    fn test_strict_burst_pairs() {
        // 00:00, 00:02, 00:10, 00:12, 00:30
        let images = vec![
            rec("a.jpg", 0.0),
            rec("b.jpg", 2.0),
            rec("c.jpg", 10.0),
            rec("d.jpg", 12.0),
            rec("e.jpg", 30.0),
        ];
        let config = MatchConfig {
            mode: PairingMode::Strict,
            ..MatchConfig::default()
        };
        let matching = pair_strict(&images, &config);

        let pairs: Vec<_> = matching.pairs.iter().map(names).collect();
        assert_eq!(
            pairs,
            vec![
                ("a.jpg".to_string(), "b.jpg".to_string()),
                ("c.jpg".to_string(), "d.jpg".to_string())
            ]
        );
        assert_eq!(matching.singles.len(), 1);
        assert_eq!(matching.singles[0].file_name(), "e.jpg");
        assert_each_once(&images, &matching);
    }

    #[test]
    fn test_strict_window_edges() {
        let config = MatchConfig {
            mode: PairingMode::Strict,
            ..MatchConfig::default()
        };
        // Too close, then exactly 1s, then exactly 4s, then too far
        let images = vec![
            rec("a.jpg", 0.0),
            rec("b.jpg", 0.5),
            rec("c.jpg", 1.5),
            rec("d.jpg", 100.0),
            rec("e.jpg", 104.0),
            rec("f.jpg", 200.0),
            rec("g.jpg", 204.5),
        ];
        let matching = pair_strict(&images, &config);
        let pairs: Vec<_> = matching.pairs.iter().map(names).collect();
        assert_eq!(
            pairs,
            vec![
                ("b.jpg".to_string(), "c.jpg".to_string()),
                ("d.jpg".to_string(), "e.jpg".to_string())
            ]
        );
        let singles: Vec<_> = matching.singles.iter().map(|s| s.file_name()).collect();
        assert_eq!(singles, vec!["a.jpg", "f.jpg", "g.jpg"]);
    }

    #[test]
    fn test_strict_sorts_input() {
        let config = MatchConfig {
            mode: PairingMode::Strict,
            ..MatchConfig::default()
        };
        let images = vec![rec("late.jpg", 3.0), rec("early.jpg", 1.0)];
        let matching = pair_images(&images, &config, &FixedDistances::new(0));
        assert_eq!(
            names(&matching.pairs[0]),
            ("early.jpg".to_string(), "late.jpg".to_string())
        );
    }

    #[test]
    fn test_greedy_respects_time_and_hash() {
        // x at 00:00, y at 00:01.5 (dist 4), z at 00:05 (dist 2 to y)
        let images = vec![rec("x.jpg", 0.0), rec("y.jpg", 1.5), rec("z.jpg", 5.0)];
        let oracle = FixedDistances::new(50)
            .with("x.jpg", "y.jpg", 4)
            .with("y.jpg", "z.jpg", 2);
        let matching = pair_images(&images, &MatchConfig::default(), &oracle);

        assert_eq!(matching.pairs.len(), 1);
        assert_eq!(
            names(&matching.pairs[0]),
            ("x.jpg".to_string(), "y.jpg".to_string())
        );
        assert_eq!(matching.singles.len(), 1);
        assert_eq!(matching.singles[0].file_name(), "z.jpg");
    }

    #[test]
    fn test_greedy_earliest_candidate_wins() {
        // a has two similar partners in the window; the earlier one is taken
        let images = vec![rec("a.jpg", 0.0), rec("b.jpg", 0.5), rec("c.jpg", 1.0)];
        let oracle = FixedDistances::new(50)
            .with("a.jpg", "b.jpg", 9)
            .with("a.jpg", "c.jpg", 0)
            .with("b.jpg", "c.jpg", 1);
        let matching = pair_greedy(&images, &MatchConfig::default(), &oracle);
        assert_eq!(
            names(&matching.pairs[0]),
            ("a.jpg".to_string(), "b.jpg".to_string())
        );
        assert_eq!(matching.singles[0].file_name(), "c.jpg");
    }

    #[test]
    fn test_greedy_threshold_is_strict() {
        let images = vec![rec("a.jpg", 0.0), rec("b.jpg", 1.0)];
        let oracle = FixedDistances::new(10);
        let matching = pair_greedy(&images, &MatchConfig::default(), &oracle);
        assert!(matching.pairs.is_empty());
        assert_eq!(matching.singles.len(), 2);
    }

    #[test]
    fn test_greedy_similarity_error_is_not_similar() {
        let images = vec![rec("a.jpg", 0.0), rec("bad.jpg", 0.5), rec("c.jpg", 1.0)];
        let mut oracle = FixedDistances::new(3);
        oracle.broken = Some("bad.jpg".to_string());
        let matching = pair_greedy(&images, &MatchConfig::default(), &oracle);
        assert_eq!(
            names(&matching.pairs[0]),
            ("a.jpg".to_string(), "c.jpg".to_string())
        );
        assert_eq!(matching.singles[0].file_name(), "bad.jpg");
    }

    #[test]
    fn test_undated_images_are_singles() {
        let mut images = vec![rec("a.jpg", 0.0), rec("b.jpg", 1.0)];
        images.push(ImageRecord::new("/photos/nodate.jpg", None, 1));
        let matching = pair_images(&images, &MatchConfig::default(), &FixedDistances::new(0));
        assert_eq!(matching.pairs.len(), 1);
        assert_eq!(matching.singles.len(), 1);
        assert_eq!(matching.singles[0].file_name(), "nodate.jpg");
        assert_each_once(&images, &matching);
    }

    #[test]
    fn test_no_double_membership_in_dense_burst() {
        let images: Vec<_> = (0..9).map(|i| rec(&format!("{}.jpg", i), i as f64 * 0.3)).collect();
        let matching = pair_greedy(&images, &MatchConfig::default(), &FixedDistances::new(0));
        assert_eq!(matching.pairs.len(), 4);
        assert_eq!(matching.singles.len(), 1);
        assert_each_once(&images, &matching);
    }

    #[test]
    fn test_folder_policy_zips_by_name() {
        let left = vec![
            ImageRecord::new("/L/002.jpg", None, 1),
            ImageRecord::new("/L/001.jpg", None, 1),
            ImageRecord::new("/L/003.jpg", None, 1),
        ];
        let right = vec![
            ImageRecord::new("/R/b.jpg", None, 1),
            ImageRecord::new("/R/a.jpg", None, 1),
        ];
        let matching = pair_by_folders(&left, &right);
        let pairs: Vec<_> = matching.pairs.iter().map(names).collect();
        assert_eq!(
            pairs,
            vec![
                ("001.jpg".to_string(), "a.jpg".to_string()),
                ("002.jpg".to_string(), "b.jpg".to_string())
            ]
        );
        assert_eq!(matching.singles.len(), 1);
        assert_eq!(matching.singles[0].file_name(), "003.jpg");
    }

    #[test]
    fn test_find_folder_layout() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_folder_layout(dir.path()).is_none());
        std::fs::create_dir(dir.path().join("Left")).unwrap();
        std::fs::create_dir(dir.path().join("Right")).unwrap();
        let (left, right) = find_folder_layout(dir.path()).unwrap();
        assert!(left.ends_with("Left"));
        assert!(right.ends_with("Right"));
    }

    #[test]
    fn test_two_second_gap_is_inside_window() {
        let images = vec![rec("IMG_0001.jpg", 0.0), rec("IMG_0002.jpg", 2.0)];
        let oracle = FixedDistances::new(50).with("IMG_0001.jpg", "IMG_0002.jpg", 3);
        let matching = pair_images(&images, &MatchConfig::default(), &oracle);
        assert_eq!(matching.pairs.len(), 1);
        assert_eq!(
            names(&matching.pairs[0]),
            ("IMG_0001.jpg".to_string(), "IMG_0002.jpg".to_string())
        );
        assert!(matching.singles.is_empty());
    }

    #[test]
    fn test_ten_second_gap_gives_two_singles() {
        let images = vec![rec("IMG_0001.jpg", 0.0), rec("IMG_0002.jpg", 10.0)];
        let oracle = FixedDistances::new(0);
        let matching = pair_images(&images, &MatchConfig::default(), &oracle);
        assert!(matching.pairs.is_empty());
        assert_eq!(matching.singles.len(), 2);
    }

    #[test]
    fn test_sequential_pairs_by_name() {
        let images = vec![
            ImageRecord::new("/photos/c.jpg", None, 1),
            ImageRecord::new("/photos/a.jpg", None, 1),
            rec("b.jpg", 100.0),
            ImageRecord::new("/photos/e.jpg", None, 1),
            ImageRecord::new("/photos/d.jpg", None, 1),
        ];
        let config = MatchConfig {
            mode: PairingMode::Sequential,
            ..MatchConfig::default()
        };
        let matching = pair_images(&images, &config, &FixedDistances::new(99));
        let pairs: Vec<_> = matching.pairs.iter().map(names).collect();
        assert_eq!(
            pairs,
            vec![
                ("a.jpg".to_string(), "b.jpg".to_string()),
                ("c.jpg".to_string(), "d.jpg".to_string())
            ]
        );
        assert_eq!(matching.singles.len(), 1);
        assert_eq!(matching.singles[0].file_name(), "e.jpg");
    }

    #[test]
    fn test_per_folder_keeps_pairs_inside_folders() {
        let at_dir = |dir: &str, name: &str, secs: f64| {
            ImageRecord::new(format!("/photos/{}/{}", dir, name), Some(at_f(secs)), 100)
        };
        // day1/b and day2/c are 0.5 s apart but live in different folders
        let images = vec![
            at_dir("day1", "a.jpg", 0.0),
            at_dir("day1", "b.jpg", 10.0),
            at_dir("day2", "c.jpg", 10.5),
            at_dir("day2", "d.jpg", 11.0),
        ];
        let oracle = FixedDistances::new(0);

        let grouped = pair_images(&images, &MatchConfig::default(), &oracle);
        let pairs: Vec<_> = grouped.pairs.iter().map(names).collect();
        assert_eq!(pairs, vec![("c.jpg".to_string(), "d.jpg".to_string())]);
        assert_eq!(grouped.singles.len(), 2);
        assert_each_once(&images, &grouped);

        let across = MatchConfig {
            per_folder: false,
            ..MatchConfig::default()
        };
        let mixed = pair_images(&images, &across, &oracle);
        let pairs: Vec<_> = mixed.pairs.iter().map(names).collect();
        assert_eq!(pairs, vec![("b.jpg".to_string(), "c.jpg".to_string())]);
    }

    #[test]
    fn test_pairing_mode_names() {
        assert_eq!("single".parse::<PairingMode>().unwrap(), PairingMode::Sequential);
        assert_eq!("STRICT".parse::<PairingMode>().unwrap(), PairingMode::Strict);
        assert!("random".parse::<PairingMode>().is_err());
    }
}
