//! Code Survival Tracker
//! ======================
//!
//! Measures how much of a commit's added code is still untouched after a
//! fixed horizon. There is no real file content, so provenance is tracked by
//! line region: a commit adds lines `[start, start + added)` in a file, and a
//! later commit whose deleted region `[start', start' + deleted')` overlaps it
//! overwrites those lines.
//!
//! Touches are indexed per [`FileKey`] and sorted by time, so a survival
//! query binary-searches the touches inside `(t, t + h]` of one file instead
//! of scanning the corpus. Because a longer horizon only ever sees a superset
//! of overwrites, survival is non-increasing in the horizon.
//!
//! The tracker knows when observation ends. A horizon that reaches past that
//! instant has no answer yet, so rates come back as `None` rather than as a
//! survival nobody had the chance to disprove.

use chrono::{DateTime, Duration, Utc};
use codeflow_core::Commit;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Horizons reported for every commit, in days.
pub const HORIZON_DAYS: [i64; 3] = [7, 14, 30];

/// Composite index key for one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub repo: String,
    pub path: String,
}

impl FileKey {
    pub fn new(repo: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Touch {
    timestamp: DateTime<Utc>,
    hash: String,
    deleted_start: u32,
    deleted_end: u32,
}

/// Survival at the standard horizons, `None` where the horizon is not yet observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurvivalProfile {
    pub d7: Option<f64>,
    pub d14: Option<f64>,
    pub d30: Option<f64>,
}

/// Aggregate survival of one developer's observed commits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSurvival {
    pub author_id: String,
    pub commits: usize,
    pub lines_added: u64,
    pub lines_surviving: u64,
}

impl CohortSurvival {
    pub fn rate(&self) -> f64 {
        if self.lines_added == 0 {
            1.0
        } else {
            self.lines_surviving as f64 / self.lines_added as f64
        }
    }
}

/// Per-file touch index over a commit corpus observed up to `observed_until`.
#[derive(Debug)]
pub struct SurvivalTracker {
    touches: HashMap<FileKey, Vec<Touch>>,
    observed_until: DateTime<Utc>,
}

impl SurvivalTracker {
    /// Builds the index. O(n log n) in the number of file changes.
    pub fn build(commits: &[Commit], observed_until: DateTime<Utc>) -> Self {
        let mut touches: HashMap<FileKey, Vec<Touch>> = HashMap::new();
        for c in commits {
            for f in c.files.iter().filter(|f| f.lines_deleted > 0) {
                touches
                    .entry(FileKey::new(&c.repo, &f.path))
                    .or_default()
                    .push(Touch {
                        timestamp: c.timestamp,
                        hash: c.hash.clone(),
                        deleted_start: f.start_line,
                        deleted_end: f.start_line + f.lines_deleted,
                    });
            }
        }
        for list in touches.values_mut() {
            list.sort_by(|a, b| (a.timestamp, &a.hash).cmp(&(b.timestamp, &b.hash)));
        }
        tracing::debug!(files = touches.len(), %observed_until, "survival index built");
        Self {
            touches,
            observed_until,
        }
    }

    pub fn observed_until(&self) -> DateTime<Utc> {
        self.observed_until
    }

    /// Whether `horizon` after `commit` lies inside the observed data.
    pub fn is_observed(&self, commit: &Commit, horizon: Duration) -> bool {
        commit.timestamp + horizon <= self.observed_until
    }

    /// Number of indexed files.
    pub fn file_count(&self) -> usize {
        self.touches.len()
    }

    /// Lines of `commit` still untouched `horizon` after it was made.
    pub fn surviving_lines(&self, commit: &Commit, horizon: Duration) -> u32 {
        let until = commit.timestamp + horizon;
        commit
            .files
            .iter()
            .filter(|f| f.lines_added > 0)
            .map(|f| {
                let start = f.start_line;
                let end = f.start_line + f.lines_added;
                let Some(list) = self.touches.get(&FileKey::new(&commit.repo, &f.path)) else {
                    return f.lines_added;
                };
                let from = list.partition_point(|t| t.timestamp <= commit.timestamp);
                let to = list.partition_point(|t| t.timestamp <= until);

                let mut hits: Vec<(u32, u32)> = list[from..to]
                    .iter()
                    .filter(|t| t.hash != commit.hash)
                    .map(|t| (t.deleted_start.max(start), t.deleted_end.min(end)))
                    .filter(|(s, e)| s < e)
                    .collect();
                f.lines_added - covered(&mut hits)
            })
            .sum()
    }

    /// Fraction of added lines untouched after `horizon` (1.0 if nothing was
    /// added), or `None` when the horizon ends after the observed data.
    pub fn survival_rate(&self, commit: &Commit, horizon: Duration) -> Option<f64> {
        if !self.is_observed(commit, horizon) {
            return None;
        }
        let added = commit.lines.added.total();
        if added == 0 {
            return Some(1.0);
        }
        Some(f64::from(self.surviving_lines(commit, horizon)) / f64::from(added))
    }

    pub fn profile(&self, commit: &Commit) -> SurvivalProfile {
        let [d7, d14, d30] = HORIZON_DAYS.map(|d| self.survival_rate(commit, Duration::days(d)));
        SurvivalProfile { d7, d14, d30 }
    }

    /// Survival per author over the commits of `commits` whose horizon is
    /// observed, in author order.
    pub fn cohort(&self, commits: &[Commit], horizon: Duration) -> Vec<CohortSurvival> {
        let mut by_author: BTreeMap<&str, CohortSurvival> = BTreeMap::new();
        for c in commits.iter().filter(|c| self.is_observed(c, horizon)) {
            let entry = by_author.entry(c.author_id.as_str()).or_insert_with(|| CohortSurvival {
                author_id: c.author_id.clone(),
                commits: 0,
                lines_added: 0,
                lines_surviving: 0,
            });
            entry.commits += 1;
            entry.lines_added += u64::from(c.lines.added.total());
            entry.lines_surviving += u64::from(self.surviving_lines(c, horizon));
        }
        by_author.into_values().collect()
    }
}

/// Total length covered by a set of half-open intervals.
fn covered(intervals: &mut [(u32, u32)]) -> u32 {
    intervals.sort_unstable();
    let mut total = 0;
    let mut cursor = 0;
    for &(s, e) in intervals.iter() {
        let s = s.max(cursor);
        if e > s {
            total += e - s;
            cursor = e;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commits::CommitGenerator;
    use crate::rng::SeedHierarchy;
    use crate::testutil::{seed_with, window_days};
    use crate::velocity::Velocity;
    use chrono::TimeZone;
    use codeflow_core::{CommitLines, FileChange, LineSplit};
    use proptest::prelude::*;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap() + Duration::days(n)
    }

    fn change(hash: &str, day_offset: i64, start: u32, added: u32, deleted: u32) -> Commit {
        Commit {
            hash: hash.into(),
            author_id: "user_001".into(),
            repo: "acme/api".into(),
            branch: "feature/x".into(),
            is_default_branch: false,
            timestamp: day(day_offset),
            lines: CommitLines {
                added: LineSplit { tab: 0, composer: 0, non_ai: added },
                deleted: LineSplit { tab: 0, composer: 0, non_ai: deleted },
            },
            files: vec![FileChange {
                path: "src/core/file_001.go".into(),
                start_line: start,
                lines_added: added,
                lines_deleted: deleted,
            }],
            message: String::new(),
            pr_number: None,
        }
    }

    #[test]
    fn test_covered_merges_overlaps() {
        assert_eq!(covered(&mut [(0, 10), (5, 15), (20, 25)]), 20);
        assert_eq!(covered(&mut [(3, 4), (0, 10)]), 10);
        assert_eq!(covered(&mut []), 0);
    }

    #[test]
    fn test_overwrites_by_horizon() {
        let commits = vec![
            change("a", 0, 100, 50, 0),  // adds 100..150
            change("b", 3, 120, 0, 10),  // overwrites 120..130 at day 3
            change("c", 10, 90, 5, 20),  // overwrites 100..110 at day 10
            change("d", 40, 100, 0, 50), // outside every horizon
        ];
        let tracker = SurvivalTracker::build(&commits, day(60));
        let p = tracker.profile(&commits[0]);
        assert_eq!(p.d7, Some(0.8));
        assert_eq!(p.d14, Some(0.6));
        assert_eq!(p.d30, Some(0.6));
    }

    #[test]
    fn test_unobserved_horizons_have_no_rate() {
        let commits = vec![
            change("a", 0, 100, 50, 0),
            change("late", 9, 10, 20, 0),
            change("last", 9, 200, 30, 0),
        ];
        let tracker = SurvivalTracker::build(&commits, day(10));
        assert!(tracker.profile(&commits[0]).d7.is_some());
        assert!(tracker.profile(&commits[0]).d14.is_none());

        let last = tracker.profile(&commits[2]);
        assert_eq!(last, SurvivalProfile { d7: None, d14: None, d30: None });

        // Horizon ending exactly at the observation end is observed
        let exact = SurvivalTracker::build(&commits, day(7));
        assert_eq!(exact.survival_rate(&commits[0], Duration::days(7)), Some(1.0));

        let cohort = tracker.cohort(&commits, Duration::days(7));
        assert_eq!(cohort.len(), 1);
        assert_eq!(cohort[0].commits, 1);
        assert_eq!(cohort[0].lines_added, 50);
    }

    #[test]
    fn test_own_deletions_and_earlier_commits_ignored() {
        let commits = vec![change("early", -2, 0, 0, 400), change("a", 0, 10, 20, 20)];
        let tracker = SurvivalTracker::build(&commits, day(60));
        assert_eq!(tracker.survival_rate(&commits[1], Duration::days(30)), Some(1.0));
    }

    #[test]
    fn test_nothing_added_survives_fully() {
        let c = change("a", 0, 10, 0, 5);
        let tracker = SurvivalTracker::build(std::slice::from_ref(&c), day(60));
        assert_eq!(tracker.survival_rate(&c, Duration::days(7)), Some(1.0));
    }

    #[test]
    fn test_cohort_per_author() {
        let mut commits = vec![change("a", 0, 100, 50, 0), change("b", 3, 120, 0, 10)];
        commits[1].author_id = "user_002".into();
        let cohort = SurvivalTracker::build(&commits, day(60)).cohort(&commits, Duration::days(7));
        assert_eq!(cohort.len(), 2);
        assert_eq!(cohort[0].author_id, "user_001");
        assert_eq!(cohort[0].lines_surviving, 40);
        assert_eq!(cohort[1].rate(), 1.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn survival_is_monotonic(days in 5u32..40, devs in 1usize..4) {
            let seed = seed_with(devs, 0.5);
            let keys = SeedHierarchy::from_document(&seed).unwrap();
            let gen = CommitGenerator::new(&seed, keys, Velocity::High);
            let commits: Vec<Commit> = (0..devs)
                .flat_map(|i| gen.generate_for(i, window_days(days)).unwrap())
                .collect();
            let window = window_days(days);
            let tracker = SurvivalTracker::build(&commits, window.to);
            for c in &commits {
                let p = tracker.profile(c);
                // A longer horizon is only observed if every shorter one is
                if p.d30.is_some() {
                    prop_assert!(p.d14.is_some());
                }
                if p.d14.is_some() {
                    prop_assert!(p.d7.is_some());
                }
                if let (Some(d7), Some(d14)) = (p.d7, p.d14) {
                    prop_assert!(d7 <= 1.0 && d7 >= d14);
                }
                if let (Some(d14), Some(d30)) = (p.d14, p.d30) {
                    prop_assert!(d14 >= d30 && d30 >= 0.0);
                }
                if c.timestamp + Duration::days(30) > window.to {
                    prop_assert!(p.d30.is_none());
                }
            }
        }
    }
}
