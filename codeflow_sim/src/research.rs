//! Research Dataset Generator
//! ===========================
//!
//! Projects a [`StoreSnapshot`] into flat [`ResearchDataPoint`] rows, one per
//! commit in the window. PR-level metrics are computed once per PR and shared
//! by its member rows; the rows themselves are produced lazily so exporters
//! can stream them.
//!
//! Commits without a PR keep their commit-level fields (lines, AI split,
//! survival, controls) and leave every PR-level field empty. Survival is
//! empty as well when its horizon runs past the observed data.

use crate::survival::SurvivalTracker;
use chrono::{DateTime, Duration, Utc};
use codeflow_core::{Commit, PullRequest, ReviewState, SeedDocument, StoreSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Share of additions above which a change counts as greenfield work.
pub const GREENFIELD_THRESHOLD: f64 = 0.8;

/// One denormalized research row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchDataPoint {
    // Commit
    pub commit_hash: String,
    pub author_id: String,
    pub repo: String,
    pub branch: String,
    pub timestamp: DateTime<Utc>,
    pub lines_added: u32,
    pub lines_deleted: u32,
    pub tab_lines_added: u32,
    pub composer_lines_added: u32,
    pub non_ai_lines_added: u32,
    pub ai_ratio: f64,
    pub files_changed: u32,

    // Pull request
    pub pr_number: Option<u64>,
    pub pr_state: Option<String>,
    pub pr_ai_ratio: Option<f64>,
    pub coding_lead_time_hours: Option<f64>,
    pub pickup_time_hours: Option<f64>,
    pub review_lead_time_hours: Option<f64>,
    pub merge_lead_time_hours: Option<f64>,
    pub review_comments: Option<u32>,
    pub review_density: Option<f64>,
    pub review_iterations: Option<u32>,
    pub reviewer_count: Option<u32>,
    pub rework_ratio: Option<f64>,
    pub scope_creep: Option<f64>,
    pub was_reverted: Option<bool>,
    pub required_hotfix: Option<bool>,
    pub is_bug_fix: Option<bool>,

    // Outcomes
    pub survival_rate_7d: Option<f64>,
    pub survival_rate_30d: Option<f64>,

    // Controls
    pub seniority: String,
    pub region: String,
    pub team: String,
    pub repo_maturity: String,
    pub repo_age_days: u32,
    pub primary_language: String,
    pub is_greenfield: bool,
    pub greenfield_index: f64,
}

/// Metrics shared by every row of one PR.
#[derive(Debug, Clone, PartialEq)]
pub struct PrMetrics {
    pub coding_lead_time_hours: f64,
    pub pickup_time_hours: Option<f64>,
    pub review_lead_time_hours: Option<f64>,
    pub merge_lead_time_hours: Option<f64>,
    pub review_comments: u32,
    pub review_density: f64,
    pub rework_ratio: f64,
    pub scope_creep: f64,
}

fn to_hours(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}

fn span_hours(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Option<f64> {
    Some(to_hours(to? - from?))
}

/// Computes cycle-time, review and churn metrics for one PR.
pub fn pr_metrics(pr: &PullRequest, members: &[Commit], comments: usize) -> PrMetrics {
    let first_commit = members
        .iter()
        .map(|c| c.timestamp)
        .min()
        .unwrap_or(pr.created_at);

    let review_comments = comments as u32;
    let lines = pr.lines_changed();
    let review_density = if lines == 0 {
        0.0
    } else {
        f64::from(review_comments) / f64::from(lines)
    };

    let mut initial_files = BTreeSet::new();
    let mut later_files = BTreeSet::new();
    let mut rework_lines = 0u32;
    for c in members {
        let paths = c.files.iter().map(|f| f.path.as_str());
        if c.timestamp <= pr.created_at {
            initial_files.extend(paths);
        } else {
            later_files.extend(paths);
            rework_lines += c.lines.added.total() + c.lines.deleted.total();
        }
    }
    let rework_ratio = if lines == 0 {
        0.0
    } else {
        f64::from(rework_lines) / f64::from(lines)
    };
    let new_files = later_files.difference(&initial_files).count();
    let scope_creep = new_files as f64 / initial_files.len().max(1) as f64;

    PrMetrics {
        coding_lead_time_hours: to_hours(pr.created_at - first_commit),
        pickup_time_hours: span_hours(Some(pr.created_at), pr.first_review_at),
        review_lead_time_hours: span_hours(pr.first_review_at, pr.last_review_at),
        merge_lead_time_hours: span_hours(pr.approved_at, pr.merged_at),
        review_comments,
        review_density,
        rework_ratio,
        scope_creep,
    }
}

/// Joins a snapshot into research rows.
pub struct ResearchGenerator<'a> {
    seed: &'a SeedDocument,
    survival: &'a SurvivalTracker,
    snapshot: &'a StoreSnapshot,
    metrics: BTreeMap<u64, PrMetrics>,
}

impl<'a> ResearchGenerator<'a> {
    pub fn new(
        seed: &'a SeedDocument,
        survival: &'a SurvivalTracker,
        snapshot: &'a StoreSnapshot,
    ) -> Self {
        let metrics = snapshot
            .pull_requests
            .iter()
            .map(|(n, pr)| {
                let members = snapshot.pr_commits.get(n).map_or(&[][..], |v| v.as_slice());
                // Approvals are not counted as review comments
                let comments = snapshot.reviews.get(n).map_or(0, |rc| {
                    rc.iter().filter(|c| c.state != ReviewState::Approved).count()
                });
                (*n, pr_metrics(pr, members, comments))
            })
            .collect();
        Self {
            seed,
            survival,
            snapshot,
            metrics,
        }
    }

    /// Number of rows `rows()` will yield.
    pub fn len(&self) -> usize {
        self.snapshot.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.commits.is_empty()
    }

    /// Rows in commit time order.
    pub fn rows(&self) -> impl Iterator<Item = ResearchDataPoint> + '_ {
        self.snapshot.commits.iter().map(move |c| self.row(c))
    }

    fn row(&self, c: &Commit) -> ResearchDataPoint {
        let dev = self.seed.developer(&c.author_id);
        let repo = self.seed.repository(&c.repo);
        let pr = c.pr_number.and_then(|n| self.snapshot.pull_requests.get(&n));
        let m = c.pr_number.and_then(|n| self.metrics.get(&n));
        let survival = self.survival.profile(c);

        let added = c.lines.added.total();
        let deleted = c.lines.deleted.total();
        let greenfield_index = if added + deleted == 0 {
            0.0
        } else {
            f64::from(added) / f64::from(added + deleted)
        };

        ResearchDataPoint {
            commit_hash: c.hash.clone(),
            author_id: c.author_id.clone(),
            repo: c.repo.clone(),
            branch: c.branch.clone(),
            timestamp: c.timestamp,
            lines_added: added,
            lines_deleted: deleted,
            tab_lines_added: c.lines.added.tab,
            composer_lines_added: c.lines.added.composer,
            non_ai_lines_added: c.lines.added.non_ai,
            ai_ratio: c.ai_ratio(),
            files_changed: c.files.len() as u32,

            pr_number: pr.map(|p| p.number),
            pr_state: pr.map(|p| p.state.name().to_string()),
            pr_ai_ratio: pr.map(|p| p.ai_ratio),
            coding_lead_time_hours: m.map(|m| m.coding_lead_time_hours),
            pickup_time_hours: m.and_then(|m| m.pickup_time_hours),
            review_lead_time_hours: m.and_then(|m| m.review_lead_time_hours),
            merge_lead_time_hours: m.and_then(|m| m.merge_lead_time_hours),
            review_comments: m.map(|m| m.review_comments),
            review_density: m.map(|m| m.review_density),
            review_iterations: pr.map(|p| p.review_iterations),
            reviewer_count: pr.map(|p| p.reviewers.len() as u32),
            rework_ratio: m.map(|m| m.rework_ratio),
            scope_creep: m.map(|m| m.scope_creep),
            was_reverted: pr.map(|p| p.quality.was_reverted),
            required_hotfix: pr.map(|p| p.quality.required_hotfix),
            is_bug_fix: pr.map(|p| p.quality.is_bug_fix),

            survival_rate_7d: survival.d7,
            survival_rate_30d: survival.d30,

            seniority: dev.map_or_else(String::new, |d| d.seniority.name().to_string()),
            region: dev.map_or_else(String::new, |d| d.region.clone()),
            team: dev.map_or_else(String::new, |d| d.team.clone()),
            repo_maturity: repo.map_or_else(String::new, |r| r.maturity.tier().name().to_string()),
            repo_age_days: repo.map_or(0, |r| r.maturity.age_days),
            primary_language: repo.map_or_else(String::new, |r| r.primary_language.clone()),
            is_greenfield: greenfield_index > GREENFIELD_THRESHOLD,
            greenfield_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use codeflow_core::{CommitLines, FileChange, LineSplit, PrState, QualityFlags, Store};
    use codeflow_env::TimeWindow;

    fn t(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn commit(hash: &str, hour: i64, path: &str, added: u32) -> Commit {
        Commit {
            hash: hash.into(),
            author_id: "user_001".into(),
            repo: "acme/api".into(),
            branch: "feature/user_001-1".into(),
            is_default_branch: false,
            timestamp: t(hour),
            lines: CommitLines {
                added: LineSplit { tab: added / 2, composer: 0, non_ai: added - added / 2 },
                deleted: LineSplit::default(),
            },
            files: vec![FileChange {
                path: path.into(),
                start_line: 1,
                lines_added: added,
                lines_deleted: 0,
            }],
            message: "Add".into(),
            pr_number: None,
        }
    }

    fn pr() -> PullRequest {
        PullRequest {
            number: 1,
            title: "Add".into(),
            author_id: "user_001".into(),
            repo: "acme/api".into(),
            head_branch: "feature/user_001-1".into(),
            base_branch: "main".into(),
            commit_hashes: vec!["c1".into(), "c2".into(), "c3".into()],
            additions: 100,
            deletions: 0,
            tab_lines: 50,
            composer_lines: 0,
            initial_additions: 40,
            initial_files: 1,
            changed_files: 2,
            ai_ratio: 0.5,
            state: PrState::Merged,
            created_at: t(2),
            first_review_at: Some(t(6)),
            last_review_at: Some(t(10)),
            approved_at: Some(t(11)),
            merged_at: Some(t(13)),
            closed_at: None,
            review_iterations: 2,
            reviewers: vec!["user_002".into()],
            quality: QualityFlags { was_reverted: true, ..Default::default() },
        }
    }

    #[test]
    fn test_pr_metrics() {
        let members = vec![
            commit("c1", 0, "src/a.go", 40),
            commit("c2", 4, "src/a.go", 20),
            commit("c3", 8, "src/b.go", 40),
        ];
        let m = pr_metrics(&pr(), &members, 5);
        assert_relative_eq!(m.coding_lead_time_hours, 2.0);
        assert_relative_eq!(m.pickup_time_hours.unwrap(), 4.0);
        assert_relative_eq!(m.review_lead_time_hours.unwrap(), 4.0);
        assert_relative_eq!(m.merge_lead_time_hours.unwrap(), 2.0);
        assert_relative_eq!(m.review_density, 0.05);
        assert_relative_eq!(m.rework_ratio, 0.6);
        assert_relative_eq!(m.scope_creep, 1.0);
    }

    #[test]
    fn test_rows_join_pr_and_leave_orphans_empty() {
        let seed = crate::testutil::seed_with(2, 0.5);
        let store = Store::new();
        let mut orphan = commit("c4", 20, "src/c.go", 10);
        orphan.is_default_branch = true;
        orphan.branch = "main".into();
        store
            .insert_commits(vec![
                commit("c1", 0, "src/a.go", 40),
                commit("c2", 4, "src/a.go", 20),
                commit("c3", 8, "src/b.go", 40),
                orphan,
            ])
            .unwrap();
        store.insert_pr(pr()).unwrap();
        store
            .link_commits_to_pr(1, &["c1".into(), "c2".into(), "c3".into()])
            .unwrap();

        // Window starts after c1: its row is absent but it still counts for lead time.
        let snap = store.snapshot(TimeWindow::new(t(1), t(24)));
        let tracker = SurvivalTracker::build(&snap.commits, t(24 * 40));
        let gen = ResearchGenerator::new(&seed, &tracker, &snap);
        let rows: Vec<_> = gen.rows().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(gen.len(), 3);

        let joined = &rows[0];
        assert_eq!(joined.commit_hash, "c2");
        assert_eq!(joined.pr_number, Some(1));
        assert_relative_eq!(joined.coding_lead_time_hours.unwrap(), 2.0);
        assert_eq!(joined.was_reverted, Some(true));
        assert_eq!(joined.seniority, "junior");
        assert_eq!(joined.repo_maturity, "mature");
        assert!(joined.is_greenfield);

        let alone = &rows[2];
        assert_eq!(alone.commit_hash, "c4");
        assert!(alone.pr_number.is_none());
        assert!(alone.coding_lead_time_hours.is_none());
        assert!(alone.was_reverted.is_none());
        assert_eq!(alone.survival_rate_30d, Some(1.0));
    }

    #[test]
    fn test_survival_empty_past_observation_end() {
        let seed = crate::testutil::seed_with(1, 0.5);
        let store = Store::new();
        store
            .insert_commits(vec![
                commit("c1", 0, "src/a.go", 40),
                commit("c2", 24 * 9, "src/b.go", 20),
            ])
            .unwrap();
        let snap = store.snapshot(TimeWindow::new(t(0), t(24 * 10)));
        let tracker = SurvivalTracker::build(&snap.commits, t(24 * 10));
        let rows: Vec<_> = ResearchGenerator::new(&seed, &tracker, &snap).rows().collect();

        assert_eq!(rows[0].survival_rate_7d, Some(1.0));
        assert!(rows[0].survival_rate_30d.is_none());
        assert!(rows[1].survival_rate_7d.is_none());
        assert!(rows[1].survival_rate_30d.is_none());
    }
}
