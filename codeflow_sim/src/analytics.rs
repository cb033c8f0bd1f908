//! Per-band analytics over research rows.
//!
//! Groups rows by AI-ratio band and reports velocity, review cost and quality
//! side by side. Commit-level figures use each commit's own AI ratio; PR-level
//! figures count each PR once, banded by the PR's aggregate ratio.

use crate::research::ResearchDataPoint;
use codeflow_core::{AiRatioBand, AiRatioThresholds};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandSummary {
    pub band: AiRatioBand,

    // Velocity
    pub commits: usize,
    pub lines_added: u64,
    pub mean_coding_lead_time_hours: Option<f64>,

    // Review cost
    pub pull_requests: usize,
    pub mean_review_comments: Option<f64>,
    pub mean_review_iterations: Option<f64>,
    pub mean_review_density: Option<f64>,

    // Quality
    pub merged_prs: usize,
    pub revert_rate: Option<f64>,
    pub hotfix_rate: Option<f64>,
    pub mean_survival_30d: Option<f64>,
}

#[derive(Default)]
struct Acc {
    commits: usize,
    lines_added: u64,
    survival: Mean,
    prs: usize,
    lead: Mean,
    comments: Mean,
    iterations: Mean,
    density: Mean,
    merged: usize,
    reverted: usize,
    hotfix: usize,
}

#[derive(Default)]
struct Mean {
    sum: f64,
    n: usize,
}

impl Mean {
    fn push(&mut self, v: Option<f64>) {
        if let Some(v) = v {
            self.sum += v;
            self.n += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

fn ratio(part: usize, whole: usize) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64)
}

/// One summary per band, low to high. Streams over `rows` once.
pub fn band_summaries<I>(rows: I, thresholds: &AiRatioThresholds) -> Vec<BandSummary>
where
    I: IntoIterator<Item = ResearchDataPoint>,
{
    let mut acc: BTreeMap<AiRatioBand, Acc> = AiRatioBand::ALL
        .iter()
        .map(|b| (*b, Acc::default()))
        .collect();
    let mut seen_prs = BTreeSet::new();

    for row in rows {
        let commit_band = thresholds.band(row.ai_ratio);
        if let Some(a) = acc.get_mut(&commit_band) {
            a.commits += 1;
            a.lines_added += u64::from(row.lines_added);
            a.survival.push(row.survival_rate_30d);
        }

        let (Some(number), Some(pr_ratio)) = (row.pr_number, row.pr_ai_ratio) else {
            continue;
        };
        if !seen_prs.insert(number) {
            continue;
        }
        let Some(a) = acc.get_mut(&thresholds.band(pr_ratio)) else {
            continue;
        };
        a.prs += 1;
        a.lead.push(row.coding_lead_time_hours);
        a.comments.push(row.review_comments.map(f64::from));
        a.iterations.push(row.review_iterations.map(f64::from));
        a.density.push(row.review_density);
        if row.pr_state.as_deref() == Some("merged") {
            a.merged += 1;
            a.reverted += usize::from(row.was_reverted == Some(true));
            a.hotfix += usize::from(row.required_hotfix == Some(true));
        }
    }

    acc.into_iter()
        .map(|(band, a)| BandSummary {
            band,
            commits: a.commits,
            lines_added: a.lines_added,
            mean_coding_lead_time_hours: a.lead.value(),
            pull_requests: a.prs,
            mean_review_comments: a.comments.value(),
            mean_review_iterations: a.iterations.value(),
            mean_review_density: a.density.value(),
            merged_prs: a.merged,
            revert_rate: ratio(a.reverted, a.merged),
            hotfix_rate: ratio(a.hotfix, a.merged),
            mean_survival_30d: a.survival.value(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn row(hash: &str, ai: f64, pr: Option<(u64, f64, bool)>) -> ResearchDataPoint {
        ResearchDataPoint {
            commit_hash: hash.into(),
            author_id: "user_001".into(),
            repo: "acme/api".into(),
            branch: "feature/x".into(),
            timestamp: Utc::now(),
            lines_added: 10,
            lines_deleted: 0,
            tab_lines_added: 0,
            composer_lines_added: 0,
            non_ai_lines_added: 10,
            ai_ratio: ai,
            files_changed: 1,
            pr_number: pr.map(|p| p.0),
            pr_state: pr.map(|_| "merged".into()),
            pr_ai_ratio: pr.map(|p| p.1),
            coding_lead_time_hours: pr.map(|_| 2.0),
            pickup_time_hours: None,
            review_lead_time_hours: None,
            merge_lead_time_hours: None,
            review_comments: pr.map(|_| 4),
            review_density: pr.map(|_| 0.1),
            review_iterations: pr.map(|_| 2),
            reviewer_count: pr.map(|_| 1),
            rework_ratio: None,
            scope_creep: None,
            was_reverted: pr.map(|p| p.2),
            required_hotfix: pr.map(|_| false),
            is_bug_fix: pr.map(|_| false),
            survival_rate_7d: Some(1.0),
            survival_rate_30d: Some(0.5),
            seniority: "mid".into(),
            region: "US".into(),
            team: "Platform".into(),
            repo_maturity: "mature".into(),
            repo_age_days: 365,
            primary_language: "Go".into(),
            is_greenfield: true,
            greenfield_index: 1.0,
        }
    }

    #[test]
    fn test_prs_counted_once_per_band() {
        let rows = vec![
            row("a", 0.9, Some((1, 0.8, true))),
            row("b", 0.5, Some((1, 0.8, true))),
            row("c", 0.9, Some((2, 0.7, false))),
            row("d", 0.1, None),
        ];
        let s = band_summaries(rows, &AiRatioThresholds::default());
        assert_eq!(s.len(), 3);
        let (low, medium, high) = (&s[0], &s[1], &s[2]);

        assert_eq!(low.commits, 1);
        assert_eq!(low.pull_requests, 0);
        assert!(low.revert_rate.is_none());

        assert_eq!(medium.commits, 1);
        assert_eq!(medium.pull_requests, 0);

        assert_eq!(high.commits, 2);
        assert_eq!(high.pull_requests, 2);
        assert_eq!(high.merged_prs, 2);
        assert_relative_eq!(high.revert_rate.unwrap(), 0.5);
        assert_relative_eq!(high.mean_review_comments.unwrap(), 4.0);
        assert_relative_eq!(high.mean_survival_30d.unwrap(), 0.5);
    }

    #[test]
    fn test_unobserved_survival_left_out_of_mean() {
        let mut late = row("late", 0.9, None);
        late.survival_rate_30d = None;
        let mut early = row("early", 0.9, None);
        early.survival_rate_30d = Some(0.25);
        let mut unseen = row("unseen", 0.1, None);
        unseen.survival_rate_30d = None;

        let s = band_summaries(vec![late, early, unseen], &AiRatioThresholds::default());
        assert_eq!(s[2].commits, 2);
        assert_relative_eq!(s[2].mean_survival_30d.unwrap(), 0.25);
        assert_eq!(s[0].commits, 1);
        assert!(s[0].mean_survival_30d.is_none());
    }
}
