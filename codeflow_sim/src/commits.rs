//! Commit Generator
//! =================
//!
//! Turns one developer's seed entry into a time-ordered commit stream:
//!
//! 1. **Timing**: a Poisson process in working time. Gaps are exponential
//!    with rate = commits per working hour, and working time is laid onto the
//!    developer's `[start, end)` band of each day in the window.
//! 2. **Size**: lognormal added lines with mean `avg_pr_size_loc / 3`.
//! 3. **Split**: AI share from acceptance rate × seniority factor plus noise,
//!    divided between tab completions (60–80 %) and composer edits.
//! 4. **Placement**: commits belong to work items (repo + branch) lasting a
//!    seniority-dependent number of commits; a tenth land directly on the
//!    default branch.
//! 5. **Message**: rendered from seed templates for the work-item kind.
//!
//! Every stage reads its own stream from [`SeedHierarchy`], so the output for
//! a developer depends only on the seed document and the developer's position.

use crate::rng::{SeedHierarchy, Stage};
use crate::velocity::Velocity;
use chrono::{DateTime, Duration, Utc};
use codeflow_core::{
    Commit, CommitLines, CommitMessageTemplates, Developer, FileChange, LineSplit, Repository,
    SeedDocument, Seniority,
};
use codeflow_env::{SimError, SimResult, TimeWindow};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, LogNormal, Normal};

/// Length of the virtual file every path is mapped onto.
pub const VIRTUAL_FILE_LINES: u32 = 400;

const STAGE: &str = "commit_generation";
const DEFAULT_BRANCH_SHARE: f64 = 0.10;
const SCOPE_DRIFT_SHARE: f64 = 0.15;
const MAX_FILES_PER_COMMIT: u32 = 3;
const SIZE_SIGMA: f64 = 0.5;
const SPLIT_NOISE: f64 = 0.05;

const MODULES: [&str; 8] = [
    "api", "core", "db", "handlers", "models", "services", "utils", "config",
];
const FEATURES: [&str; 8] = [
    "pagination", "rate limiting", "audit logging", "bulk export", "search filters",
    "retry policy", "webhooks", "caching",
];
const ISSUES: [&str; 8] = [
    "null pointer", "race condition", "off-by-one error", "timeout", "memory leak",
    "encoding bug", "stale cache", "missing validation",
];

// =============================================================================
// DEVELOPER TRAITS
// =============================================================================

/// Multiplier applied to the acceptance rate when drawing a commit's AI share.
pub fn seniority_ai_factor(seniority: Seniority) -> f64 {
    match seniority {
        Seniority::Junior => 1.05,
        Seniority::Mid => 1.0,
        Seniority::Senior => 0.92,
    }
}

/// Inclusive range of commits per work item.
pub fn work_item_length(seniority: Seniority) -> (u32, u32) {
    match seniority {
        Seniority::Junior => (2, 5),
        Seniority::Mid => (4, 8),
        Seniority::Senior => (5, 12),
    }
}

/// Kind of work, which picks the branch prefix and message templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    Feature,
    Bugfix,
    Refactor,
    Chore,
}

impl WorkKind {
    pub fn name(&self) -> &'static str {
        match self {
            WorkKind::Feature => "feature",
            WorkKind::Bugfix => "bugfix",
            WorkKind::Refactor => "refactor",
            WorkKind::Chore => "chore",
        }
    }

    fn pick(rng: &mut ChaCha8Rng) -> Self {
        match rng.gen_range(0..100) {
            0..=49 => WorkKind::Feature,
            50..=74 => WorkKind::Bugfix,
            75..=89 => WorkKind::Refactor,
            _ => WorkKind::Chore,
        }
    }

    fn templates<'t>(&self, t: &'t CommitMessageTemplates) -> &'t [String] {
        match self {
            WorkKind::Feature => &t.feature,
            WorkKind::Bugfix => &t.bugfix,
            WorkKind::Refactor => &t.refactor,
            WorkKind::Chore => &t.chore,
        }
    }

    fn fallback(&self) -> &'static [&'static str] {
        match self {
            WorkKind::Feature => &[
                "Add {{ feature_name }} to {{ component }}",
                "Implement {{ feature_name }}",
            ],
            WorkKind::Bugfix => &[
                "Fix {{ issue }} in {{ component }}",
                "Hotfix for {{ issue }}",
            ],
            WorkKind::Refactor => &[
                "Refactor {{ component }}",
                "Simplify {{ component }} internals",
            ],
            WorkKind::Chore => &[
                "Update dependencies",
                "Tidy {{ component }} configuration",
            ],
        }
    }
}

/// Path of the `index`-th file in a repository's synthetic file pool.
pub fn file_path(repo: &Repository, index: u32) -> String {
    format!(
        "src/{}/file_{:03}.{}",
        MODULES[index as usize % MODULES.len()],
        index,
        repo.file_extension()
    )
}

/// Substitutes `{{ key }}` placeholders. Unknown keys are left as written.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = after[..close].trim();
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}

// =============================================================================
// GENERATOR
// =============================================================================

struct WorkItem<'s> {
    repo: &'s Repository,
    kind: WorkKind,
    branch: String,
    files: Vec<u32>,
    remaining: u32,
}

struct Streams {
    timing: ChaCha8Rng,
    size: ChaCha8Rng,
    split: ChaCha8Rng,
    placement: ChaCha8Rng,
    message: ChaCha8Rng,
}

/// Generates commits for one developer at a time.
#[derive(Debug, Clone, Copy)]
pub struct CommitGenerator<'a> {
    seed: &'a SeedDocument,
    keys: SeedHierarchy,
    velocity: Velocity,
}

impl<'a> CommitGenerator<'a> {
    pub fn new(seed: &'a SeedDocument, keys: SeedHierarchy, velocity: Velocity) -> Self {
        Self { seed, keys, velocity }
    }

    /// Mean commits per working day for `dev` under this velocity.
    pub fn commits_per_day(&self, dev: &Developer) -> f64 {
        dev.pr_behavior.prs_per_week * 3.0 / 7.0 * self.velocity.multiplier()
    }

    /// Generates the commits of the developer at `index` within `window`,
    /// ordered by timestamp.
    pub fn generate_for(&self, index: usize, window: TimeWindow) -> SimResult<Vec<Commit>> {
        let dev = self.seed.developers.get(index).ok_or_else(|| {
            SimError::invariant(STAGE, format!("developers[{}]", index), "no such developer")
        })?;
        let repos = self.seed.repositories_for(dev);
        if repos.is_empty() {
            return Err(SimError::invariant(
                STAGE,
                &dev.user_id,
                format!("no repositories assigned to team '{}'", dev.team),
            ));
        }

        let mut s = Streams {
            timing: self.keys.stream(index, Stage::Timing),
            size: self.keys.stream(index, Stage::Size),
            split: self.keys.stream(index, Stage::Split),
            placement: self.keys.stream(index, Stage::Placement),
            message: self.keys.stream(index, Stage::Message),
        };

        let times = self.commit_times(dev, window, &mut s.timing)?;
        let size = size_distribution(dev)?;
        let noise = Normal::new(0.0, SPLIT_NOISE)
            .map_err(|e| SimError::invariant(STAGE, &dev.user_id, e.to_string()))?;
        let ai_factor = seniority_ai_factor(dev.seniority);

        let mut commits = Vec::with_capacity(times.len());
        let mut item: Option<WorkItem<'_>> = None;
        let mut items_started = 0u32;

        for (k, timestamp) in times.into_iter().enumerate() {
            let direct = s.placement.gen_bool(DEFAULT_BRANCH_SHARE);
            let (repo, branch, kind, file_ids) = if direct {
                let repo = repos[s.placement.gen_range(0..repos.len())];
                let kind = WorkKind::pick(&mut s.placement);
                let count = files_per_commit(dev, repo, &mut s.placement);
                let ids = pool_files(repo, count, &mut s.placement);
                (repo, repo.default_branch.clone(), kind, ids)
            } else {
                if item.as_ref().map_or(true, |w| w.remaining == 0) {
                    items_started += 1;
                    item = Some(start_item(dev, &repos, items_started, &mut s.placement));
                }
                let Some(w) = item.as_mut() else {
                    return Err(SimError::invariant(STAGE, &dev.user_id, "work item missing"));
                };
                w.remaining -= 1;
                let ids = item_files(w, dev, &mut s.placement);
                (w.repo, w.branch.clone(), w.kind, ids)
            };

            // Size and split
            let added_total = (size.sample(&mut s.size).round() as u32).max(1);
            let ai_ratio =
                (dev.acceptance_rate * ai_factor + noise.sample(&mut s.split)).clamp(0.0, 1.0);
            let tab_share = s.split.gen_range(0.6..=0.8);
            let deleted_total =
                (f64::from(added_total) * s.split.gen_range(0.1..=0.3)).round() as u32;
            let lines = CommitLines {
                added: split_lines(added_total, ai_ratio, tab_share),
                deleted: split_lines(deleted_total, ai_ratio, tab_share),
            };

            let files =
                place_changes(repo, &file_ids, added_total, deleted_total, &mut s.placement);
            let message = self.message(kind, repo, &file_ids, &mut s.message);

            commits.push(Commit {
                hash: self.keys.commit_hash(index, k as u64),
                author_id: dev.user_id.clone(),
                repo: repo.repo_name.clone(),
                is_default_branch: direct,
                branch,
                timestamp,
                lines,
                files,
                message,
                pr_number: None,
            });
        }

        tracing::debug!(
            developer = %dev.user_id,
            commits = commits.len(),
            work_items = items_started,
            "generated commits"
        );
        Ok(commits)
    }

    fn commit_times(
        &self,
        dev: &Developer,
        window: TimeWindow,
        rng: &mut ChaCha8Rng,
    ) -> SimResult<Vec<DateTime<Utc>>> {
        let per_day = self.commits_per_day(dev);
        let hours = f64::from(dev.working_hours.hours());
        let days = window.day_count();
        if per_day <= 0.0 || hours <= 0.0 || days == 0 {
            return Ok(Vec::new());
        }

        let gaps = Exp::new(per_day / hours)
            .map_err(|e| SimError::invariant(STAGE, &dev.user_id, e.to_string()))?;
        let horizon = f64::from(days) * hours;
        let day0 = window.start_of_first_day();

        let mut out = Vec::new();
        let mut t = 0.0;
        loop {
            t += gaps.sample(rng);
            if t >= horizon {
                break;
            }
            let day = (t / hours).floor();
            let offset = f64::from(dev.working_hours.start) + (t - day * hours);
            let ts = day0
                + Duration::days(day as i64)
                + Duration::milliseconds((offset * 3_600_000.0) as i64);
            if window.contains(ts) {
                out.push(ts);
            }
        }
        Ok(out)
    }

    fn message(
        &self,
        kind: WorkKind,
        repo: &Repository,
        file_ids: &[u32],
        rng: &mut ChaCha8Rng,
    ) -> String {
        let component = file_ids
            .first()
            .map(|id| MODULES[*id as usize % MODULES.len()])
            .unwrap_or(repo.short_name());
        let feature = FEATURES[rng.gen_range(0..FEATURES.len())];
        let issue = ISSUES[rng.gen_range(0..ISSUES.len())];
        let vars = [("component", component), ("feature_name", feature), ("issue", issue)];

        let seeded = kind.templates(&self.seed.text_templates.commit_messages);
        match seeded.choose(rng) {
            Some(t) => render_template(t, &vars),
            None => {
                let fallback = kind.fallback();
                render_template(fallback[rng.gen_range(0..fallback.len())], &vars)
            }
        }
    }
}

fn size_distribution(dev: &Developer) -> SimResult<LogNormal<f64>> {
    let mean = (f64::from(dev.pr_behavior.avg_pr_size_loc) / 3.0).max(1.0);
    let mu = mean.ln() - SIZE_SIGMA * SIZE_SIGMA / 2.0;
    LogNormal::new(mu, SIZE_SIGMA)
        .map_err(|e| SimError::invariant(STAGE, &dev.user_id, e.to_string()))
}

/// Splits `total` lines by AI ratio, then the AI share by tab share.
pub fn split_lines(total: u32, ai_ratio: f64, tab_share: f64) -> LineSplit {
    let ai = ((f64::from(total) * ai_ratio).round() as u32).min(total);
    let tab = ((f64::from(ai) * tab_share).round() as u32).min(ai);
    LineSplit {
        tab,
        composer: ai - tab,
        non_ai: total - ai,
    }
}

fn start_item<'s>(
    dev: &Developer,
    repos: &[&'s Repository],
    n: u32,
    rng: &mut ChaCha8Rng,
) -> WorkItem<'s> {
    let repo = repos[rng.gen_range(0..repos.len())];
    let kind = WorkKind::pick(rng);
    let (lo, hi) = work_item_length(dev.seniority);
    let size = dev.pr_behavior.avg_files_per_pr.clamp(1, repo.file_count);
    WorkItem {
        repo,
        kind,
        branch: format!("{}/{}-{}", kind.name(), dev.user_id, n),
        files: pool_files(repo, size, rng),
        remaining: rng.gen_range(lo..=hi),
    }
}

fn files_per_commit(dev: &Developer, repo: &Repository, rng: &mut ChaCha8Rng) -> u32 {
    let max = MAX_FILES_PER_COMMIT
        .min(dev.pr_behavior.avg_files_per_pr)
        .min(repo.file_count)
        .max(1);
    rng.gen_range(1..=max)
}

fn pool_files(repo: &Repository, n: u32, rng: &mut ChaCha8Rng) -> Vec<u32> {
    let n = n.min(repo.file_count) as usize;
    index::sample(rng, repo.file_count as usize, n)
        .into_iter()
        .map(|i| i as u32)
        .collect()
}

/// Files for a work-item commit: mostly the item's own set, occasionally
/// drifting to another file in the repository.
fn item_files(item: &WorkItem<'_>, dev: &Developer, rng: &mut ChaCha8Rng) -> Vec<u32> {
    let n = files_per_commit(dev, item.repo, rng) as usize;
    let mut ids: Vec<u32> = item
        .files
        .choose_multiple(rng, n.min(item.files.len()))
        .copied()
        .collect();

    if item.repo.file_count as usize > ids.len() && rng.gen_bool(SCOPE_DRIFT_SHARE) {
        let extra = rng.gen_range(0..item.repo.file_count);
        if !ids.contains(&extra) {
            if let Some(last) = ids.last_mut() {
                *last = extra;
            }
        }
    }
    ids
}

fn apportion(total: u32, parts: usize, rng: &mut ChaCha8Rng) -> Vec<u32> {
    if parts <= 1 {
        return vec![total];
    }
    let weights: Vec<f64> = (0..parts).map(|_| rng.gen_range(0.5..1.5)).collect();
    let sum: f64 = weights.iter().sum();
    let mut out: Vec<u32> = weights
        .iter()
        .map(|w| (f64::from(total) * w / sum).floor() as u32)
        .collect();
    let assigned: u32 = out.iter().sum();
    out[0] += total - assigned;
    out
}

fn place_changes(
    repo: &Repository,
    file_ids: &[u32],
    added: u32,
    deleted: u32,
    rng: &mut ChaCha8Rng,
) -> Vec<FileChange> {
    let adds = apportion(added, file_ids.len(), rng);
    let dels = apportion(deleted, file_ids.len(), rng);
    file_ids
        .iter()
        .zip(adds.into_iter().zip(dels))
        .map(|(id, (lines_added, lines_deleted))| {
            let region = lines_added.max(lines_deleted);
            let last_start = VIRTUAL_FILE_LINES.saturating_sub(region).max(1);
            FileChange {
                path: file_path(repo, *id),
                start_line: rng.gen_range(1..=last_start),
                lines_added,
                lines_deleted,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_with, two_developer_seed, window_days};
    use proptest::prelude::*;

    #[test]
    fn test_render_template() {
        let vars = [("component", "api"), ("issue", "timeout")];
        assert_eq!(
            render_template("Fix {{ issue }} in {{component}}", &vars),
            "Fix timeout in api"
        );
        assert_eq!(render_template("Keep {{ unknown }}", &vars), "Keep {{ unknown }}");
        assert_eq!(render_template("Dangling {{ issue", &vars), "Dangling {{ issue");
    }

    #[test]
    fn test_split_lines_reconciles() {
        let s = split_lines(101, 0.73, 0.65);
        assert_eq!(s.total(), 101);
        assert!(s.tab >= s.composer);
        assert_eq!(split_lines(0, 0.5, 0.7), LineSplit::default());
        assert_eq!(split_lines(10, 1.0, 0.7).non_ai, 0);
    }

    #[test]
    fn test_apportion_sums() {
        let mut rng = SeedHierarchy::new(1).stream(0, Stage::Placement);
        for total in [0, 1, 2, 17, 500] {
            for parts in 1..4 {
                assert_eq!(apportion(total, parts, &mut rng).iter().sum::<u32>(), total);
            }
        }
    }

    #[test]
    fn test_commits_respect_working_hours_and_window() {
        let seed = two_developer_seed();
        let keys = SeedHierarchy::from_document(&seed).unwrap();
        let window = window_days(7);
        let gen = CommitGenerator::new(&seed, keys, Velocity::High);

        for (i, dev) in seed.developers.iter().enumerate() {
            let commits = gen.generate_for(i, window).unwrap();
            assert!(!commits.is_empty());
            for c in &commits {
                assert!(window.contains(c.timestamp));
                let hour = c.timestamp.format("%H").to_string().parse::<u32>().unwrap();
                assert!(hour >= dev.working_hours.start && hour < dev.working_hours.end);
                assert!(c.files_reconcile());
                assert!(c.files.len() as u32 <= MAX_FILES_PER_COMMIT);
            }
            assert!(commits.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[test]
    fn test_branches_and_default_share() {
        let seed = seed_with(1, 0.5);
        let keys = SeedHierarchy::from_document(&seed).unwrap();
        let commits = CommitGenerator::new(&seed, keys, Velocity::High)
            .generate_for(0, window_days(120))
            .unwrap();
        let direct = commits.iter().filter(|c| c.is_default_branch).count();
        let share = direct as f64 / commits.len() as f64;
        assert!(share > 0.03 && share < 0.2, "default-branch share {share}");
        for c in commits.iter().filter(|c| !c.is_default_branch) {
            let (kind, rest) = c.branch.split_once('/').unwrap();
            assert!(["feature", "bugfix", "refactor", "chore"].contains(&kind));
            assert!(rest.starts_with(&c.author_id));
        }
    }

    #[test]
    fn test_zero_repository_developer_is_invariant_error() {
        let mut seed = two_developer_seed();
        seed.developers[1].team = "Nobody".into();
        let keys = SeedHierarchy::from_document(&seed).unwrap();
        let err = CommitGenerator::new(&seed, keys, Velocity::Medium)
            .generate_for(1, window_days(3))
            .unwrap_err();
        match err {
            SimError::Invariant { stage, entity, .. } => {
                assert_eq!(stage, STAGE);
                assert_eq!(entity, seed.developers[1].user_id);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_velocity_scales_commit_count() {
        let seed = seed_with(1, 0.5);
        let keys = SeedHierarchy::from_document(&seed).unwrap();
        let w = window_days(60);
        let count = |v| CommitGenerator::new(&seed, keys, v).generate_for(0, w).unwrap().len();
        let (low, high) = (count(Velocity::Low), count(Velocity::High));
        assert!(high > 2 * low, "low={low} high={high}");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn line_categories_reconcile(acceptance in 0.0f64..=1.0, days in 1u32..10) {
            let seed = seed_with(2, acceptance);
            let keys = SeedHierarchy::from_document(&seed).unwrap();
            let gen = CommitGenerator::new(&seed, keys, Velocity::High);
            for i in 0..seed.developers.len() {
                for c in gen.generate_for(i, window_days(days)).unwrap() {
                    let l = c.lines;
                    let added = f64::from(l.added.total());
                    let deleted = f64::from(l.deleted.total());
                    prop_assert!(added >= 1.0);
                    // Deletions are 10-30 % of additions, up to rounding
                    prop_assert!(deleted >= 0.1 * added - 0.5 && deleted <= 0.3 * added + 0.5);

                    // Tab completions are 60-80 % of AI lines on both sides
                    for side in [l.added, l.deleted] {
                        let (ai, tab) = (f64::from(side.ai()), f64::from(side.tab));
                        prop_assert!(tab >= 0.6 * ai - 0.5 && tab <= 0.8 * ai + 0.5);
                    }

                    // Both sides split at the same AI ratio
                    let ai_added = f64::from(l.added.ai());
                    let lo = deleted * (ai_added - 0.5).max(0.0) / added - 0.5;
                    let hi = deleted * (ai_added + 0.5) / added + 0.5;
                    let ai_deleted = f64::from(l.deleted.ai());
                    prop_assert!(ai_deleted >= lo - 1e-9 && ai_deleted <= hi + 1e-9);
                    prop_assert!(c.files_reconcile());
                    prop_assert_eq!(c.hash.len(), 40);
                }
            }
        }

        #[test]
        fn generation_is_reproducible(days in 1u32..8, index in 0usize..3) {
            let seed = seed_with(3, 0.6);
            let keys = SeedHierarchy::from_document(&seed).unwrap();
            let gen = CommitGenerator::new(&seed, keys, Velocity::Medium);
            let a = gen.generate_for(index, window_days(days)).unwrap();
            let b = gen.generate_for(index, window_days(days)).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
