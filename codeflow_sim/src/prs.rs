//! Pull-Request & Review Generator
//! ================================
//!
//! Groups non-default-branch commits into PR clusters and simulates each
//! cluster's review timeline:
//!
//! ```text
//! commits ──► open (initial prefix + delay) ──► pickup ──► iteration 1 … n
//!                                                              │
//!                                     merge (approval + delay) ┴ or close
//! ```
//!
//! Each cluster draws from a stream keyed by its author and its first commit
//! hash, so clusters can be built in any order (or in parallel) and still
//! produce the same PRs.

use crate::commits::render_template;
use crate::rng::{salt_from_hash, SeedHierarchy, Stage};
use chrono::{DateTime, Duration, Utc};
use codeflow_core::{
    CommentAnchor, Commit, Developer, LineSplit, PrLifecycle, PrState, PullRequest,
    QualityFlags, ReviewComment, ReviewCommentTemplates, ReviewState, SeedDocument,
};
use codeflow_env::{SimError, SimResult};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, LogNormal, Poisson};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::{Builder, Uuid};

const STAGE: &str = "review_generation";
const DELAY_SIGMA: f64 = 0.6;
const OPEN_DELAY_MEAN_HOURS: f64 = 1.0;
const MAX_COMMENTS_PER_ROUND: u32 = 25;
const MAX_REVIEWERS: usize = 3;

/// Converts fractional hours to a duration (millisecond precision).
pub(crate) fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0) as i64)
}

// =============================================================================
// CLUSTERING
// =============================================================================

/// Commits that become one pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Roster position of the author
    pub author_index: usize,
    pub author_id: String,
    pub repo: String,
    pub branch: String,
    /// Member commits ordered by (timestamp, hash)
    pub commits: Vec<Commit>,
}

/// Groups commits by (author, repo, branch), splitting a group wherever two
/// consecutive commits are more than `gap_hours` apart.
///
/// Default-branch commits never join a cluster. Clusters come back ordered
/// by (first timestamp, first hash), which is the PR numbering order.
pub fn cluster_commits(seed: &SeedDocument, commits: &[Commit], gap_hours: f64) -> Vec<Cluster> {
    let positions: HashMap<&str, usize> = seed
        .developers
        .iter()
        .enumerate()
        .map(|(i, d)| (d.user_id.as_str(), i))
        .collect();

    let mut groups: BTreeMap<(&str, &str, &str), Vec<&Commit>> = BTreeMap::new();
    for c in commits.iter().filter(|c| !c.is_default_branch) {
        groups
            .entry((c.author_id.as_str(), c.repo.as_str(), c.branch.as_str()))
            .or_default()
            .push(c);
    }

    let gap = hours(gap_hours);
    let mut clusters = Vec::new();
    for ((author, repo, branch), mut members) in groups {
        let Some(&author_index) = positions.get(author) else {
            tracing::debug!(author, "skipping commits by developer not in roster");
            continue;
        };
        members.sort_by(|a, b| (a.timestamp, &a.hash).cmp(&(b.timestamp, &b.hash)));

        let mut current: Vec<Commit> = Vec::new();
        let mut flush = |current: &mut Vec<Commit>| {
            if !current.is_empty() {
                clusters.push(Cluster {
                    author_index,
                    author_id: author.to_string(),
                    repo: repo.to_string(),
                    branch: branch.to_string(),
                    commits: std::mem::take(current),
                });
            }
        };
        for c in members {
            if current.last().is_some_and(|last| c.timestamp - last.timestamp > gap) {
                flush(&mut current);
            }
            current.push(c.clone());
        }
        flush(&mut current);
    }

    clusters.sort_by_cached_key(|c| c.commits.first().map(|f| (f.timestamp, f.hash.clone())));
    clusters
}

// =============================================================================
// REVIEW SIMULATION
// =============================================================================

/// A PR together with the review comments written on it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPr {
    pub pull_request: PullRequest,
    pub comments: Vec<ReviewComment>,
}

/// Builds PRs and review timelines from clusters.
///
/// Events later than `horizon` (the end of the generation window) have not
/// happened yet: they are dropped, and a PR whose terminal event lies past the
/// horizon stays open.
#[derive(Debug, Clone, Copy)]
pub struct PrGenerator<'a> {
    seed: &'a SeedDocument,
    keys: SeedHierarchy,
    horizon: DateTime<Utc>,
}

impl<'a> PrGenerator<'a> {
    pub fn new(seed: &'a SeedDocument, keys: SeedHierarchy, horizon: DateTime<Utc>) -> Self {
        Self { seed, keys, horizon }
    }

    /// Builds PR `number` from `cluster`.
    pub fn build(&self, number: u64, cluster: &Cluster) -> SimResult<GeneratedPr> {
        let lc = &self.seed.pr_lifecycle;
        let entity = || format!("PR #{} ({})", number, cluster.branch);
        let author = self
            .seed
            .developers
            .get(cluster.author_index)
            .ok_or_else(|| SimError::invariant(STAGE, entity(), "author not in roster"))?;
        let (Some(first), Some(last)) = (cluster.commits.first(), cluster.commits.last()) else {
            return Err(SimError::invariant(STAGE, entity(), "empty cluster"));
        };
        let mut rng = self
            .keys
            .salted_stream(cluster.author_index, Stage::Review, salt_from_hash(&first.hash));

        // Open after an initial prefix of the cluster
        let n = cluster.commits.len();
        let initial = ((n as f64 * rng.gen_range(0.5..=1.0)).ceil() as usize).clamp(1, n);
        let open_delay = Exp::new(1.0 / OPEN_DELAY_MEAN_HOURS)
            .map_err(|e| SimError::invariant(STAGE, entity(), e.to_string()))?
            .sample(&mut rng);
        let created_at = cluster.commits[initial - 1].timestamp + hours(open_delay);

        let base_branch = self
            .seed
            .repository(&cluster.repo)
            .map_or_else(|| "main".to_string(), |r| r.default_branch.clone());
        let mut pr = aggregate(number, cluster, base_branch, created_at);
        let reviewers = pick_reviewers(self.seed, author, &mut rng);
        let merge = rng.gen_bool(lc.merge_probability);
        let mut comments = Vec::new();

        let ready_at = if reviewers.is_empty() {
            created_at.max(last.timestamp)
        } else {
            let iterations = draw_iterations(lc, author.pr_behavior.iteration_tolerance, &mut rng);
            let mut rounds = Vec::with_capacity(iterations as usize);
            let mut at = created_at + lognormal_hours(lc.pickup_time_hours, &mut rng, &entity)?;
            let gap_mean = lc.review_lead_time_hours / f64::from(iterations);
            for i in 0..iterations {
                if i > 0 {
                    at = at + lognormal_hours(gap_mean, &mut rng, &entity)?;
                }
                rounds.push(at);
            }
            if let Some(final_round) = rounds.last_mut() {
                if *final_round < last.timestamp {
                    *final_round = last.timestamp + Duration::minutes(rng.gen_range(5..=90));
                }
            }

            let final_round = rounds.last().copied().unwrap_or(created_at);
            let mut writer = CommentWriter {
                number,
                cluster,
                templates: &self.seed.text_templates.review_comments,
                rng: &mut rng,
            };
            for (i, round) in rounds.iter().enumerate() {
                let iteration = i as u32 + 1;
                let is_final = iteration == iterations;
                for reviewer in &reviewers {
                    let thoroughness = self
                        .seed
                        .developer(reviewer)
                        .map_or(0.5, |d| d.pr_behavior.review_thoroughness);
                    let lambda = f64::from(pr.lines_changed()) / 100.0
                        * lc.comments_per_100_loc
                        * thoroughness
                        / f64::from(iterations);
                    let state = if is_final {
                        ReviewState::Commented
                    } else {
                        ReviewState::ChangesRequested
                    };
                    writer.round(reviewer, iteration, *round, lambda, state, &mut comments)?;
                }
            }

            pr.first_review_at = rounds.first().copied().filter(|t| *t <= self.horizon);
            pr.last_review_at = rounds.iter().copied().filter(|t| *t <= self.horizon).last();
            pr.review_iterations = rounds.iter().filter(|t| **t <= self.horizon).count() as u32;

            if merge {
                let approved = writer.approvals(&reviewers, iterations, final_round, &mut comments);
                pr.approved_at = Some(approved).filter(|t| *t <= self.horizon);
                approved
            } else {
                final_round
            }
        };

        let terminal = ready_at + lognormal_hours(lc.merge_delay_hours, &mut rng, &entity)?;
        if terminal <= self.horizon {
            if merge {
                pr.state = PrState::Merged;
                pr.merged_at = Some(terminal);
            } else {
                pr.state = PrState::Closed;
                pr.closed_at = Some(terminal);
            }
        }

        pr.reviewers = reviewers;
        comments.retain(|c| c.timestamp <= self.horizon);
        Ok(GeneratedPr {
            pull_request: pr,
            comments,
        })
    }
}

/// Line, file and AI aggregates over the cluster. Commits at or before
/// `created_at` form the initial change set.
fn aggregate(
    number: u64,
    cluster: &Cluster,
    base_branch: String,
    created_at: DateTime<Utc>,
) -> PullRequest {
    let mut added = LineSplit::default();
    let mut deletions = 0;
    let mut initial_additions = 0;
    let mut all_files = BTreeSet::new();
    let mut initial_files = BTreeSet::new();

    for c in &cluster.commits {
        added = added.add(&c.lines.added);
        deletions += c.lines.deleted.total();
        all_files.extend(c.files.iter().map(|f| f.path.as_str()));
        if c.timestamp <= created_at {
            initial_additions += c.lines.added.total();
            initial_files.extend(c.files.iter().map(|f| f.path.as_str()));
        }
    }

    let additions = added.total();
    let ai_ratio = if additions == 0 {
        0.0
    } else {
        f64::from(added.ai()) / f64::from(additions)
    };
    let title = cluster
        .commits
        .first()
        .map(|c| c.message.clone())
        .unwrap_or_else(|| cluster.branch.clone());

    PullRequest {
        number,
        title,
        author_id: cluster.author_id.clone(),
        repo: cluster.repo.clone(),
        head_branch: cluster.branch.clone(),
        base_branch,
        commit_hashes: cluster.commits.iter().map(|c| c.hash.clone()).collect(),
        additions,
        deletions,
        tab_lines: added.tab,
        composer_lines: added.composer,
        initial_additions,
        initial_files: initial_files.len() as u32,
        changed_files: all_files.len() as u32,
        ai_ratio,
        state: PrState::Open,
        created_at,
        first_review_at: None,
        last_review_at: None,
        approved_at: None,
        merged_at: None,
        closed_at: None,
        review_iterations: 0,
        reviewers: Vec::new(),
        quality: QualityFlags::default(),
    }
}

/// One to three reviewers from the author's team, topped up from other teams
/// when the team is too small. Never includes the author.
fn pick_reviewers(seed: &SeedDocument, author: &Developer, rng: &mut ChaCha8Rng) -> Vec<String> {
    let (teammates, others): (Vec<&Developer>, Vec<&Developer>) = seed
        .developers
        .iter()
        .filter(|d| d.user_id != author.user_id)
        .partition(|d| d.team == author.team);

    let want = rng.gen_range(1..=MAX_REVIEWERS);
    let mut picked: Vec<String> = teammates
        .choose_multiple(rng, want.min(teammates.len()))
        .map(|d| d.user_id.clone())
        .collect();
    if picked.len() < want {
        let more = (want - picked.len()).min(others.len());
        picked.extend(others.choose_multiple(rng, more).map(|d| d.user_id.clone()));
    }
    picked
}

/// Review rounds for one PR, capped by the lifecycle maximum and by how many
/// rounds the author tolerates.
fn draw_iterations(lc: &PrLifecycle, tolerance: u32, rng: &mut ChaCha8Rng) -> u32 {
    let drawn = match Poisson::new(lc.iterations_lambda) {
        Ok(p) => p.sample(rng) as u32,
        Err(_) => 1,
    };
    drawn.clamp(1, lc.max_iterations.min(tolerance).max(1))
}

fn lognormal_hours(
    mean: f64,
    rng: &mut ChaCha8Rng,
    entity: &dyn Fn() -> String,
) -> SimResult<Duration> {
    let mu = mean.max(f64::MIN_POSITIVE).ln() - DELAY_SIGMA * DELAY_SIGMA / 2.0;
    let dist = LogNormal::new(mu, DELAY_SIGMA)
        .map_err(|e| SimError::invariant(STAGE, entity(), e.to_string()))?;
    Ok(hours(dist.sample(rng)))
}

fn uuid_from(rng: &mut ChaCha8Rng) -> Uuid {
    Builder::from_random_bytes(rng.gen()).into_uuid()
}

const STYLE_FALLBACK: &[&str] = &[
    "Naming here could be clearer.",
    "Please run the formatter on this block.",
];
const LOGIC_FALLBACK: &[&str] = &[
    "This branch misses the empty case.",
    "Is this safe under concurrent access?",
];
const SUGGESTION_FALLBACK: &[&str] = &[
    "Consider extracting this into a helper.",
    "A table-driven test would cover this.",
];
const APPROVAL_FALLBACK: &[&str] = &["LGTM", "Looks good, ship it."];

struct CommentWriter<'c, 'r> {
    number: u64,
    cluster: &'c Cluster,
    templates: &'c ReviewCommentTemplates,
    rng: &'r mut ChaCha8Rng,
}

impl CommentWriter<'_, '_> {
    fn round(
        &mut self,
        reviewer: &str,
        iteration: u32,
        at: DateTime<Utc>,
        lambda: f64,
        state: ReviewState,
        out: &mut Vec<ReviewComment>,
    ) -> SimResult<()> {
        let count = if lambda > 0.0 {
            Poisson::new(lambda)
                .map_err(|e| {
                    SimError::invariant(STAGE, format!("PR #{}", self.number), e.to_string())
                })?
                .sample(&mut *self.rng) as u32
        } else {
            0
        };

        let templates = self.templates;
        for _ in 0..count.min(MAX_COMMENTS_PER_ROUND) {
            let anchor = self.anchor();
            let (list, fallback) = match self.rng.gen_range(0..3) {
                0 => (templates.style.as_slice(), STYLE_FALLBACK),
                1 => (templates.logic.as_slice(), LOGIC_FALLBACK),
                _ => (templates.suggestion.as_slice(), SUGGESTION_FALLBACK),
            };
            let body = comment_body(&mut *self.rng, list, fallback, anchor.as_ref());
            out.push(ReviewComment {
                id: uuid_from(&mut *self.rng),
                pr_number: self.number,
                author_id: reviewer.to_string(),
                body,
                anchor,
                state,
                iteration,
                timestamp: at + Duration::minutes(self.rng.gen_range(0..=45)),
            });
        }
        Ok(())
    }

    /// One approval per reviewer after the final round; returns the last one.
    fn approvals(
        &mut self,
        reviewers: &[String],
        iteration: u32,
        final_round: DateTime<Utc>,
        out: &mut Vec<ReviewComment>,
    ) -> DateTime<Utc> {
        let templates = self.templates;
        let mut approved_at = final_round;
        for reviewer in reviewers {
            let at = final_round + Duration::minutes(self.rng.gen_range(1..=30));
            approved_at = approved_at.max(at);
            let body = comment_body(&mut *self.rng, &templates.approval, APPROVAL_FALLBACK, None);
            out.push(ReviewComment {
                id: uuid_from(&mut *self.rng),
                pr_number: self.number,
                author_id: reviewer.clone(),
                body,
                anchor: None,
                state: ReviewState::Approved,
                iteration,
                timestamp: at,
            });
        }
        approved_at
    }

    fn anchor(&mut self) -> Option<CommentAnchor> {
        let cluster = self.cluster;
        let changes: Vec<_> = cluster.commits.iter().flat_map(|c| &c.files).collect();
        let change = changes.choose(&mut *self.rng)?;
        let span = change.lines_added.max(1);
        Some(CommentAnchor {
            path: change.path.clone(),
            line: change.start_line + self.rng.gen_range(0..span),
        })
    }
}

fn comment_body(
    rng: &mut ChaCha8Rng,
    list: &[String],
    fallback: &[&str],
    anchor: Option<&CommentAnchor>,
) -> String {
    let vars = [("file", anchor.map_or("", |a| a.path.as_str()))];
    match list.choose(rng) {
        Some(t) => render_template(t, &vars),
        None => render_template(fallback[rng.gen_range(0..fallback.len())], &vars),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commits::CommitGenerator;
    use crate::testutil::{seed_with, window_days};
    use crate::velocity::Velocity;
    use chrono::TimeZone;
    use codeflow_core::CommitLines;

    fn commit(hash: &str, branch: &str, hour: i64) -> Commit {
        Commit {
            hash: hash.to_string(),
            author_id: "user_001".into(),
            repo: "acme/api".into(),
            branch: branch.into(),
            is_default_branch: branch == "main",
            timestamp: Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap() + Duration::hours(hour),
            lines: CommitLines {
                added: LineSplit { tab: 10, composer: 5, non_ai: 5 },
                deleted: LineSplit { tab: 1, composer: 0, non_ai: 1 },
            },
            files: vec![codeflow_core::FileChange {
                path: format!("src/core/{hash}.go"),
                start_line: 10,
                lines_added: 20,
                lines_deleted: 2,
            }],
            message: format!("Add {hash}"),
            pr_number: None,
        }
    }

    #[test]
    fn test_cluster_split_on_gap() {
        let seed = seed_with(2, 0.5);
        let commits = vec![
            commit("a1", "feature/x", 0),
            commit("a2", "feature/x", 10),
            commit("a3", "feature/x", 10 + 73),
            commit("b1", "feature/y", 1),
            commit("m1", "main", 2),
        ];
        let clusters = cluster_commits(&seed, &commits, 72.0);
        let shapes: Vec<Vec<&str>> = clusters
            .iter()
            .map(|c| c.commits.iter().map(|c| c.hash.as_str()).collect())
            .collect();
        assert_eq!(shapes, vec![vec!["a1", "a2"], vec!["b1"], vec!["a3"]]);
    }

    #[test]
    fn test_reviewers_exclude_author_and_fall_back() {
        let mut seed = seed_with(3, 0.5);
        seed.developers[2].team = "Other".into();
        let mut rng = SeedHierarchy::new(5).stream(0, Stage::Review);
        for _ in 0..50 {
            let picked = pick_reviewers(&seed, &seed.developers[0], &mut rng);
            assert!(!picked.is_empty() && picked.len() <= 3);
            assert!(!picked.contains(&seed.developers[0].user_id));
            // The only teammate is always preferred
            assert_eq!(picked[0], seed.developers[1].user_id);
        }

        let solo = seed_with(1, 0.5);
        assert!(pick_reviewers(&solo, &solo.developers[0], &mut rng).is_empty());
    }

    fn generated(days: u32) -> (Vec<Cluster>, Vec<GeneratedPr>) {
        let seed = seed_with(4, 0.5);
        let keys = SeedHierarchy::from_document(&seed).unwrap();
        let window = window_days(days);
        let gen = CommitGenerator::new(&seed, keys, Velocity::Medium);
        let commits: Vec<Commit> = (0..4)
            .flat_map(|i| gen.generate_for(i, window).unwrap())
            .collect();
        let clusters = cluster_commits(&seed, &commits, seed.pr_lifecycle.cluster_gap_hours);
        let builder = PrGenerator::new(&seed, keys, window.to);
        let prs = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| builder.build(i as u64 + 1, c).unwrap())
            .collect();
        (clusters, prs)
    }

    #[test]
    fn test_timeline_is_ordered() {
        let (clusters, prs) = generated(30);
        assert!(!prs.is_empty());
        for (cluster, g) in clusters.iter().zip(&prs) {
            let pr = &g.pull_request;
            let first = &cluster.commits[0];
            let last = cluster.commits.last().unwrap();
            assert!(pr.created_at >= first.timestamp);
            assert!(pr.merged_at.is_none() || pr.closed_at.is_none());
            assert!(!pr.reviewers.contains(&pr.author_id));
            assert!(pr.initial_files >= 1 && pr.initial_files <= pr.changed_files);
            if let Some(first_review) = pr.first_review_at {
                assert!(first_review >= pr.created_at);
            }
            if let Some(t) = pr.terminal_at() {
                assert!(t >= last.timestamp);
                assert!(t >= pr.created_at);
                // Fixture developers tolerate two rounds
                assert!(pr.review_iterations >= 1 && pr.review_iterations <= 2);
                assert!(pr.last_review_at.unwrap() >= last.timestamp);
            }
            if pr.is_merged() {
                assert!(pr.approved_at.unwrap() <= pr.merged_at.unwrap());
            }
            for c in &g.comments {
                assert_ne!(c.author_id, pr.author_id);
                assert!(pr.reviewers.contains(&c.author_id));
                assert!(c.iteration >= 1);
            }
        }
        assert!(prs.iter().any(|g| g.pull_request.is_merged()));
    }

    #[test]
    fn test_iterations_capped_by_author_tolerance() {
        let lc = PrLifecycle {
            iterations_lambda: 6.0,
            max_iterations: 5,
            ..PrLifecycle::default()
        };
        let mut rng = SeedHierarchy::new(9).stream(0, Stage::Review);
        for _ in 0..200 {
            assert!((1..=2).contains(&draw_iterations(&lc, 2, &mut rng)));
            assert_eq!(draw_iterations(&lc, 0, &mut rng), 1);
        }
        let patient: Vec<u32> = (0..200).map(|_| draw_iterations(&lc, 9, &mut rng)).collect();
        assert!(patient.iter().all(|n| (1..=5).contains(n)));
        assert!(patient.contains(&5));
    }

    #[test]
    fn test_build_is_order_independent() {
        let (clusters, prs) = generated(14);
        let seed = seed_with(4, 0.5);
        let keys = SeedHierarchy::from_document(&seed).unwrap();
        let builder = PrGenerator::new(&seed, keys, window_days(14).to);
        // Rebuild in reverse order; every PR must come out identical.
        for (i, c) in clusters.iter().enumerate().rev() {
            assert_eq!(builder.build(i as u64 + 1, c).unwrap(), prs[i]);
        }
    }
}
