//! Quality outcome assignment.
//!
//! Runs once PRs have their terminal state. Revert odds come from the seed's
//! correlation table for the PR's AI-ratio band; bug-fix and hotfix flags come
//! from title/branch patterns, merge timing and the files each PR touched.
//! Each revert draw is independent: a reverted PR does not change its
//! author's odds on the next.

use crate::prs::hours;
use crate::rng::{salt_from_hash, SeedHierarchy, Stage};
use chrono::{DateTime, Utc};
use codeflow_core::{AiRatioBand, Commit, PullRequest, QualityFlags, SeedDocument};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// File paths touched by each PR, keyed by PR number.
pub type PrFiles = BTreeMap<u64, BTreeSet<String>>;

const BUG_FIX_WORDS: [&str; 5] = ["fix", "bugfix", "hotfix", "urgent", "patch"];

/// True if the title or branch contains a bug-fix word.
pub fn is_bug_fix(title: &str, branch: &str) -> bool {
    [title, branch].iter().any(|text| {
        text.split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| BUG_FIX_WORDS.iter().any(|w| word.eq_ignore_ascii_case(w)))
    })
}

/// Collects the paths each PR's member commits touched.
pub fn pr_files(prs: &[PullRequest], commits: &[Commit]) -> PrFiles {
    let by_hash: HashMap<&str, &Commit> = commits.iter().map(|c| (c.hash.as_str(), c)).collect();
    prs.iter()
        .map(|pr| {
            let paths = pr
                .commit_hashes
                .iter()
                .filter_map(|h| by_hash.get(h.as_str()))
                .flat_map(|c| c.files.iter().map(|f| f.path.clone()))
                .collect();
            (pr.number, paths)
        })
        .collect()
}

/// Assigns quality flags from the seed's correlation tables.
#[derive(Debug, Clone, Copy)]
pub struct QualityModel<'a> {
    seed: &'a SeedDocument,
    keys: SeedHierarchy,
}

impl<'a> QualityModel<'a> {
    pub fn new(seed: &'a SeedDocument, keys: SeedHierarchy) -> Self {
        Self { seed, keys }
    }

    pub fn band(&self, ai_ratio: f64) -> AiRatioBand {
        self.seed.correlations.ai_ratio_bands.band(ai_ratio)
    }

    /// Revert probability for a band (0 if the table lacks the band).
    pub fn revert_probability(&self, band: AiRatioBand) -> f64 {
        self.seed
            .correlations
            .revert_probability
            .get(&band)
            .copied()
            .unwrap_or(0.0)
    }

    /// Draws `was_reverted` for one PR on its author's quality stream.
    /// Only merged PRs can be reverted.
    pub fn draw_revert(&self, pr: &PullRequest, author_index: usize) -> bool {
        if !pr.is_merged() {
            return false;
        }
        let salt = pr.commit_hashes.first().map_or(pr.number, |h| salt_from_hash(h));
        let mut rng = self.keys.salted_stream(author_index, Stage::Quality, salt);
        rng.gen_bool(self.revert_probability(self.band(pr.ai_ratio)))
    }

    /// Computes flags for every PR, keyed by PR number.
    ///
    /// A merged PR required a hotfix when a merged bug-fix PR in the same repo
    /// touching at least one of its files landed within the hotfix window.
    pub fn assign(&self, prs: &[PullRequest], files: &PrFiles) -> BTreeMap<u64, QualityFlags> {
        let positions: HashMap<&str, usize> = self
            .seed
            .developers
            .iter()
            .enumerate()
            .map(|(i, d)| (d.user_id.as_str(), i))
            .collect();

        // Merged bug-fix PRs per repo, sorted by merge time
        let mut fixes: HashMap<&str, Vec<(DateTime<Utc>, u64)>> = HashMap::new();
        for pr in prs {
            if let (Some(merged), true) = (pr.merged_at, is_bug_fix(&pr.title, &pr.head_branch)) {
                fixes.entry(pr.repo.as_str()).or_default().push((merged, pr.number));
            }
        }
        for list in fixes.values_mut() {
            list.sort_unstable();
        }

        let no_files = BTreeSet::new();
        let touched = |number: u64| files.get(&number).unwrap_or(&no_files);
        let window = hours(self.seed.pr_lifecycle.hotfix_window_hours);
        prs.iter()
            .map(|pr| {
                let was_reverted = positions
                    .get(pr.author_id.as_str())
                    .is_some_and(|&i| self.draw_revert(pr, i));
                let required_hotfix = pr.merged_at.is_some_and(|merged| {
                    let Some(list) = fixes.get(pr.repo.as_str()) else {
                        return false;
                    };
                    let own = touched(pr.number);
                    let from = list.partition_point(|(t, _)| *t <= merged);
                    list[from..]
                        .iter()
                        .take_while(|(t, _)| *t <= merged + window)
                        .any(|(_, fix)| *fix != pr.number && !own.is_disjoint(touched(*fix)))
                });
                let flags = QualityFlags {
                    was_reverted,
                    required_hotfix,
                    is_bug_fix: is_bug_fix(&pr.title, &pr.head_branch),
                };
                (pr.number, flags)
            })
            .collect()
    }
}
