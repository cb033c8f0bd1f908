//! In-Memory Store
//! ================
//!
//! Thread-safe storage for the generated corpus. Each top-level collection
//! (commits, pull requests, review comments) sits behind its own `RwLock`;
//! every query takes exactly one lock hold, and [`Store::snapshot`] holds all
//! three read locks at once so a research pass never observes a torn view.
//!
//! Locks are always acquired in the order commits → prs → reviews.
//!
//! Time-range queries take a [`TimeWindow`]; a reversed window yields an
//! empty result rather than an error.

use crate::model::{Commit, PrState, PullRequest, QualityFlags, ReviewComment};
use chrono::{DateTime, Utc};
use codeflow_env::{SimError, SimResult, TimeWindow};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

type Timestamp = DateTime<Utc>;

/// Secondary index entry: (key, timestamp, hash).
type KeyedIndex = BTreeSet<(String, Timestamp, String)>;

// =============================================================================
// TABLES
// =============================================================================

#[derive(Debug, Default)]
struct CommitTable {
    rows: BTreeMap<(Timestamp, String), Commit>,
    by_hash: HashMap<String, Timestamp>,
    by_repo: KeyedIndex,
    by_author: KeyedIndex,
}

impl CommitTable {
    fn contains(&self, hash: &str) -> bool {
        self.by_hash.contains_key(hash)
    }

    fn insert(&mut self, commit: Commit) {
        let ts = commit.timestamp;
        self.by_hash.insert(commit.hash.clone(), ts);
        self.by_repo
            .insert((commit.repo.clone(), ts, commit.hash.clone()));
        self.by_author
            .insert((commit.author_id.clone(), ts, commit.hash.clone()));
        self.rows.insert((ts, commit.hash.clone()), commit);
    }

    fn get(&self, hash: &str) -> Option<&Commit> {
        let ts = self.by_hash.get(hash)?;
        self.rows.get(&(*ts, hash.to_string()))
    }

    fn get_mut(&mut self, hash: &str) -> Option<&mut Commit> {
        let ts = *self.by_hash.get(hash)?;
        self.rows.get_mut(&(ts, hash.to_string()))
    }

    fn range(&self, window: TimeWindow) -> impl Iterator<Item = &Commit> + '_ {
        let lower = if window.is_empty() {
            Bound::Excluded((DateTime::<Utc>::MAX_UTC, String::new()))
        } else {
            Bound::Included((window.from, String::new()))
        };
        self.rows
            .range((lower, Bound::Unbounded))
            .take_while(move |((ts, _), _)| *ts <= window.to)
            .map(|(_, c)| c)
    }

    fn range_keyed(&self, index: &KeyedIndex, key: &str, window: TimeWindow) -> Vec<Commit> {
        if window.is_empty() {
            return Vec::new();
        }
        index
            .range((key.to_string(), window.from, String::new())..)
            .take_while(|(k, ts, _)| k == key && *ts <= window.to)
            .filter_map(|(_, ts, hash)| self.rows.get(&(*ts, hash.clone())))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct PrTable {
    rows: BTreeMap<u64, PullRequest>,
    by_repo: BTreeSet<(String, u64)>,
}

#[derive(Debug, Default)]
struct ReviewTable {
    by_pr: BTreeMap<u64, Vec<ReviewComment>>,
    count: usize,
}

// =============================================================================
// STORE
// =============================================================================

/// Row counts per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub commits: usize,
    pub pull_requests: usize,
    pub review_comments: usize,
}

/// A consistent view of the store for one window.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Commits in the window, ordered by (timestamp, hash)
    pub commits: Vec<Commit>,

    /// PRs referenced by any commit in the window
    pub pull_requests: BTreeMap<u64, PullRequest>,

    /// All member commits of those PRs, including ones outside the window
    pub pr_commits: BTreeMap<u64, Vec<Commit>>,

    /// Review comments of those PRs, in insertion order
    pub reviews: BTreeMap<u64, Vec<ReviewComment>>,
}

/// In-memory corpus store.
///
/// Construct one per engine and share it through an `Arc`; independent stores
/// never interfere.
#[derive(Debug, Default)]
pub struct Store {
    commits: RwLock<CommitTable>,
    prs: RwLock<PrTable>,
    reviews: RwLock<ReviewTable>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped store for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // ---- commits -----------------------------------------------------------

    /// Inserts one commit. Fails on a duplicate hash.
    pub fn insert_commit(&self, commit: Commit) -> SimResult<()> {
        self.insert_commits(vec![commit]).map(|_| ())
    }

    /// Inserts a batch under a single lock hold. Either every commit is
    /// inserted or none is.
    pub fn insert_commits(&self, commits: Vec<Commit>) -> SimResult<usize> {
        let mut table = write(&self.commits);
        let mut seen = BTreeSet::new();
        for c in &commits {
            if table.contains(&c.hash) || !seen.insert(c.hash.as_str()) {
                return Err(SimError::invariant("store", &c.hash, "duplicate commit hash"));
            }
        }
        let n = commits.len();
        for c in commits {
            table.insert(c);
        }
        Ok(n)
    }

    /// Looks up a commit by hash.
    pub fn commit(&self, hash: &str) -> Option<Commit> {
        read(&self.commits).get(hash).cloned()
    }

    /// Commits in the window, ordered by (timestamp, hash).
    pub fn commits_between(&self, window: TimeWindow) -> Vec<Commit> {
        read(&self.commits).range(window).cloned().collect()
    }

    /// Commits to `repo` in the window.
    pub fn commits_for_repo(&self, repo: &str, window: TimeWindow) -> Vec<Commit> {
        let table = read(&self.commits);
        table.range_keyed(&table.by_repo, repo, window)
    }

    /// Commits by `author_id` in the window.
    pub fn commits_for_author(&self, author_id: &str, window: TimeWindow) -> Vec<Commit> {
        let table = read(&self.commits);
        table.range_keyed(&table.by_author, author_id, window)
    }

    /// Sets the PR back-reference on each listed commit.
    ///
    /// Fails without modifying anything if a hash is unknown or already
    /// belongs to a different PR.
    pub fn link_commits_to_pr(&self, pr_number: u64, hashes: &[String]) -> SimResult<()> {
        let mut table = write(&self.commits);
        for hash in hashes {
            match table.get(hash) {
                None => {
                    return Err(SimError::invariant("store", hash, "link to unknown commit"));
                }
                Some(c) if c.pr_number.is_some_and(|n| n != pr_number) => {
                    return Err(SimError::invariant(
                        "store",
                        hash,
                        format!("commit already belongs to PR #{}", c.pr_number.unwrap_or(0)),
                    ));
                }
                Some(_) => {}
            }
        }
        for hash in hashes {
            if let Some(c) = table.get_mut(hash) {
                c.pr_number = Some(pr_number);
            }
        }
        Ok(())
    }

    // ---- pull requests -----------------------------------------------------

    /// Inserts a batch of PRs under one lock hold. Fails on a duplicate number.
    pub fn insert_prs(&self, prs: Vec<PullRequest>) -> SimResult<usize> {
        let mut table = write(&self.prs);
        let mut seen = BTreeSet::new();
        for pr in &prs {
            if table.rows.contains_key(&pr.number) || !seen.insert(pr.number) {
                return Err(SimError::invariant(
                    "store",
                    format!("PR #{}", pr.number),
                    "duplicate PR number",
                ));
            }
        }
        let n = prs.len();
        for pr in prs {
            table.by_repo.insert((pr.repo.clone(), pr.number));
            table.rows.insert(pr.number, pr);
        }
        Ok(n)
    }

    pub fn insert_pr(&self, pr: PullRequest) -> SimResult<()> {
        self.insert_prs(vec![pr]).map(|_| ())
    }

    /// Looks up a PR by number.
    pub fn pull_request(&self, number: u64) -> Option<PullRequest> {
        read(&self.prs).rows.get(&number).cloned()
    }

    /// All PRs in number order.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        read(&self.prs).rows.values().cloned().collect()
    }

    /// PRs in `repo`, optionally restricted to one state.
    pub fn prs_for_repo(&self, repo: &str, state: Option<PrState>) -> Vec<PullRequest> {
        let table = read(&self.prs);
        table
            .by_repo
            .range((repo.to_string(), 0)..)
            .take_while(|(r, _)| r == repo)
            .filter_map(|(_, n)| table.rows.get(n))
            .filter(|pr| state.map_or(true, |s| pr.state == s))
            .cloned()
            .collect()
    }

    /// Writes quality flags onto an existing PR.
    pub fn set_quality(&self, number: u64, flags: QualityFlags) -> SimResult<()> {
        let mut table = write(&self.prs);
        let pr = table.rows.get_mut(&number).ok_or_else(|| {
            SimError::invariant("quality", format!("PR #{}", number), "unknown PR")
        })?;
        pr.quality = flags;
        Ok(())
    }

    // ---- reviews -----------------------------------------------------------

    /// Appends review comments under one lock hold.
    pub fn insert_review_comments(&self, comments: Vec<ReviewComment>) -> usize {
        let mut table = write(&self.reviews);
        let n = comments.len();
        for c in comments {
            table.by_pr.entry(c.pr_number).or_default().push(c);
        }
        table.count += n;
        n
    }

    /// Comments on one PR, in insertion order.
    pub fn review_comments(&self, pr_number: u64) -> Vec<ReviewComment> {
        read(&self.reviews)
            .by_pr
            .get(&pr_number)
            .cloned()
            .unwrap_or_default()
    }

    // ---- whole store -------------------------------------------------------

    /// Consistent view of one window, taken under all three read locks.
    pub fn snapshot(&self, window: TimeWindow) -> StoreSnapshot {
        let commits = read(&self.commits);
        let prs = read(&self.prs);
        let reviews = read(&self.reviews);

        let in_window: Vec<Commit> = commits.range(window).cloned().collect();
        let numbers: BTreeSet<u64> = in_window.iter().filter_map(|c| c.pr_number).collect();

        let mut snap = StoreSnapshot {
            commits: in_window,
            ..StoreSnapshot::default()
        };
        for n in numbers {
            let Some(pr) = prs.rows.get(&n) else { continue };
            let members = pr
                .commit_hashes
                .iter()
                .filter_map(|h| commits.get(h))
                .cloned()
                .collect();
            snap.pr_commits.insert(n, members);
            snap.pull_requests.insert(n, pr.clone());
            if let Some(rc) = reviews.by_pr.get(&n) {
                snap.reviews.insert(n, rc.clone());
            }
        }
        snap
    }

    pub fn counts(&self) -> StoreCounts {
        let commits = read(&self.commits).rows.len();
        let pull_requests = read(&self.prs).rows.len();
        let review_comments = read(&self.reviews).count;
        StoreCounts {
            commits,
            pull_requests,
            review_comments,
        }
    }

    /// Drops all generated data.
    pub fn clear(&self) {
        *write(&self.commits) = CommitTable::default();
        *write(&self.prs) = PrTable::default();
        *write(&self.reviews) = ReviewTable::default();
    }
}
