//! SDLC data model: commits, pull requests and review comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// COMMITS
// =============================================================================

/// Lines split by authoring source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSplit {
    /// Accepted quick completions
    pub tab: u32,

    /// Multi-file agent edits
    pub composer: u32,

    /// Human-typed lines
    pub non_ai: u32,
}

impl LineSplit {
    pub fn total(&self) -> u32 {
        self.tab + self.composer + self.non_ai
    }

    pub fn ai(&self) -> u32 {
        self.tab + self.composer
    }

    /// Componentwise sum.
    pub fn add(&self, other: &LineSplit) -> LineSplit {
        LineSplit {
            tab: self.tab + other.tab,
            composer: self.composer + other.composer,
            non_ai: self.non_ai + other.non_ai,
        }
    }
}

/// Added and deleted lines of one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitLines {
    pub added: LineSplit,
    pub deleted: LineSplit,
}

impl CommitLines {
    /// Fraction of added lines attributed to AI (0 when nothing was added).
    pub fn ai_ratio(&self) -> f64 {
        let total = self.added.total();
        if total == 0 {
            0.0
        } else {
            f64::from(self.added.ai()) / f64::from(total)
        }
    }
}

/// A region of one file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,

    /// First line of the touched region (1-based)
    pub start_line: u32,

    pub lines_added: u32,
    pub lines_deleted: u32,
}

/// A single commit. Immutable apart from `pr_number`, which the store sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// 40 hex chars
    pub hash: String,
    pub author_id: String,
    pub repo: String,
    pub branch: String,
    pub is_default_branch: bool,
    pub timestamp: DateTime<Utc>,
    pub lines: CommitLines,
    pub files: Vec<FileChange>,
    pub message: String,
    pub pr_number: Option<u64>,
}

impl Commit {
    pub fn ai_ratio(&self) -> f64 {
        self.lines.ai_ratio()
    }

    /// Returns true if per-file counts add up to the split totals.
    pub fn files_reconcile(&self) -> bool {
        let added: u32 = self.files.iter().map(|f| f.lines_added).sum();
        let deleted: u32 = self.files.iter().map(|f| f.lines_deleted).sum();
        added == self.lines.added.total() && deleted == self.lines.deleted.total()
    }
}

// =============================================================================
// PULL REQUESTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

impl PrState {
    pub fn name(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Merged => "merged",
            PrState::Closed => "closed",
        }
    }
}

/// Quality outcome flags, written once the PR reaches a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFlags {
    pub was_reverted: bool,
    pub required_hotfix: bool,
    pub is_bug_fix: bool,
}

/// A pull request built from one commit cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Monotonic per run, starting at 1
    pub number: u64,
    pub title: String,
    pub author_id: String,
    pub repo: String,
    pub head_branch: String,
    pub base_branch: String,

    /// Member commits in time order
    pub commit_hashes: Vec<String>,

    pub additions: u32,
    pub deletions: u32,
    pub tab_lines: u32,
    pub composer_lines: u32,

    /// Lines added by commits made before the PR was opened
    pub initial_additions: u32,

    /// Distinct files touched before the PR was opened
    pub initial_files: u32,

    /// Distinct files touched by all member commits
    pub changed_files: u32,

    pub ai_ratio: f64,
    pub state: PrState,

    pub created_at: DateTime<Utc>,
    pub first_review_at: Option<DateTime<Utc>>,
    pub last_review_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,

    pub review_iterations: u32,
    pub reviewers: Vec<String>,

    #[serde(flatten)]
    pub quality: QualityFlags,
}

impl PullRequest {
    pub fn is_merged(&self) -> bool {
        self.state == PrState::Merged
    }

    /// Additions plus deletions.
    pub fn lines_changed(&self) -> u32 {
        self.additions + self.deletions
    }

    /// Merge or close time, whichever applies.
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        self.merged_at.or(self.closed_at)
    }
}

// =============================================================================
// REVIEWS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Commented,
    ChangesRequested,
    Approved,
}

/// File/line a review comment is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAnchor {
    pub path: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: Uuid,
    pub pr_number: u64,
    /// Never the PR author
    pub author_id: String,
    pub body: String,
    pub anchor: Option<CommentAnchor>,
    pub state: ReviewState,
    /// 1-based review round
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
}
