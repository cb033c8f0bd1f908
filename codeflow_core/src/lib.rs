//! Codeflow Core - Seed Model, Data Model and Corpus Store
//! ========================================================
//!
//! - [`seed`]: the declarative seed document (developers, repositories,
//!   templates, correlation tables) and its validation
//! - [`model`]: commits, pull requests and review comments
//! - [`store`]: thread-safe in-memory storage with time and key indexes
//!
//! Generation itself lives in `codeflow_sim`; this crate only defines what is
//! generated and where it is kept.

pub mod model;
pub mod seed;
pub mod store;
mod validation;

pub use model::{
    CommentAnchor, Commit, CommitLines, FileChange, LineSplit, PrState, PullRequest,
    QualityFlags, ReviewComment, ReviewState,
};
pub use seed::{
    AiRatioBand, AiRatioThresholds, CommitMessageTemplates, Correlations, Developer, Maturity,
    MaturityTier, PrBehavior, PrLifecycle, Repository, ReviewCommentTemplates, SeedDocument,
    Seniority, TextTemplates, WorkingHours,
};
pub use store::{Store, StoreCounts, StoreSnapshot};
