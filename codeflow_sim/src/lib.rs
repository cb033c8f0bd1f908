//! Codeflow Corpus Generator
//!
//! Turns a seed document (developers, repositories, templates, correlation
//! tables) into a reproducible software-development history and a flat
//! research dataset relating AI-assisted coding to delivery and quality.
//!
//! # Core Principle: One Seed, One Corpus
//!
//! All randomness flows from a single 64-bit base seed derived from the seed
//! document:
//! - **Developers** draw from streams keyed by roster position
//! - **Stages** (timing, size, split, placement, review, quality) get
//!   independent sub-streams of each developer stream
//! - **PRs** draw from streams salted by their first commit hash
//!
//! Parallel phases therefore produce identical output at any thread count.
//!
//! # Pipeline
//!
//! ```text
//! SeedDocument ─► CommitGenerator ─► PrGenerator ─► QualityModel
//!                                                      │
//!        export ◄── ResearchGenerator ◄── SurvivalTracker
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use codeflow_sim::{Engine, EngineConfig, ExportFormat, Velocity};
//!
//! let mut engine = Engine::new(Store::shared(), EngineConfig::default());
//! engine.load(SeedDocument::from_path("seed.json")?)?;
//! engine.generate(window, Velocity::Medium, &RunContext::detached())?;
//! engine.dataset(window, ExportFormat::Csv, &mut std::io::stdout())?;
//! ```

pub mod analytics;
pub mod commits;
pub mod engine;
pub mod export;
pub mod prs;
pub mod quality;
pub mod research;
pub mod rng;
pub mod survival;
pub mod velocity;

#[cfg(test)]
mod testutil;

pub use analytics::{band_summaries, BandSummary};
pub use commits::CommitGenerator;
pub use engine::{Engine, EngineConfig, GenerationStats};
pub use export::{write_rows, ExportFormat, CSV_COLUMNS};
pub use prs::{cluster_commits, Cluster, GeneratedPr, PrGenerator};
pub use quality::{is_bug_fix, pr_files, PrFiles, QualityModel};
pub use research::{pr_metrics, PrMetrics, ResearchDataPoint, ResearchGenerator};
pub use rng::{SeedHierarchy, Stage};
pub use survival::{CohortSurvival, FileKey, SurvivalProfile, SurvivalTracker};
pub use velocity::Velocity;
