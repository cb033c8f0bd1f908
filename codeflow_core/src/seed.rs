//! Seed Model - the declarative input to generation.
//! ==================================================
//!
//! A seed document describes the developer roster, the repositories they own,
//! text templates, and the correlation tables that tie AI usage to quality
//! outcomes. Everything here is immutable once loaded; the generator only
//! ever reads it.
//!
//! All maps are `BTreeMap` so the canonical JSON encoding (and therefore the
//! derived base seed) does not depend on hash iteration order.

use codeflow_env::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// ENUMS
// =============================================================================

/// Developer seniority band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seniority {
    Junior,
    Mid,
    Senior,
}

impl Seniority {
    pub fn name(&self) -> &'static str {
        match self {
            Seniority::Junior => "junior",
            Seniority::Mid => "mid",
            Seniority::Senior => "senior",
        }
    }
}

impl std::fmt::Display for Seniority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Discretized AI-ratio bucket used for correlation-table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiRatioBand {
    Low,
    Medium,
    High,
}

impl AiRatioBand {
    /// All bands in ascending order.
    pub const ALL: [AiRatioBand; 3] = [AiRatioBand::Low, AiRatioBand::Medium, AiRatioBand::High];

    pub fn name(&self) -> &'static str {
        match self {
            AiRatioBand::Low => "low",
            AiRatioBand::Medium => "medium",
            AiRatioBand::High => "high",
        }
    }
}

impl std::fmt::Display for AiRatioBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Repository maturity tier, derived from repository age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaturityTier {
    Greenfield,
    Developing,
    Mature,
}

impl MaturityTier {
    pub fn name(&self) -> &'static str {
        match self {
            MaturityTier::Greenfield => "greenfield",
            MaturityTier::Developing => "developing",
            MaturityTier::Mature => "mature",
        }
    }
}

// =============================================================================
// DEVELOPERS
// =============================================================================

/// Pull-request habits of a developer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrBehavior {
    /// Pull requests opened per week at medium velocity
    pub prs_per_week: f64,

    /// Mean lines of code per pull request
    pub avg_pr_size_loc: u32,

    /// Mean files touched per pull request
    pub avg_files_per_pr: u32,

    /// How many comments this developer leaves as a reviewer, in [0, 1]
    pub review_thoroughness: f64,

    /// Most review rounds this developer sits through on their own PRs
    pub iteration_tolerance: u32,
}

impl Default for PrBehavior {
    fn default() -> Self {
        Self {
            prs_per_week: 2.0,
            avg_pr_size_loc: 200,
            avg_files_per_pr: 5,
            review_thoroughness: 0.7,
            iteration_tolerance: 2,
        }
    }
}

/// Working-hours band in UTC hours, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingHours {
    pub start: u32,
    pub end: u32,
}

impl WorkingHours {
    /// Length of the band in hours.
    pub fn hours(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self { start: 9, end: 17 }
    }
}

/// A member of the simulated engineering organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Developer {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub team: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub seniority: Seniority,

    /// Baseline share of AI suggestions this developer accepts, in [0, 1]
    pub acceptance_rate: f64,

    #[serde(default)]
    pub pr_behavior: PrBehavior,

    #[serde(default)]
    pub working_hours: WorkingHours,
}

fn default_region() -> String {
    "US".to_string()
}

// =============================================================================
// REPOSITORIES
// =============================================================================

/// Age and size facts about a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Maturity {
    pub age_days: u32,
}

impl Default for Maturity {
    fn default() -> Self {
        Self { age_days: 365 }
    }
}

impl Maturity {
    pub fn tier(&self) -> MaturityTier {
        match self.age_days {
            0..=89 => MaturityTier::Greenfield,
            90..=179 => MaturityTier::Developing,
            _ => MaturityTier::Mature,
        }
    }
}

/// A repository owned by one or more teams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub repo_name: String,
    pub primary_language: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Teams whose developers commit here
    pub teams: Vec<String>,

    #[serde(default)]
    pub maturity: Maturity,

    /// Size of the synthetic file pool commits draw from
    #[serde(default = "default_file_count")]
    pub file_count: u32,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_file_count() -> u32 {
    40
}

impl Repository {
    /// Returns true if `team` owns this repository.
    pub fn is_owned_by(&self, team: &str) -> bool {
        self.teams.iter().any(|t| t == team)
    }

    /// Source-file extension for the primary language.
    pub fn file_extension(&self) -> &'static str {
        match self.primary_language.to_lowercase().as_str() {
            "go" => "go",
            "rust" => "rs",
            "python" => "py",
            "typescript" => "ts",
            "javascript" => "js",
            "java" => "java",
            "kotlin" => "kt",
            "ruby" => "rb",
            "c#" | "csharp" => "cs",
            _ => "txt",
        }
    }

    /// Short name without the owner prefix (`acme/api` → `api`).
    pub fn short_name(&self) -> &str {
        self.repo_name.rsplit('/').next().unwrap_or(&self.repo_name)
    }
}

// =============================================================================
// TEMPLATES
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitMessageTemplates {
    pub feature: Vec<String>,
    pub bugfix: Vec<String>,
    pub refactor: Vec<String>,
    pub chore: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewCommentTemplates {
    pub style: Vec<String>,
    pub logic: Vec<String>,
    pub suggestion: Vec<String>,
    pub approval: Vec<String>,
}

/// Text used for commit messages and review comments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextTemplates {
    pub commit_messages: CommitMessageTemplates,
    pub review_comments: ReviewCommentTemplates,
}

// =============================================================================
// CORRELATIONS
// =============================================================================

/// Band thresholds: `[0, low_max)` low, `[low_max, medium_max)` medium,
/// everything above high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiRatioThresholds {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for AiRatioThresholds {
    fn default() -> Self {
        Self {
            low_max: 0.3,
            medium_max: 0.6,
        }
    }
}

impl AiRatioThresholds {
    /// Maps an AI ratio onto its band.
    pub fn band(&self, ai_ratio: f64) -> AiRatioBand {
        if ai_ratio < self.low_max {
            AiRatioBand::Low
        } else if ai_ratio < self.medium_max {
            AiRatioBand::Medium
        } else {
            AiRatioBand::High
        }
    }
}

/// Correlation tables relating AI usage to outcomes.
///
/// These are data, not code: researchers change the AI-usage/defect
/// relationship by editing the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlations {
    #[serde(default)]
    pub ai_ratio_bands: AiRatioThresholds,

    /// Probability that a merged PR in each band is reverted
    pub revert_probability: BTreeMap<AiRatioBand, f64>,
}

/// Review-lifecycle parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrLifecycle {
    /// Maximum gap between commits of one PR cluster
    pub cluster_gap_hours: f64,

    /// Mean delay from PR creation to first review
    pub pickup_time_hours: f64,

    /// Mean time from first to last review iteration
    pub review_lead_time_hours: f64,

    /// Mean delay from approval to merge
    pub merge_delay_hours: f64,

    /// Poisson mean for review iterations
    pub iterations_lambda: f64,

    /// Upper bound on review iterations
    pub max_iterations: u32,

    /// Comment density for a fully thorough reviewer
    pub comments_per_100_loc: f64,

    /// Probability that a finished review ends in a merge
    pub merge_probability: f64,

    /// Window after a merge in which a bug-fix PR counts as its hotfix
    pub hotfix_window_hours: f64,
}

impl Default for PrLifecycle {
    fn default() -> Self {
        Self {
            cluster_gap_hours: 72.0,
            pickup_time_hours: 6.0,
            review_lead_time_hours: 8.0,
            merge_delay_hours: 2.0,
            iterations_lambda: 1.5,
            max_iterations: 4,
            comments_per_100_loc: 2.5,
            merge_probability: 0.88,
            hotfix_window_hours: 48.0,
        }
    }
}

// =============================================================================
// SEED DOCUMENT
// =============================================================================

/// The full seed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedDocument {
    #[serde(default = "default_version")]
    pub version: String,

    pub developers: Vec<Developer>,

    pub repositories: Vec<Repository>,

    #[serde(default)]
    pub text_templates: TextTemplates,

    pub correlations: Correlations,

    #[serde(default)]
    pub pr_lifecycle: PrLifecycle,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl SeedDocument {
    /// Parses a JSON seed document (no validation).
    pub fn from_json_str(text: &str) -> SimResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| SimError::config("seed", "json", e.to_string()))
    }

    /// Parses a TOML seed document (no validation).
    pub fn from_toml_str(text: &str) -> SimResult<Self> {
        toml::from_str(text).map_err(|e| SimError::config("seed", "toml", e.to_string()))
    }

    /// Reads a seed file, choosing the format from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            other => Err(SimError::config(
                "seed",
                "path",
                format!(
                    "unsupported seed format {:?} for {} (use .json or .toml)",
                    other.unwrap_or(""),
                    path.display()
                ),
            )),
        }
    }

    /// Canonical byte encoding used to derive the base seed.
    pub fn canonical_bytes(&self) -> SimResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(SimError::serialization)
    }

    /// Looks up a developer by id.
    pub fn developer(&self, user_id: &str) -> Option<&Developer> {
        self.developers.iter().find(|d| d.user_id == user_id)
    }

    /// Looks up a repository by name.
    pub fn repository(&self, repo_name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.repo_name == repo_name)
    }

    /// Repositories owned by the developer's team, in seed order.
    pub fn repositories_for(&self, developer: &Developer) -> Vec<&Repository> {
        self.repositories
            .iter()
            .filter(|r| r.is_owned_by(&developer.team))
            .collect()
    }

    /// Returns a copy of this document with the roster resized to `target`.
    ///
    /// Shrinking keeps the first `target` developers. Growing cycles through
    /// the roster and suffixes ids, emails and names so every clone is unique.
    pub fn replicate_developers(&self, target: usize) -> SimResult<Self> {
        if target == 0 {
            return Err(SimError::config("seed", "developers", "target roster size must be >= 1"));
        }
        if self.developers.is_empty() {
            return Err(SimError::config("seed", "developers", "cannot replicate an empty roster"));
        }

        let base = self.developers.len();
        let developers = (0..target)
            .map(|i| {
                let mut dev = self.developers[i % base].clone();
                let clone = i / base;
                if clone > 0 {
                    dev.user_id = format!("{}_clone{}", dev.user_id, clone);
                    dev.email = format!("clone{}_{}", clone, dev.email);
                    dev.name = format!("{} (Clone {})", dev.name, clone);
                }
                dev
            })
            .collect();

        Ok(Self {
            developers,
            ..self.clone()
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_seed() -> SeedDocument {
        SeedDocument::from_json_str(SAMPLE_SEED).unwrap()
    }

    pub(crate) const SAMPLE_SEED: &str = r#"{
        "version": "1.0",
        "developers": [
            {
                "user_id": "user_001",
                "email": "ada@example.com",
                "name": "Ada",
                "team": "Backend",
                "seniority": "senior",
                "acceptance_rate": 0.85,
                "pr_behavior": { "prs_per_week": 4.0, "avg_pr_size_loc": 240 }
            },
            {
                "user_id": "user_002",
                "email": "lin@example.com",
                "name": "Lin",
                "team": "Backend",
                "region": "EU",
                "seniority": "junior",
                "acceptance_rate": 0.35,
                "working_hours": { "start": 8, "end": 16 }
            }
        ],
        "repositories": [
            {
                "repo_name": "acme/payments",
                "primary_language": "Go",
                "teams": ["Backend"],
                "maturity": { "age_days": 400 }
            }
        ],
        "text_templates": {
            "commit_messages": {
                "feature": ["Add {{ feature_name }} to {{ component }}"],
                "bugfix": ["Fix {{ issue }} in {{ component }}"]
            }
        },
        "correlations": {
            "ai_ratio_bands": { "low_max": 0.3, "medium_max": 0.6 },
            "revert_probability": { "low": 0.02, "medium": 0.04, "high": 0.08 }
        }
    }"#;

    #[test]
    fn test_parse_applies_defaults() {
        let seed = sample_seed();
        assert_eq!(seed.developers.len(), 2);
        assert_eq!(seed.developers[0].region, "US");
        assert_eq!(seed.developers[0].pr_behavior.avg_files_per_pr, 5);
        assert_eq!(seed.developers[1].working_hours.hours(), 8);
        assert_eq!(seed.repositories[0].default_branch, "main");
        assert_eq!(seed.repositories[0].file_count, 40);
        assert_eq!(seed.pr_lifecycle.max_iterations, 4);
    }

    #[test]
    fn test_band_thresholds() {
        let t = AiRatioThresholds::default();
        assert_eq!(t.band(0.0), AiRatioBand::Low);
        assert_eq!(t.band(0.3), AiRatioBand::Medium);
        assert_eq!(t.band(0.59), AiRatioBand::Medium);
        assert_eq!(t.band(0.6), AiRatioBand::High);
        assert_eq!(t.band(1.0), AiRatioBand::High);
    }

    #[test]
    fn test_maturity_tiers() {
        assert_eq!(Maturity { age_days: 30 }.tier(), MaturityTier::Greenfield);
        assert_eq!(Maturity { age_days: 120 }.tier(), MaturityTier::Developing);
        assert_eq!(Maturity { age_days: 400 }.tier(), MaturityTier::Mature);
    }

    #[test]
    fn test_canonical_bytes_are_stable() {
        let a = sample_seed().canonical_bytes().unwrap();
        let b = sample_seed().canonical_bytes().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_repositories_for_uses_team_ownership() {
        let seed = sample_seed();
        let repos = seed.repositories_for(&seed.developers[0]);
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].short_name(), "payments");
        assert_eq!(repos[0].file_extension(), "go");
    }

    #[test]
    fn test_replicate_grows_with_unique_ids() {
        let seed = sample_seed().replicate_developers(5).unwrap();
        let ids: Vec<_> = seed.developers.iter().map(|d| d.user_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["user_001", "user_002", "user_001_clone1", "user_002_clone1", "user_001_clone2"]
        );
        assert_eq!(seed.developers[2].email, "clone1_ada@example.com");
    }

    #[test]
    fn test_replicate_shrinks_and_rejects_zero() {
        let seed = sample_seed();
        assert_eq!(seed.replicate_developers(1).unwrap().developers.len(), 1);
        assert!(seed.replicate_developers(0).is_err());
    }

    #[test]
    fn test_toml_seed_parses() {
        let text = r#"
            [[developers]]
            user_id = "user_001"
            email = "ada@example.com"
            name = "Ada"
            team = "Core"
            seniority = "mid"
            acceptance_rate = 0.5

            [[repositories]]
            repo_name = "acme/core"
            primary_language = "Rust"
            teams = ["Core"]

            [correlations.revert_probability]
            low = 0.01
            medium = 0.02
            high = 0.03
        "#;
        let seed = SeedDocument::from_toml_str(text).unwrap();
        assert_eq!(seed.repositories[0].file_extension(), "rs");
        assert_eq!(seed.correlations.revert_probability.len(), 3);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = SeedDocument::from_json_str("{ not json").unwrap_err();
        assert!(err.is_configuration());
    }
}
