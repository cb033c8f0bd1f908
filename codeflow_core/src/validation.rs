//! Seed Validation
//! ================
//!
//! Checks a parsed [`SeedDocument`] before any generation starts. The first
//! violation found is reported as a [`SimError::Config`] naming the entity
//! (`developers[3] (user_004)`, `repositories[0] (acme/api)`, ...) and field,
//! so a person iterating on a seed can go straight to the offending line.
//!
//! Order of checks: roster, each developer, repositories, ownership,
//! correlation tables, lifecycle parameters.

use crate::seed::{AiRatioBand, Developer, Repository, SeedDocument};
use codeflow_env::{SimError, SimResult};
use std::collections::HashSet;

impl SeedDocument {
    /// Validates the whole document, returning the first violation.
    pub fn validate(&self) -> SimResult<()> {
        if self.developers.is_empty() {
            return Err(SimError::config(
                "seed",
                "developers",
                "must contain at least one developer",
            ));
        }

        let mut ids = HashSet::new();
        let mut emails = HashSet::new();
        for (i, dev) in self.developers.iter().enumerate() {
            let entity = developer_entity(i, dev);
            validate_developer(&entity, dev)?;
            if !ids.insert(dev.user_id.as_str()) {
                return Err(SimError::config(entity, "user_id", "duplicate user_id"));
            }
            if !emails.insert(dev.email.as_str()) {
                return Err(SimError::config(entity, "email", "duplicate email"));
            }
        }

        if self.repositories.is_empty() {
            return Err(SimError::config(
                "seed",
                "repositories",
                "must contain at least one repository",
            ));
        }

        let mut names = HashSet::new();
        for (i, repo) in self.repositories.iter().enumerate() {
            let entity = format!("repositories[{}] ({})", i, repo.repo_name);
            validate_repository(&entity, repo)?;
            if !names.insert(repo.repo_name.as_str()) {
                return Err(SimError::config(entity, "repo_name", "duplicate repo_name"));
            }
        }

        for (i, dev) in self.developers.iter().enumerate() {
            if !self.repositories.iter().any(|r| r.is_owned_by(&dev.team)) {
                return Err(SimError::config(
                    developer_entity(i, dev),
                    "team",
                    format!("no repository is owned by team '{}'", dev.team),
                ));
            }
        }

        self.validate_correlations()?;
        self.validate_lifecycle()?;

        tracing::debug!(
            developers = self.developers.len(),
            repositories = self.repositories.len(),
            "seed validated"
        );
        Ok(())
    }

    fn validate_correlations(&self) -> SimResult<()> {
        let bands = &self.correlations.ai_ratio_bands;
        if !(bands.low_max > 0.0 && bands.low_max <= bands.medium_max && bands.medium_max <= 1.0) {
            return Err(SimError::config(
                "correlations",
                "ai_ratio_bands",
                format!(
                    "thresholds must satisfy 0 < low_max <= medium_max <= 1 (got {} / {})",
                    bands.low_max, bands.medium_max
                ),
            ));
        }

        for band in AiRatioBand::ALL {
            let field = format!("revert_probability.{}", band);
            match self.correlations.revert_probability.get(&band) {
                None => {
                    return Err(SimError::config("correlations", field, "missing band"));
                }
                Some(p) => check_unit("correlations", &field, *p)?,
            }
        }
        Ok(())
    }

    fn validate_lifecycle(&self) -> SimResult<()> {
        let lc = &self.pr_lifecycle;
        let positive = [
            ("cluster_gap_hours", lc.cluster_gap_hours),
            ("pickup_time_hours", lc.pickup_time_hours),
            ("review_lead_time_hours", lc.review_lead_time_hours),
            ("merge_delay_hours", lc.merge_delay_hours),
            ("hotfix_window_hours", lc.hotfix_window_hours),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::config("pr_lifecycle", field, "must be a positive number"));
            }
        }
        if !(lc.iterations_lambda.is_finite() && lc.iterations_lambda >= 0.0) {
            return Err(SimError::config("pr_lifecycle", "iterations_lambda", "must be >= 0"));
        }
        if !(lc.comments_per_100_loc.is_finite() && lc.comments_per_100_loc >= 0.0) {
            return Err(SimError::config("pr_lifecycle", "comments_per_100_loc", "must be >= 0"));
        }
        if lc.max_iterations == 0 {
            return Err(SimError::config("pr_lifecycle", "max_iterations", "must be >= 1"));
        }
        check_unit("pr_lifecycle", "merge_probability", lc.merge_probability)
    }
}

fn developer_entity(index: usize, dev: &Developer) -> String {
    format!("developers[{}] ({})", index, dev.user_id)
}

fn check_unit(entity: &str, field: &str, value: f64) -> SimResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimError::config(
            entity,
            field,
            format!("must be within [0, 1] (got {})", value),
        ))
    }
}

fn validate_developer(entity: &str, dev: &Developer) -> SimResult<()> {
    if dev.user_id.trim().is_empty() {
        return Err(SimError::config(entity, "user_id", "must not be empty"));
    }
    match dev.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => {
            return Err(SimError::config(
                entity,
                "email",
                format!("'{}' is not a valid address", dev.email),
            ))
        }
    }
    if dev.team.trim().is_empty() {
        return Err(SimError::config(entity, "team", "must not be empty"));
    }
    check_unit(entity, "acceptance_rate", dev.acceptance_rate)?;

    let pb = &dev.pr_behavior;
    if !(pb.prs_per_week.is_finite() && pb.prs_per_week >= 0.0) {
        return Err(SimError::config(entity, "pr_behavior.prs_per_week", "must be >= 0"));
    }
    if pb.avg_pr_size_loc == 0 {
        return Err(SimError::config(entity, "pr_behavior.avg_pr_size_loc", "must be >= 1"));
    }
    if pb.avg_files_per_pr == 0 {
        return Err(SimError::config(entity, "pr_behavior.avg_files_per_pr", "must be >= 1"));
    }
    check_unit(entity, "pr_behavior.review_thoroughness", pb.review_thoroughness)?;

    let wh = dev.working_hours;
    if wh.start >= wh.end || wh.end > 24 {
        return Err(SimError::config(
            entity,
            "working_hours",
            format!("expected 0 <= start < end <= 24 (got {}..{})", wh.start, wh.end),
        ));
    }
    Ok(())
}

fn validate_repository(entity: &str, repo: &Repository) -> SimResult<()> {
    if repo.repo_name.trim().is_empty() {
        return Err(SimError::config(entity, "repo_name", "must not be empty"));
    }
    if repo.default_branch.trim().is_empty() {
        return Err(SimError::config(entity, "default_branch", "must not be empty"));
    }
    if repo.teams.is_empty() {
        return Err(SimError::config(entity, "teams", "must name at least one owning team"));
    }
    if repo.file_count == 0 {
        return Err(SimError::config(entity, "file_count", "must be >= 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::seed::tests::sample_seed;
    use crate::seed::AiRatioBand;
    use codeflow_env::SimError;

    fn field_of(err: SimError) -> (String, String) {
        match err {
            SimError::Config { entity, field, .. } => (entity, field),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_sample_seed_is_valid() {
        sample_seed().validate().unwrap();
    }

    #[test]
    fn test_empty_roster_rejected() {
        let mut seed = sample_seed();
        seed.developers.clear();
        let (entity, field) = field_of(seed.validate().unwrap_err());
        assert_eq!(entity, "seed");
        assert_eq!(field, "developers");
    }

    #[test]
    fn test_acceptance_rate_out_of_range() {
        let mut seed = sample_seed();
        seed.developers[1].acceptance_rate = 1.4;
        let (entity, field) = field_of(seed.validate().unwrap_err());
        assert_eq!(entity, "developers[1] (user_002)");
        assert_eq!(field, "acceptance_rate");
    }

    #[test]
    fn test_developer_without_repository_rejected() {
        let mut seed = sample_seed();
        seed.developers[0].team = "Mobile".into();
        let (entity, field) = field_of(seed.validate().unwrap_err());
        assert!(entity.contains("user_001"));
        assert_eq!(field, "team");
    }

    #[test]
    fn test_missing_band_rejected() {
        let mut seed = sample_seed();
        seed.correlations.revert_probability.remove(&AiRatioBand::High);
        let (entity, field) = field_of(seed.validate().unwrap_err());
        assert_eq!(entity, "correlations");
        assert_eq!(field, "revert_probability.high");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut seed = sample_seed();
        seed.developers[1].user_id = "user_001".into();
        let (_, field) = field_of(seed.validate().unwrap_err());
        assert_eq!(field, "user_id");
    }

    #[test]
    fn test_first_violation_wins() {
        let mut seed = sample_seed();
        seed.developers[0].email = "nobody".into();
        seed.correlations.revert_probability.clear();
        let (_, field) = field_of(seed.validate().unwrap_err());
        assert_eq!(field, "email");
    }

    #[test]
    fn test_bad_working_hours_rejected() {
        let mut seed = sample_seed();
        seed.developers[0].working_hours.start = 18;
        let (_, field) = field_of(seed.validate().unwrap_err());
        assert_eq!(field, "working_hours");
    }

    #[test]
    fn test_zero_max_iterations_rejected() {
        let mut seed = sample_seed();
        seed.pr_lifecycle.max_iterations = 0;
        let (entity, field) = field_of(seed.validate().unwrap_err());
        assert_eq!(entity, "pr_lifecycle");
        assert_eq!(field, "max_iterations");
    }
}
