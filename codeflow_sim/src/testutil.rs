//! Seed fixtures shared by the simulator tests.

use chrono::NaiveDate;
use codeflow_core::{
    AiRatioBand, Correlations, Developer, PrBehavior, Repository, SeedDocument, Seniority,
    WorkingHours,
};
use codeflow_env::TimeWindow;
use std::collections::BTreeMap;

pub fn window_days(days: u32) -> TimeWindow {
    TimeWindow::from_days(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(), days)
}

pub fn developer(i: usize, team: &str, seniority: Seniority, acceptance: f64) -> Developer {
    Developer {
        user_id: format!("user_{:03}", i + 1),
        email: format!("dev{}@example.com", i + 1),
        name: format!("Developer {}", i + 1),
        team: team.to_string(),
        region: if i % 2 == 0 { "US".into() } else { "EU".into() },
        seniority,
        acceptance_rate: acceptance,
        pr_behavior: PrBehavior {
            prs_per_week: 4.0,
            avg_pr_size_loc: 240,
            avg_files_per_pr: 4,
            review_thoroughness: 0.8,
            iteration_tolerance: 2,
        },
        working_hours: WorkingHours { start: 9, end: 17 },
    }
}

pub fn correlations() -> Correlations {
    Correlations {
        ai_ratio_bands: Default::default(),
        revert_probability: BTreeMap::from([
            (AiRatioBand::Low, 0.02),
            (AiRatioBand::Medium, 0.05),
            (AiRatioBand::High, 0.10),
        ]),
    }
}

pub fn repository(name: &str, teams: &[&str]) -> Repository {
    Repository {
        repo_name: name.to_string(),
        primary_language: "Go".to_string(),
        default_branch: "main".to_string(),
        teams: teams.iter().map(|t| t.to_string()).collect(),
        maturity: Default::default(),
        file_count: 40,
    }
}

/// `n` developers on one team sharing two repositories.
pub fn seed_with(n: usize, acceptance: f64) -> SeedDocument {
    let seniorities = [Seniority::Junior, Seniority::Mid, Seniority::Senior];
    SeedDocument {
        version: "1.0".into(),
        developers: (0..n)
            .map(|i| developer(i, "Platform", seniorities[i % 3], acceptance))
            .collect(),
        repositories: vec![
            repository("acme/api", &["Platform"]),
            repository("acme/web", &["Platform"]),
        ],
        text_templates: Default::default(),
        correlations: correlations(),
        pr_lifecycle: Default::default(),
    }
}

/// Two developers (acceptance 0.9 and 0.2) on one repository.
pub fn two_developer_seed() -> SeedDocument {
    SeedDocument {
        version: "1.0".into(),
        developers: vec![
            developer(0, "Platform", Seniority::Mid, 0.9),
            developer(1, "Platform", Seniority::Mid, 0.2),
        ],
        repositories: vec![repository("acme/api", &["Platform"])],
        text_templates: Default::default(),
        correlations: correlations(),
        pr_lifecycle: Default::default(),
    }
}
