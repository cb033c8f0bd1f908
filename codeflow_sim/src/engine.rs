//! Generation engine.
//!
//! Owns the loaded seed and drives one run through its phases:
//!
//! ```text
//! load ──► commits (per developer, parallel) ──► PRs + reviews (per cluster, parallel)
//!                                                   │
//!                          dataset / analytics ◄── survival ◄── quality
//! ```
//!
//! Parallel phases only ever combine results keyed by roster position or by
//! cluster order, so thread count and scheduling never change the output.

use crate::analytics::{band_summaries, BandSummary};
use crate::commits::CommitGenerator;
use crate::export::{write_rows, ExportFormat};
use crate::prs::{cluster_commits, GeneratedPr, PrGenerator};
use crate::quality::{pr_files, QualityModel};
use crate::research::ResearchGenerator;
use crate::rng::SeedHierarchy;
use crate::survival::{CohortSurvival, SurvivalTracker};
use crate::velocity::Velocity;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use codeflow_core::{SeedDocument, Store};
use codeflow_env::{CancelToken, EventSink, Phase, RunContext, SimError, SimResult, TimeWindow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Engine limits and tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on developers × days for one run
    pub max_developer_days: u64,

    /// Worker threads for parallel phases (0 = rayon default)
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_developer_days: 2_000_000,
            worker_threads: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> SimResult<Self> {
        toml::from_str(text).map_err(SimError::serialization)
    }

    pub fn from_path(path: impl AsRef<Path>) -> SimResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

/// Totals for one generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationStats {
    pub developers: usize,
    pub days: u32,
    pub commits: usize,
    pub pull_requests: usize,
    pub merged_prs: usize,
    pub review_comments: usize,
    pub reverted_prs: usize,
    pub hotfix_prs: usize,
    /// Mean over commits whose 30-day horizon ends inside the window
    pub mean_survival_30d: Option<f64>,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
struct Loaded {
    seed: Arc<SeedDocument>,
    keys: SeedHierarchy,
}

/// Deterministic corpus generator over an explicit store.
#[derive(Debug)]
pub struct Engine {
    store: Arc<Store>,
    config: EngineConfig,
    loaded: Option<Loaded>,
    survival: Option<Arc<SurvivalTracker>>,
    /// Receives seed-loading and dataset events outside a generation run
    events: RunContext,
}

impl Engine {
    pub fn new(store: Arc<Store>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            loaded: None,
            survival: None,
            events: RunContext::detached(),
        }
    }

    /// Sends load and dataset phase events to `sink`.
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = RunContext::new(CancelToken::new(), sink);
        self
    }

    /// Validates and installs a seed. Data generated from a previous seed is
    /// cleared.
    pub fn load(&mut self, seed: SeedDocument) -> SimResult<()> {
        self.events.phase_start(Phase::LoadSeed, format!("seed v{}", seed.version));
        if let Err(e) = seed.validate() {
            self.events.error(e.to_string(), "load");
            return Err(e);
        }
        let keys = SeedHierarchy::from_document(&seed)?;
        debug!(
            developers = seed.developers.len(),
            repositories = seed.repositories.len(),
            base_seed = keys.base_seed(),
            "seed loaded"
        );
        self.reset();
        self.events.phase_complete(
            Phase::LoadSeed,
            format!(
                "{} developers, {} repositories",
                seed.developers.len(),
                seed.repositories.len()
            ),
        );
        self.loaded = Some(Loaded {
            seed: Arc::new(seed),
            keys,
        });
        Ok(())
    }

    /// The loaded seed, if any.
    pub fn seed(&self) -> Option<&SeedDocument> {
        self.loaded.as_ref().map(|l| l.seed.as_ref())
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clears generated data, keeping the loaded seed.
    pub fn reset(&mut self) {
        self.store.clear();
        self.survival = None;
        debug!("generated data cleared");
    }

    fn loaded(&self) -> SimResult<&Loaded> {
        self.loaded.as_ref().ok_or(SimError::NotLoaded)
    }

    /// Generates commits, PRs, reviews and quality outcomes for `window`.
    ///
    /// The store must be empty; call [`Engine::reset`] between runs.
    pub fn generate(
        &mut self,
        window: TimeWindow,
        velocity: Velocity,
        ctx: &RunContext,
    ) -> SimResult<GenerationStats> {
        let loaded = self.loaded()?;
        let seed = Arc::clone(&loaded.seed);
        let keys = loaded.keys;

        let days = window.day_count();
        let requested = u64::from(days) * seed.developers.len() as u64;
        if requested > self.config.max_developer_days {
            return Err(SimError::ResourceExhausted {
                requested,
                ceiling: self.config.max_developer_days,
            });
        }
        if self.store.counts().commits > 0 {
            return Err(SimError::invariant(
                "generate",
                "store",
                "store already holds a corpus; reset before generating again",
            ));
        }

        let started = Instant::now();
        let result = if self.config.worker_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.worker_threads)
                .build()
                .map_err(|e| SimError::invariant("generate", "worker_pool", e.to_string()))?;
            pool.install(|| self.run(&seed, keys, window, velocity, ctx))
        } else {
            self.run(&seed, keys, window, velocity, ctx)
        };

        let (mut stats, tracker) = match result {
            Ok(done) => done,
            Err(e) => {
                // A failed run leaves nothing behind
                self.store.clear();
                ctx.error(e.to_string(), "generate");
                return Err(e);
            }
        };
        stats.days = days;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        self.survival = Some(Arc::new(tracker));

        info!(
            commits = stats.commits,
            prs = stats.pull_requests,
            reviews = stats.review_comments,
            reverted = stats.reverted_prs,
            elapsed_ms = stats.elapsed_ms,
            "generation complete"
        );
        Ok(stats)
    }

    fn run(
        &self,
        seed: &SeedDocument,
        keys: SeedHierarchy,
        window: TimeWindow,
        velocity: Velocity,
        ctx: &RunContext,
    ) -> SimResult<(GenerationStats, SurvivalTracker)> {
        let mut stats = GenerationStats {
            developers: seed.developers.len(),
            ..GenerationStats::default()
        };

        // Phase 1: commits
        ctx.phase_start(Phase::Commits, format!("{} developers", seed.developers.len()));
        let commit_gen = CommitGenerator::new(seed, keys, velocity);
        let total = seed.developers.len() as u64;
        let done = AtomicU64::new(0);
        stats.commits = (0..seed.developers.len())
            .into_par_iter()
            .map(|i| -> SimResult<usize> {
                ctx.check("commit_generation")?;
                let batch = commit_gen.generate_for(i, window)?;
                let n = self.store.insert_commits(batch)?;
                ctx.progress(Phase::Commits, done.fetch_add(1, Ordering::Relaxed) + 1, total);
                Ok(n)
            })
            .collect::<SimResult<Vec<usize>>>()?
            .into_iter()
            .sum();
        ctx.phase_complete(Phase::Commits, format!("{} commits", stats.commits));

        // Phase 2: pull requests and reviews
        ctx.phase_start(Phase::PullRequests, "clustering commits");
        if seed.developers.len() == 1 {
            ctx.warning(
                "single-developer roster: pull requests will have no reviewers",
                seed.developers[0].user_id.clone(),
            );
        }
        let commits = self.store.commits_between(window);
        let clusters = cluster_commits(seed, &commits, seed.pr_lifecycle.cluster_gap_hours);
        let pr_gen = PrGenerator::new(seed, keys, window.to);
        let built = clusters
            .par_iter()
            .enumerate()
            .map(|(i, cluster)| -> SimResult<GeneratedPr> {
                ctx.check("review_generation")?;
                pr_gen.build(i as u64 + 1, cluster)
            })
            .collect::<SimResult<Vec<GeneratedPr>>>()?;

        let mut prs = Vec::with_capacity(built.len());
        let mut comments = Vec::new();
        for generated in built {
            comments.extend(generated.comments);
            prs.push(generated.pull_request);
        }
        self.store.insert_prs(prs.clone())?;
        for pr in &prs {
            self.store.link_commits_to_pr(pr.number, &pr.commit_hashes)?;
        }
        stats.pull_requests = prs.len();
        stats.merged_prs = prs.iter().filter(|p| p.is_merged()).count();
        stats.review_comments = self.store.insert_review_comments(comments);
        ctx.phase_complete(
            Phase::PullRequests,
            format!("{} PRs, {} review comments", stats.pull_requests, stats.review_comments),
        );

        // Phase 3: quality outcomes
        ctx.phase_start(Phase::Quality, "assigning outcomes");
        ctx.check("quality")?;
        let files = pr_files(&prs, &commits);
        let flags = QualityModel::new(seed, keys).assign(&prs, &files);
        for (number, f) in flags {
            stats.reverted_prs += usize::from(f.was_reverted);
            stats.hotfix_prs += usize::from(f.required_hotfix);
            self.store.set_quality(number, f)?;
        }
        ctx.phase_complete(Phase::Quality, format!("{} reverted", stats.reverted_prs));

        // Phase 4: survival index
        ctx.phase_start(Phase::Survival, "indexing file touches");
        ctx.check("survival")?;
        let tracker = SurvivalTracker::build(&commits, window.to);
        let (sum, observed) = commits
            .par_iter()
            .filter_map(|c| tracker.survival_rate(c, ChronoDuration::days(30)))
            .map(|rate| (rate, 1usize))
            .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1));
        stats.mean_survival_30d = (observed > 0).then(|| sum / observed as f64);
        ctx.phase_complete(Phase::Survival, format!("{} files indexed", tracker.file_count()));

        Ok((stats, tracker))
    }

    /// The tracker from the last run, or one built over whatever the store
    /// holds, observed up to its latest commit.
    fn tracker(&self) -> Arc<SurvivalTracker> {
        match &self.survival {
            Some(t) => Arc::clone(t),
            None => {
                let commits = self.store.commits_between(TimeWindow::unbounded());
                let until = commits
                    .iter()
                    .map(|c| c.timestamp)
                    .max()
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                Arc::new(SurvivalTracker::build(&commits, until))
            }
        }
    }

    /// Streams the research dataset for `window` into `out` and returns the
    /// number of rows written.
    pub fn dataset<W: Write>(
        &self,
        window: TimeWindow,
        format: ExportFormat,
        out: &mut W,
    ) -> SimResult<usize> {
        let loaded = self.loaded()?;
        self.events.phase_start(Phase::Research, format!("joining rows for {window}"));
        let tracker = self.tracker();
        let snapshot = self.store.snapshot(window);
        let research = ResearchGenerator::new(&loaded.seed, &tracker, &snapshot);
        self.events.phase_complete(Phase::Research, format!("{} rows", research.len()));

        self.events.phase_start(Phase::Export, format!("writing {format}"));
        debug!(rows = research.len(), format = %format, "exporting dataset");
        match write_rows(format, research.rows(), out) {
            Ok(n) => {
                self.events.phase_complete(Phase::Export, format!("{n} rows written"));
                Ok(n)
            }
            Err(e) => {
                self.events.error(e.to_string(), "export");
                Err(e)
            }
        }
    }

    /// Per-band aggregates over the research rows of `window`.
    pub fn band_summaries(&self, window: TimeWindow) -> SimResult<Vec<BandSummary>> {
        let loaded = self.loaded()?;
        let tracker = self.tracker();
        let snapshot = self.store.snapshot(window);
        let research = ResearchGenerator::new(&loaded.seed, &tracker, &snapshot);
        Ok(band_summaries(
            research.rows(),
            &loaded.seed.correlations.ai_ratio_bands,
        ))
    }

    /// Survival per developer for commits made in `window`.
    pub fn cohort_survival(
        &self,
        window: TimeWindow,
        horizon_days: i64,
    ) -> SimResult<Vec<CohortSurvival>> {
        self.loaded()?;
        let tracker = self.tracker();
        let commits = self.store.commits_between(window);
        Ok(tracker.cohort(&commits, ChronoDuration::days(horizon_days)))
    }
}
