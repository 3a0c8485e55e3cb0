//! Dependency-ordered, bounded-parallel execution of a descriptor table.
//!
//! Order and cycles are resolved up front ([`graph`]), so nothing is fetched
//! for a table that cannot be built. Projects then run on a scoped worker
//! pool fed from a ready queue: a project becomes ready once every one of its
//! dependencies finished as built or skipped. The first failure stops the
//! queue; workers finish what they are running and everything left is
//! reported as not started.

pub mod graph;
pub mod lock;
pub mod report;

pub use lock::ProjectLock;
pub use report::{Failure, ProjectOutcome, ProjectStatus, RunReport};

use crate::adapter::{adapter_for, build_dir_for, BuildContext};
use crate::config::BuildConfig;
use crate::descriptor::{DescriptorTable, ProjectDescriptor};
use crate::error::{Error, Result, Stage};
use crate::fetch::{Fetcher, HttpTransport};
use crate::fsutil::remove_path;
use crate::process::CancelToken;
use crate::unpack::Unpacker;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

/// The per-project stages, separated from scheduling so the scheduler can be
/// driven without network or compilers.
pub trait ProjectRunner: Sync {
    /// Called once with every project that will actually be built.
    fn preflight(&self, _projects: &[&ProjectDescriptor]) -> Result<()> {
        Ok(())
    }

    fn fetch(&self, d: &ProjectDescriptor, cancel: &CancelToken) -> Result<PathBuf>;

    fn prepare(&self, d: &ProjectDescriptor, archive: &Path, cancel: &CancelToken)
        -> Result<PathBuf>;

    fn build(&self, d: &ProjectDescriptor, tree: &Path, cancel: &CancelToken) -> Result<()>;
}

/// Fetcher, unpacker and build adapters wired to a [`BuildConfig`].
pub struct NativeRunner<'a> {
    config: &'a BuildConfig,
    fetcher: Fetcher,
    unpacker: Unpacker,
}

impl<'a> NativeRunner<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.fetch_timeout));
        Self {
            config,
            fetcher: Fetcher::new(&config.cache_dir, transport).with_retries(config.fetch_retries),
            unpacker: Unpacker::new(config.src_dir()).with_tool_timeout(config.tool_timeout),
        }
    }
}

impl ProjectRunner for NativeRunner<'_> {
    fn preflight(&self, projects: &[&ProjectDescriptor]) -> Result<()> {
        crate::preflight::check_projects(projects.iter().copied(), &self.config.toolchain)
    }

    fn fetch(&self, d: &ProjectDescriptor, cancel: &CancelToken) -> Result<PathBuf> {
        self.fetcher.fetch(d, cancel)
    }

    fn prepare(
        &self,
        d: &ProjectDescriptor,
        archive: &Path,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        self.unpacker.prepare(d, archive, cancel)
    }

    fn build(&self, d: &ProjectDescriptor, tree: &Path, cancel: &CancelToken) -> Result<()> {
        let ctx = BuildContext {
            descriptor: d,
            source_tree: tree,
            build_dir: build_dir_for(&self.config.build_dir(), &d.name),
            toolchain: &self.config.toolchain,
            jobs: self.config.make_jobs,
            timeout: self.config.tool_timeout,
            cancel,
        };
        adapter_for(d.build_kind).build(&ctx)
    }
}

pub struct Orchestrator<'a, R: ProjectRunner> {
    table: &'a DescriptorTable,
    runner: &'a R,
    prefix: PathBuf,
    locks_dir: PathBuf,
    platform: String,
    jobs: usize,
    cancel: CancelToken,
}

/// Scheduler state shared by the workers.
struct Queue {
    ready: BTreeSet<usize>,
    waiting_on: BTreeMap<usize, usize>,
    running: usize,
    stopped: bool,
    outcomes: Vec<Option<ProjectOutcome>>,
}

enum Done {
    Built,
    Skipped,
}

impl<'a, R: ProjectRunner> Orchestrator<'a, R> {
    pub fn new(table: &'a DescriptorTable, runner: &'a R, prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        Self {
            table,
            runner,
            locks_dir: prefix.join(".locks"),
            prefix,
            platform: crate::toolchain::Platform::host().to_string(),
            jobs: 1,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_platform(mut self, platform: &str) -> Self {
        self.platform = platform.to_string();
        self
    }

    pub fn with_locks_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.locks_dir = dir.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build `requested` (everything when empty) and their dependencies.
    ///
    /// Ordering, cycle, unknown-name and preflight problems are returned as
    /// errors before any project starts. Project failures are recorded in
    /// the report instead.
    pub fn run(&self, requested: &[String]) -> Result<RunReport> {
        let order = graph::resolve_order(self.table, requested)?;
        let projects: Vec<&ProjectDescriptor> = order
            .iter()
            .map(|n| {
                self.table
                    .get(n)
                    .ok_or_else(|| Error::Config(format!("unknown project '{}'", n)))
            })
            .collect::<Result<_>>()?;

        let pending: Vec<&ProjectDescriptor> = projects
            .iter()
            .copied()
            .filter(|d| !d.is_satisfied(&self.prefix))
            .collect();
        if !pending.is_empty() {
            self.runner.preflight(&pending)?;
        }
        fs::create_dir_all(&self.prefix).map_err(|e| {
            Error::Config(format!("creating '{}': {}", self.prefix.display(), e))
        })?;

        tracing::info!(
            projects = projects.len(),
            pending = pending.len(),
            jobs = self.jobs,
            "build order: {}",
            order.join(", ")
        );

        let mut report = RunReport::start(&self.platform);
        let outcomes = self.execute(&projects);
        report.projects = outcomes
            .into_iter()
            .zip(&projects)
            .map(|(outcome, d)| {
                outcome.unwrap_or_else(|| {
                    ProjectOutcome::new(&d.name, ProjectStatus::NotStarted, Default::default())
                })
            })
            .collect();
        report.finish();
        Ok(report)
    }

    fn execute(&self, projects: &[&ProjectDescriptor]) -> Vec<Option<ProjectOutcome>> {
        let index: BTreeMap<&str, usize> = projects
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.as_str(), i))
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); projects.len()];
        let mut waiting_on = BTreeMap::new();
        for (i, d) in projects.iter().enumerate() {
            waiting_on.insert(i, d.dependencies.len());
            for dep in &d.dependencies {
                if let Some(&j) = index.get(dep.as_str()) {
                    dependents[j].push(i);
                }
            }
        }
        let ready = waiting_on
            .iter()
            .filter(|(_, &n)| n == 0)
            .map(|(&i, _)| i)
            .collect();

        let queue = Mutex::new(Queue {
            ready,
            waiting_on,
            running: 0,
            stopped: false,
            outcomes: vec![None; projects.len()],
        });
        let wake = Condvar::new();
        let workers = self.jobs.min(projects.len()).max(1);

        std::thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| self.worker(projects, &dependents, &queue, &wake));
            }
        });

        queue
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .outcomes
    }

    fn worker(
        &self,
        projects: &[&ProjectDescriptor],
        dependents: &[Vec<usize>],
        queue: &Mutex<Queue>,
        wake: &Condvar,
    ) {
        loop {
            let next = {
                let mut q = queue.lock().unwrap_or_else(PoisonError::into_inner);
                loop {
                    if q.stopped || self.cancel.is_cancelled() {
                        break None;
                    }
                    if let Some(i) = q.ready.pop_first() {
                        q.running += 1;
                        break Some(i);
                    }
                    if q.running == 0 {
                        break None;
                    }
                    q = wake.wait(q).unwrap_or_else(PoisonError::into_inner);
                }
            };
            let Some(i) = next else {
                wake.notify_all();
                return;
            };

            let outcome = self.process(projects[i]);

            let mut q = queue.lock().unwrap_or_else(PoisonError::into_inner);
            q.running -= 1;
            if outcome.status == ProjectStatus::Failed {
                q.stopped = true;
            } else {
                for &dep in &dependents[i] {
                    if let Some(n) = q.waiting_on.get_mut(&dep) {
                        *n -= 1;
                        if *n == 0 {
                            q.ready.insert(dep);
                        }
                    }
                }
            }
            q.outcomes[i] = Some(outcome);
            drop(q);
            wake.notify_all();
        }
    }

    fn process(&self, d: &ProjectDescriptor) -> ProjectOutcome {
        let started = Instant::now();
        match self.process_stages(d) {
            Ok(Done::Built) => {
                tracing::info!(project = %d.name, secs = started.elapsed().as_secs(), "built");
                ProjectOutcome::new(&d.name, ProjectStatus::Built, started.elapsed())
            }
            Ok(Done::Skipped) => {
                ProjectOutcome::new(&d.name, ProjectStatus::Skipped, started.elapsed())
            }
            Err(e) => {
                tracing::error!(
                    project = %d.name,
                    stage = %e.stage().map(|s| s.to_string()).unwrap_or_default(),
                    "{}",
                    e
                );
                ProjectOutcome::failed(&d.name, &e, started.elapsed())
            }
        }
    }

    fn process_stages(&self, d: &ProjectDescriptor) -> Result<Done> {
        let _lock = ProjectLock::acquire(&self.locks_dir, &d.name)?;

        if d.is_satisfied(&self.prefix) {
            tracing::info!(project = %d.name, "already installed, skipping");
            return Ok(Done::Skipped);
        }

        tracing::info!(project = %d.name, kind = %d.build_kind, "fetching");
        let archive = self.runner.fetch(d, &self.cancel)?;

        self.check_cancelled(d, Stage::Prepare)?;
        tracing::info!(project = %d.name, "preparing source");
        let tree = self.runner.prepare(d, &archive, &self.cancel)?;

        self.check_cancelled(d, Stage::Build)?;
        tracing::info!(project = %d.name, "building");
        self.runner.build(d, &tree, &self.cancel)?;

        if !d.has_any_sentinel(&self.prefix) {
            return Err(Error::Verify {
                project: d.name.clone(),
                sentinels: d.sentinel_paths.clone(),
            });
        }
        Ok(Done::Built)
    }

    fn check_cancelled(&self, d: &ProjectDescriptor, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled {
                project: d.name.clone(),
                stage,
            });
        }
        Ok(())
    }
}

/// Build `requested` from `table` with the native runner and write the run
/// report under the work directory.
pub fn run(requested: &[String], table: &DescriptorTable, config: &BuildConfig) -> Result<RunReport> {
    run_with_cancel(requested, table, config, CancelToken::new())
}

pub fn run_with_cancel(
    requested: &[String],
    table: &DescriptorTable,
    config: &BuildConfig,
    cancel: CancelToken,
) -> Result<RunReport> {
    let runner = NativeRunner::new(config);
    let report = Orchestrator::new(table, &runner, &config.install_prefix)
        .with_jobs(config.jobs)
        .with_platform(config.platform().as_str())
        .with_locks_dir(config.locks_dir())
        .with_cancel(cancel)
        .run(requested)?;

    let path = config.report_path();
    if let Err(e) = report.write(&path) {
        tracing::warn!("{}", e);
    } else {
        tracing::debug!(path = %path.display(), "run report written");
    }
    Ok(report)
}

/// Remove the work directory and, with `downloads`, the archive cache.
/// Returns the paths that existed and were removed.
pub fn clean(config: &BuildConfig, downloads: bool) -> Result<Vec<PathBuf>> {
    let mut targets = vec![config.work_dir.clone()];
    if downloads {
        targets.push(config.cache_dir.clone());
    }

    let mut removed = Vec::new();
    for path in targets {
        if !path.exists() {
            continue;
        }
        remove_path(&path)
            .map_err(|e| Error::Config(format!("removing '{}': {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "removed");
        removed.push(path);
    }
    Ok(removed)
}
