pub mod error {
    #[allow(unused_imports)]
    pub(crate) use anyhow::{anyhow, bail, ensure, Context as _};
    pub use anyhow::{Error, Result};
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use error::*;

use crate::config::Config;
use crate::exercise::ExerciseRepo;
use crate::report::{ConsoleReporter, JsonReporter, Reporter};
use crate::testing::{JudgeSession, MonitoredRunner, RunSummary, VerdictMode};

/// Per-invocation overrides of the configured judge settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgeOptions {
    pub exercises_dir: Option<PathBuf>,
    /// Seconds.
    pub time_limit: Option<f64>,
    /// Bytes.
    pub memory_limit: Option<u64>,
    pub fail_fast: bool,
    pub json: bool,
    pub detailed_verdicts: bool,
}

pub fn exercise_repo(cfg: &Config, dir_override: Option<&Path>) -> ExerciseRepo {
    let dir = dir_override
        .map(Path::to_owned)
        .unwrap_or_else(|| cfg.exercises_dir());
    log::debug!("Exercises dir: {:?}", dir);
    ExerciseRepo::new(dir)
}

pub fn list_exercises(repo: &ExerciseRepo) -> Result<Vec<String>> {
    repo.list().context("Failed to list exercises")
}

pub fn describe(repo: &ExerciseRepo, exercise_name: &str) -> Result<String> {
    repo.description(exercise_name)
        .with_context(|| format!("No description for exercise '{}'", exercise_name))
}

/// Runs `program_file` against every testcase of `exercise_name`.
///
/// Ctrl-C stops the session after killing the running candidate; the partial
/// summary is returned with `is_interrupted()` set.
pub async fn do_judge(
    program_file: impl AsRef<Path>,
    exercise_name: &str,
    cfg: &Config,
    opts: &JudgeOptions,
) -> Result<RunSummary> {
    let program_file = program_file.as_ref();

    let command = cfg
        .command_table()
        .resolve(program_file)
        .with_context(|| format!("Cannot run '{}'", program_file.to_string_lossy()))?;

    let repo = exercise_repo(cfg, opts.exercises_dir.as_deref());
    let exercise = repo
        .load(exercise_name)
        .with_context(|| format!("Failed to load exercise '{}'", exercise_name))?;
    if exercise.testcases.is_empty() {
        bail!(
            "No testcases found in {}",
            exercise.dir.join(ExerciseRepo::TESTS_DIRNAME).to_string_lossy()
        );
    }

    let mut limits = exercise.limits(cfg.judge.default_limits());
    if let Some(secs) = opts.time_limit {
        ensure!(
            secs.is_finite() && secs > 0.0,
            "--time-limit must be positive (got {})",
            secs
        );
        limits.time = Duration::from_secs_f64(secs);
    }
    if let Some(bytes) = opts.memory_limit {
        ensure!(bytes > 0, "--memory-limit must be positive");
        limits.memory = bytes;
    }

    let mode = if opts.detailed_verdicts {
        VerdictMode::Detailed
    } else {
        cfg.judge.verdict_mode
    };

    let runner = MonitoredRunner::new()
        .poll_interval(cfg.judge.poll_interval())
        .drain_timeout(cfg.judge.drain_timeout());
    let session = JudgeSession::new(&runner, command, limits)
        .verdict_mode(mode)
        .fail_fast(opts.fail_fast);

    log::info!(
        "Judging '{}' with {:?} ({} testcases, time limit {} ms, memory limit {} bytes)",
        exercise.name,
        session.command(),
        exercise.testcases.len(),
        limits.time.as_millis(),
        limits.memory,
    );

    let mut reporter: Box<dyn Reporter> = if opts.json {
        Box::new(JsonReporter::stdout())
    } else {
        Box::new(ConsoleReporter::stdout())
    };

    session
        .judge(exercise.testcases(), reporter.as_mut(), user_interrupt())
        .await
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn user_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
