use anyhow::Context as _;
use colored::Colorize;
use pjudge_core::action;

use super::{ExitStatus, GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Exercise name
    pub exercise: String,
}

pub fn exec(args: &Args, global_args: &GlobalArgs) -> SubcmdResult {
    let cfg = global_args.load_config()?;
    let repo = action::exercise_repo(&cfg, global_args.exercises_dir.as_deref());
    let exercise = repo
        .load(&args.exercise)
        .with_context(|| format!("Failed to load exercise '{}'", args.exercise))?;
    let limits = exercise.limits(cfg.judge.default_limits());

    println!("{}", exercise.name.bold());
    println!("  Time limit:   {} ms", limits.time.as_millis());
    println!("  Memory limit: {} bytes", limits.memory);
    println!(
        "  Testcases:    {}",
        exercise
            .testcases
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    match action::describe(&repo, &args.exercise) {
        Ok(text) => println!("\n{}", text.trim_end()),
        Err(e) => log::debug!("{:#}", e),
    }
    Ok(ExitStatus::Success)
}
