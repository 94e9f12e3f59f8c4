use pjudge_core::action;

use super::{ExitStatus, GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {}

pub fn exec(_args: &Args, global_args: &GlobalArgs) -> SubcmdResult {
    let cfg = global_args.load_config()?;
    let repo = action::exercise_repo(&cfg, global_args.exercises_dir.as_deref());
    for name in action::list_exercises(&repo)? {
        println!("{}", name);
    }
    Ok(ExitStatus::Success)
}
