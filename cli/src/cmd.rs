pub mod list;
pub mod show;

use std::path::PathBuf;

use pjudge_core::Config;

use crate::util;

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct GlobalArgs {
    #[command(subcommand)]
    pub subcmd: Subcommand,

    /// Directory holding the exercises (overrides `judge.exercises_dir`)
    #[arg(short, long, global = true)]
    pub exercises_dir: Option<PathBuf>,

    /// Config file to use instead of looking up `pjudge.toml`
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    /// Judge a program against the testcases of an exercise
    #[command(alias("t"))]
    Test(test::Args),

    /// List available exercises
    List(list::Args),

    /// Show limits, testcases and description of an exercise
    Show(show::Args),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
    Interrupted,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
            ExitStatus::Interrupted => 130,
        }
    }
}

pub type SubcmdResult = anyhow::Result<ExitStatus>;

impl GlobalArgs {
    pub async fn exec_subcmd(&self) -> SubcmdResult {
        use Subcommand::*;
        match &self.subcmd {
            Test(args) => test::exec(args, self).await,
            List(args) => list::exec(args, self),
            Show(args) => show::exec(args, self),
        }
    }

    pub fn load_config(&self) -> anyhow::Result<Config> {
        match &self.config {
            Some(path) => Config::from_toml_file(path.to_owned()),
            None => Config::load(util::current_dir()),
        }
    }
}

#[cfg(test)]
mod test_args {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_test_subcommand() {
        let app = GlobalArgs::parse_from([
            "pjudge",
            "-e",
            "ex",
            "t",
            "double",
            "main.py",
            "--time-limit",
            "0.5",
            "--fail-fast",
        ]);
        assert_eq!(app.exercises_dir, Some(PathBuf::from("ex")));
        let Subcommand::Test(args) = app.subcmd else {
            panic!("expected test subcommand");
        };
        assert_eq!(args.exercise, "double");
        assert_eq!(args.program_file, PathBuf::from("main.py"));
        assert_eq!(args.time_limit, Some(0.5));
        assert!(args.fail_fast);
        assert!(!args.json);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failure.code(), 1);
        assert_eq!(ExitStatus::Interrupted.code(), 130);
    }
}
