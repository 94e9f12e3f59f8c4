use std::{ffi::OsString, future::Future};

use anyhow::Context as _;

use super::{
    probe::ProcessProbe, classify_with, Limits, MonitoredRunner, RunSummary, TestCase,
    VerdictMode,
};
use crate::report::Reporter;

/// One judging pass of a single command over a sequence of testcases.
///
/// Cases run strictly one after another, are reported in the order supplied and
/// never abort the pass on a wrong answer unless `fail_fast` is set.
#[derive(Debug)]
pub struct JudgeSession<'r, P: ProcessProbe> {
    runner: &'r MonitoredRunner<P>,
    command: Vec<OsString>,
    limits: Limits,
    mode: VerdictMode,
    fail_fast: bool,
}

impl<'r, P: ProcessProbe> JudgeSession<'r, P> {
    pub fn new(runner: &'r MonitoredRunner<P>, command: Vec<OsString>, limits: Limits) -> Self {
        Self {
            runner,
            command,
            limits,
            mode: VerdictMode::default(),
            fail_fast: false,
        }
    }

    pub fn verdict_mode(mut self, mode: VerdictMode) -> Self {
        self.mode = mode;
        self
    }

    /// Stop at the first case that is not `Correct` (spawn failures included).
    pub fn fail_fast(mut self, yes: bool) -> Self {
        self.fail_fast = yes;
        self
    }

    pub fn command(&self) -> &[OsString] {
        &self.command
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Judges every testcase in order.
    ///
    /// When `interrupt` resolves the running candidate is killed (its future is
    /// dropped), the summary is marked interrupted and returned as far as it got.
    pub async fn judge<I, R, F>(
        &self,
        testcases: I,
        reporter: &mut R,
        interrupt: F,
    ) -> anyhow::Result<RunSummary>
    where
        I: IntoIterator<Item = anyhow::Result<TestCase>>,
        R: Reporter + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let mut summary = RunSummary::new();

        for testcase in testcases {
            let testcase = testcase?;
            let index = summary.total() + 1;
            reporter.case_started(index, &testcase);

            let res = tokio::select! {
                biased;
                _ = &mut interrupt => None,
                res = self.runner.run(&self.command, &testcase.input, self.limits) => Some(res),
            };
            let Some(res) = res else {
                log::info!("Interrupted while running testcase {}", testcase.name);
                summary.mark_interrupted();
                reporter.interrupted(&summary);
                break;
            };

            match res {
                Ok(record) => {
                    let verdict = classify_with(&record, &testcase.expected, self.mode);
                    let judged = summary.append(testcase, record, verdict);
                    reporter.case_judged(judged);
                    if self.fail_fast && !verdict.is_correct() {
                        break;
                    }
                }
                Err(e) if e.is_spawn_error() => {
                    log::debug!("Testcase {}: {:#}", testcase.name, e);
                    let failure = summary.append_spawn_failure(&testcase, e.to_string());
                    reporter.spawn_failed(failure);
                    if self.fail_fast {
                        break;
                    }
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to run testcase {}", testcase.name))
                }
            }
        }

        reporter.finished(&summary);
        Ok(summary)
    }
}
