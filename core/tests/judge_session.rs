#![cfg(unix)]

use std::{ffi::OsString, future, time::Duration};

use pjudge_core::{
    report::Reporter,
    testing::{
        JudgeSession, JudgedCase, Limits, MonitoredRunner, RunSummary, SpawnFailure, TestCase,
        Verdict,
    },
};

const SCRIPT: &str = r#"
read x
case "$x" in
    loop) while :; do :; done ;;
    err) echo boom >&2; exit 3 ;;
    5) echo 11 ;;
    *) echo $((x * 2)) ;;
esac
"#;

#[derive(Debug, Default)]
struct RecordingReporter {
    events: Vec<String>,
}

impl Reporter for RecordingReporter {
    fn case_started(&mut self, index: usize, testcase: &TestCase) {
        self.events.push(format!("start {} {}", index, testcase.name));
    }

    fn case_judged(&mut self, case: &JudgedCase) {
        self.events
            .push(format!("judged {} {}", case.index, case.verdict.code()));
    }

    fn spawn_failed(&mut self, failure: &SpawnFailure) {
        self.events.push(format!("spawn_failed {}", failure.index));
    }

    fn interrupted(&mut self, _summary: &RunSummary) {
        self.events.push("interrupted".into());
    }

    fn finished(&mut self, summary: &RunSummary) {
        self.events
            .push(format!("finished {}/{}", summary.passed(), summary.total()));
    }
}

fn sh_command() -> Vec<OsString> {
    vec!["sh".into(), "-c".into(), SCRIPT.into()]
}

fn cases(inputs: &[(&str, &str)]) -> Vec<anyhow::Result<TestCase>> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, &(input, expected))| {
            Ok(TestCase::new(format!("{:02}", i + 1), [input], [expected]))
        })
        .collect()
}

fn limits() -> Limits {
    Limits::new(Duration::from_millis(500), Limits::DEFAULT_MEMORY)
}

#[tokio::test]
async fn judge_mixed_verdicts_in_order() {
    let runner = MonitoredRunner::new();
    let session = JudgeSession::new(&runner, sh_command(), limits());
    let mut reporter = RecordingReporter::default();

    let summary = session
        .judge(
            cases(&[("3", "6"), ("5", "10"), ("loop", "0"), ("err", "0")]),
            &mut reporter,
            future::pending(),
        )
        .await
        .unwrap();
    dbg!(&reporter.events);

    let verdicts: Vec<_> = summary.cases().iter().map(|c| c.verdict).collect();
    assert_eq!(
        verdicts,
        vec![
            Verdict::Correct,
            Verdict::WrongAnswer,
            Verdict::TimeLimitExceeded,
            Verdict::RuntimeError
        ]
    );
    assert_eq!(summary.passed(), 1);
    assert_eq!(summary.total(), 4);
    assert!(!summary.all_passed());

    let tle = &summary.cases()[2].record;
    assert!(tle.timed_out);
    assert_eq!(tle.elapsed, Duration::from_millis(500));
    assert_eq!(summary.max_elapsed(), Duration::from_millis(500));

    let re = &summary.cases()[3].record;
    assert_eq!(re.exit_code, Some(3));
    assert_eq!(re.stderr, vec!["boom"]);

    assert_eq!(reporter.events.first().unwrap(), "start 1 01");
    assert_eq!(reporter.events[1], "judged 1 AC");
    assert_eq!(reporter.events.last().unwrap(), "finished 1/4");
}

#[tokio::test]
async fn fail_fast_stops_at_first_failure() {
    let runner = MonitoredRunner::new();
    let session = JudgeSession::new(&runner, sh_command(), limits()).fail_fast(true);
    let mut reporter = RecordingReporter::default();

    let summary = session
        .judge(
            cases(&[("1", "2"), ("5", "10"), ("3", "6")]),
            &mut reporter,
            future::pending(),
        )
        .await
        .unwrap();

    assert_eq!(summary.total(), 2);
    assert_eq!(summary.passed(), 1);
    assert_eq!(reporter.events.last().unwrap(), "finished 1/2");
}

#[tokio::test]
async fn interrupt_kills_running_case() {
    let runner = MonitoredRunner::new();
    let long = Limits::new(Duration::from_secs(10), Limits::DEFAULT_MEMORY);
    let session = JudgeSession::new(&runner, sh_command(), long);
    let mut reporter = RecordingReporter::default();

    let started = tokio::time::Instant::now();
    let summary = session
        .judge(
            cases(&[("loop", "0"), ("3", "6")]),
            &mut reporter,
            tokio::time::sleep(Duration::from_millis(200)),
        )
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(summary.is_interrupted());
    assert_eq!(summary.total(), 0);
    assert!(!summary.all_passed());
    assert_eq!(
        reporter.events,
        vec!["start 1 01", "interrupted", "finished 0/0"]
    );
}

#[tokio::test]
async fn spawn_failures_are_hard_failures() {
    let runner = MonitoredRunner::new();
    let command: Vec<OsString> = vec!["/nonexistent/candidate".into()];
    let mut reporter = RecordingReporter::default();

    let summary = JudgeSession::new(&runner, command.clone(), limits())
        .judge(cases(&[("1", "2"), ("3", "6")]), &mut reporter, future::pending())
        .await
        .unwrap();
    assert_eq!(summary.total(), 2);
    assert_eq!(summary.passed(), 0);
    assert!(summary.cases().is_empty());
    assert_eq!(summary.spawn_failures().len(), 2);
    assert!(reporter.events.contains(&"spawn_failed 2".to_owned()));

    let summary = JudgeSession::new(&runner, command, limits())
        .fail_fast(true)
        .judge(
            cases(&[("1", "2"), ("3", "6")]),
            &mut RecordingReporter::default(),
            future::pending(),
        )
        .await
        .unwrap();
    assert_eq!(summary.total(), 1);
}

#[tokio::test]
async fn testcase_load_error_propagates() {
    let runner = MonitoredRunner::new();
    let session = JudgeSession::new(&runner, sh_command(), limits());
    let mut reporter = RecordingReporter::default();

    let testcases = vec![
        Ok(TestCase::new("01", ["3"], ["6"])),
        Err(anyhow::anyhow!("cannot read 02.in")),
    ];
    let err = session
        .judge(testcases, &mut reporter, future::pending())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("02.in"));
    assert_eq!(reporter.events, vec!["start 1 01", "judged 1 AC"]);
}
