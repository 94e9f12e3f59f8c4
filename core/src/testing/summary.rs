use std::time::Duration;

use serde::Serialize;

use super::{record::serialize_millis, ExecutionRecord, TestCase, Verdict};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JudgedCase {
    /// 1-based position in the session.
    pub index: usize,
    pub testcase: TestCase,
    pub record: ExecutionRecord,
    pub verdict: Verdict,
}

/// A case whose candidate process could not be launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpawnFailure {
    pub index: usize,
    pub testcase: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    cases: Vec<JudgedCase>,
    spawn_failures: Vec<SpawnFailure>,
    passed: usize,
    total: usize,
    #[serde(rename = "max_elapsed_ms", serialize_with = "serialize_millis")]
    max_elapsed: Duration,
    interrupted: bool,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        testcase: TestCase,
        record: ExecutionRecord,
        verdict: Verdict,
    ) -> &JudgedCase {
        self.total += 1;
        if verdict.is_correct() {
            self.passed += 1;
        }
        self.max_elapsed = self.max_elapsed.max(record.elapsed);
        self.cases.push(JudgedCase {
            index: self.total,
            testcase,
            record,
            verdict,
        });
        &self.cases[self.cases.len() - 1]
    }

    pub fn append_spawn_failure(
        &mut self,
        testcase: &TestCase,
        message: impl Into<String>,
    ) -> &SpawnFailure {
        self.total += 1;
        self.spawn_failures.push(SpawnFailure {
            index: self.total,
            testcase: testcase.name.clone(),
            message: message.into(),
        });
        &self.spawn_failures[self.spawn_failures.len() - 1]
    }

    pub(crate) fn mark_interrupted(&mut self) {
        self.interrupted = true;
    }

    pub fn cases(&self) -> &[JudgedCase] {
        &self.cases
    }

    pub fn spawn_failures(&self) -> &[SpawnFailure] {
        &self.spawn_failures
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn all_passed(&self) -> bool {
        !self.interrupted && self.passed == self.total
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.cases.iter().filter(|c| c.verdict == verdict).count()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record_ms(ms: u64) -> ExecutionRecord {
        ExecutionRecord {
            elapsed: Duration::from_millis(ms),
            ..Default::default()
        }
    }

    #[test]
    fn aggregates_follow_appended_cases() {
        let t = TestCase::new("t", ["3"], ["6"]);
        let mut s = RunSummary::new();
        assert_eq!((s.passed(), s.total()), (0, 0));
        assert_eq!(s.max_elapsed(), Duration::ZERO);

        let steps = [
            (Verdict::Correct, 120),
            (Verdict::WrongAnswer, 300),
            (Verdict::Correct, 80),
            (Verdict::TimeLimitExceeded, 1000),
            (Verdict::RuntimeError, 5),
        ];
        let mut prev_max = Duration::ZERO;
        for (i, (verdict, ms)) in steps.into_iter().enumerate() {
            let judged = s.append(t.clone(), record_ms(ms), verdict);
            assert_eq!(judged.index, i + 1);
            assert_eq!(s.total(), i + 1);
            assert!(s.passed() <= s.total());
            assert!(s.max_elapsed() >= prev_max);
            prev_max = s.max_elapsed();
        }

        assert_eq!(s.passed(), 2);
        assert_eq!(s.passed(), s.count(Verdict::Correct));
        assert_eq!(s.max_elapsed(), Duration::from_millis(1000));
        assert!(!s.all_passed());
    }

    #[test]
    fn spawn_failures_count_towards_total_only() {
        let t = TestCase::new("t", ["1"], ["1"]);
        let mut s = RunSummary::new();
        s.append(t.clone(), record_ms(10), Verdict::Correct);
        let f = s.append_spawn_failure(&t, "No such file or directory");
        assert_eq!(f.index, 2);
        assert_eq!(s.total(), 2);
        assert_eq!(s.passed(), 1);
        assert_eq!(s.cases().len(), 1);
        assert!(!s.all_passed());
    }

    #[test]
    fn empty_summary_is_vacuously_passed_unless_interrupted() {
        let mut s = RunSummary::new();
        assert!(s.all_passed());
        s.mark_interrupted();
        assert!(!s.all_passed());
    }
}
