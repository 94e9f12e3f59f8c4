use std::{
    collections::BTreeMap,
    fmt::Display,
    io::{self, Write},
    time::Duration,
};

use colored::Colorize;
use crossterm::terminal;
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    style::{self, ColorTheme},
    testing::{JudgedCase, RunSummary, SpawnFailure, TestCase, Verdict},
};

/// Receives the progress of a judging session, case by case.
pub trait Reporter {
    fn case_started(&mut self, _index: usize, _testcase: &TestCase) {}

    fn case_judged(&mut self, case: &JudgedCase);

    fn spawn_failed(&mut self, failure: &SpawnFailure);

    fn interrupted(&mut self, _summary: &RunSummary) {}

    fn finished(&mut self, summary: &RunSummary);
}

/// Human readable, line oriented report.
pub struct ConsoleReporter<W: Write = io::Stdout> {
    out: W,
    spinner: Option<ProgressBar>,
    show_spinner: bool,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: io::stdout(),
            spinner: None,
            show_spinner: true,
        }
    }
}

impl<W: Write> ConsoleReporter<W> {
    const SPINNER_TICK: Duration = Duration::from_millis(50);

    pub fn new(out: W) -> Self {
        Self {
            out,
            spinner: None,
            show_spinner: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: impl Display) {
        writeln!(self.out, "{}", line)
            .unwrap_or_else(|e| log::warn!("Failed to write report: {}", e));
    }

    fn emit_lines(&mut self, lines: &[String]) {
        if lines.is_empty() {
            self.emit(format!("  - {}", "<EMPTY>".magenta().dimmed()));
            return;
        }
        for line in lines {
            self.emit(format!("  - {}", line));
        }
    }

    fn stop_spinner(&mut self) {
        if let Some(bar) = self.spinner.take() {
            bar.finish_and_clear();
        }
    }

    fn emit_detail(&mut self, case: &JudgedCase) {
        let rec = &case.record;
        match case.verdict {
            Verdict::RuntimeError => {
                if !rec.stderr.is_empty() {
                    self.emit_lines(&rec.stderr);
                }
                self.emit(format!("  - Process finished with {}", rec.exit_status()));
                if let Some(v) = rec.violation {
                    self.emit(format!("  - Killed: {}", v).bright_red());
                }
            }
            Verdict::WrongAnswer => {
                self.emit(format!("  - {}", "Expected output:".cyan().bold()));
                self.emit_lines(&case.testcase.expected);
                self.emit(format!("  - {}", "Received output:".cyan().bold()));
                self.emit_lines(&rec.stdout);
            }
            Verdict::MemoryLimitExceeded => {
                self.emit(format!("  - Peak memory: {} bytes", rec.peak_memory));
            }
            Verdict::PolicyViolation => {
                if let Some(v) = rec.violation {
                    self.emit(format!("  - Killed: {}", v).bright_red());
                }
            }
            Verdict::Correct | Verdict::TimeLimitExceeded => {}
        }
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn case_started(&mut self, index: usize, testcase: &TestCase) {
        if !self.show_spinner {
            return;
        }
        let style = ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bar = ProgressBar::new_spinner()
            .with_style(style)
            .with_message(format!("Case #{} ({}) ...", index, testcase.name));
        bar.enable_steady_tick(Self::SPINNER_TICK);
        self.spinner = Some(bar);
    }

    fn case_judged(&mut self, case: &JudgedCase) {
        self.stop_spinner();
        self.emit(format!(
            "Case #{} → {} {}  [{} ms]",
            case.index,
            style::judge_icon(case.verdict),
            case.verdict.to_string().color(case.verdict.color()).bold(),
            case.record.elapsed.as_millis(),
        ));
        self.emit_detail(case);
    }

    fn spawn_failed(&mut self, failure: &SpawnFailure) {
        self.stop_spinner();
        self.emit(format!(
            "Case #{} → {}",
            failure.index,
            "Could not start the program".bright_red().bold()
        ));
        self.emit(format!("  - {}", failure.message));
    }

    fn interrupted(&mut self, _summary: &RunSummary) {
        self.stop_spinner();
        self.emit("stopping judging due to user interrupt.".bright_yellow());
    }

    fn finished(&mut self, summary: &RunSummary) {
        self.stop_spinner();

        let (cols, _) = terminal::size().unwrap_or((40, 40));
        let bar = "─".repeat((cols as usize).min(60)).bright_black();
        self.emit(&bar);

        let score = format!(
            "Final score: {}/{}  [{} ms]",
            summary.passed(),
            summary.total(),
            summary.max_elapsed().as_millis()
        );
        if summary.all_passed() {
            self.emit(score.green().bold());
            return;
        }
        self.emit(score.bright_red().bold());

        let mut count: BTreeMap<&'static str, (Verdict, usize)> = BTreeMap::new();
        for c in summary.cases().iter().filter(|c| !c.verdict.is_correct()) {
            count.entry(c.verdict.code()).or_insert((c.verdict, 0)).1 += 1;
        }
        let mut details: Vec<String> = count
            .values()
            .map(|&(verdict, cnt)| {
                format!(
                    "{}{}{}",
                    style::judge_icon(verdict),
                    "x".dimmed(),
                    cnt.to_string().bold().bright_white()
                )
            })
            .collect();
        if !summary.spawn_failures().is_empty() {
            details.push(format!("not started x{}", summary.spawn_failures().len()));
        }
        if !details.is_empty() {
            self.emit(format!("({})", details.join(", ")));
        }
    }
}

/// Stays silent while judging and prints the whole summary as JSON at the end.
pub struct JsonReporter<W: Write = io::Stdout> {
    out: W,
}

impl JsonReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn case_judged(&mut self, case: &JudgedCase) {
        log::info!("Case #{} → {}", case.index, case.verdict);
    }

    fn spawn_failed(&mut self, failure: &SpawnFailure) {
        log::warn!("Case #{} → {}", failure.index, failure.message);
    }

    fn finished(&mut self, summary: &RunSummary) {
        let res = serde_json::to_writer_pretty(&mut self.out, summary)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(self.out));
        res.unwrap_or_else(|e| log::error!("Failed to write JSON report: {}", e));
    }
}
