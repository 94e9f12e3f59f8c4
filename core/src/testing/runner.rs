use std::{
    ffi::{OsStr, OsString},
    io,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, Command},
    task::JoinHandle,
    time::Instant,
};

use super::{
    probe::{ProbeError, ProcessProbe, ProcfsProbe},
    record::{ExecutionRecord, Violation},
    testcase::{encode_lines, split_lines},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(1000);

/// Shortest sleep between ticks once the time limit is near.
const MIN_NAP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub time: Duration,
    /// Resident memory ceiling in bytes.
    pub memory: u64,
}

impl Limits {
    pub const DEFAULT_TIME: Duration = Duration::from_millis(1000);
    pub const DEFAULT_MEMORY: u64 = 256 * 1024 * 1024;

    pub fn new(time: Duration, memory: u64) -> Self {
        Self { time, memory }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIME, Self::DEFAULT_MEMORY)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Empty command line")]
    EmptyCommand,

    #[error("Failed to spawn '{}': {}", .program.to_string_lossy(), .source)]
    Spawn {
        program: OsString,
        #[source]
        source: io::Error,
    },

    #[error("Failed to communicate with subprocess: {0}")]
    Io(#[from] io::Error),
}

impl RunError {
    /// The candidate never started; not something the candidate did.
    pub fn is_spawn_error(&self) -> bool {
        matches!(self, RunError::Spawn { .. } | RunError::EmptyCommand)
    }
}

/// Runs one candidate process while sampling it at a fixed interval, and kills
/// it on the first limit or policy violation seen in a tick.
#[derive(Debug, Clone)]
pub struct MonitoredRunner<P = ProcfsProbe> {
    probe: P,
    poll_interval: Duration,
    drain_timeout: Duration,
}

impl MonitoredRunner<ProcfsProbe> {
    pub fn new() -> Self {
        Self::with_probe(ProcfsProbe::new())
    }
}

impl Default for MonitoredRunner<ProcfsProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ProcessProbe> MonitoredRunner<P> {
    pub fn with_probe(probe: P) -> Self {
        Self {
            probe,
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How long to wait for stdout/stderr to reach EOF once the process is gone.
    /// A leaked grandchild may keep the pipes open forever.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub async fn run<S>(
        &self,
        command: &[S],
        input: &[String],
        limits: Limits,
    ) -> Result<ExecutionRecord, RunError>
    where
        S: AsRef<OsStr>,
    {
        let (program, args) = command.split_first().ok_or(RunError::EmptyCommand)?;

        let mut proc = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: program.as_ref().to_owned(),
                source,
            })?;
        let start_at = Instant::now();

        let stdin = proc.stdin.take().ok_or_else(|| pipe_error("stdin"))?;
        let stdout = proc.stdout.take().ok_or_else(|| pipe_error("stdout"))?;
        let stderr = proc.stderr.take().ok_or_else(|| pipe_error("stderr"))?;

        // Pipes are serviced by their own tasks so a chatty or non-reading
        // candidate cannot stall the poll loop.
        let feeder = tokio::spawn(feed_stdin(stdin, encode_lines(input)));
        let stdout_task = tokio::spawn(read_all(stdout));
        let stderr_task = tokio::spawn(read_all(stderr));

        let mut peak_memory = 0;
        let (status, violation, elapsed) = self
            .monitor(&mut proc, start_at, limits, &mut peak_memory)
            .await?;
        feeder.abort();

        let stdout = self.drain(stdout_task, "stdout").await;
        let stderr = self.drain(stderr_task, "stderr").await;

        let record = ExecutionRecord {
            stdout,
            stderr,
            exit_code: status.code(),
            elapsed: elapsed.min(limits.time),
            peak_memory,
            timed_out: violation == Some(Violation::TimeLimit),
            memory_exceeded: violation == Some(Violation::MemoryLimit),
            spawned_child: violation == Some(Violation::ChildProcess),
            used_network: violation == Some(Violation::Network),
            violation,
        };
        log::debug!(
            "Process finished: {} [{}ms, peak {} bytes, violation={:?}]",
            record.exit_status(),
            elapsed.as_millis(),
            peak_memory,
            violation,
        );
        Ok(record)
    }

    /// Returns the exit status, the violation that caused a kill and the elapsed
    /// time. For a kill the elapsed time is the one sampled by the deciding tick.
    async fn monitor(
        &self,
        proc: &mut Child,
        start_at: Instant,
        limits: Limits,
        peak_memory: &mut u64,
    ) -> io::Result<(ExitStatus, Option<Violation>, Duration)> {
        let Some(pid) = proc.id() else {
            let status = proc.wait().await?;
            return Ok((status, None, start_at.elapsed()))
        };

        loop {
            let elapsed = start_at.elapsed();
            match self.inspect(pid, elapsed, limits, peak_memory) {
                Ok(Some(violation)) => {
                    log::debug!("Killing process {}: {}", pid, violation);
                    self.terminate(proc, pid);
                    let status = proc.wait().await?;
                    return Ok((status, Some(violation), elapsed));
                }
                Ok(None) => {}
                // Exited between checks; the wait below reaps it.
                Err(ProbeError::Gone(_)) => {}
                Err(e) => log::warn!("Cannot inspect process {}: {:#}", pid, e),
            }

            let nap = self
                .poll_interval
                .min(limits.time.saturating_sub(elapsed))
                .max(MIN_NAP);
            tokio::select! {
                status = proc.wait() => return Ok((status?, None, start_at.elapsed())),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    /// Checks run in a fixed order; the first hit wins.
    fn inspect(
        &self,
        pid: u32,
        elapsed: Duration,
        limits: Limits,
        peak_memory: &mut u64,
    ) -> Result<Option<Violation>, ProbeError> {
        if elapsed > limits.time {
            return Ok(Some(Violation::TimeLimit));
        }

        if let Some(rss) = self.probe.resident_memory(pid)? {
            *peak_memory = (*peak_memory).max(rss);
        }
        if *peak_memory > limits.memory {
            return Ok(Some(Violation::MemoryLimit));
        }

        if !self.probe.children(pid)?.is_empty() {
            return Ok(Some(Violation::ChildProcess));
        }

        if self.probe.has_network_connection(pid)? {
            return Ok(Some(Violation::Network));
        }
        Ok(None)
    }

    fn terminate(&self, proc: &mut Child, pid: u32) {
        // Collected before the kill: afterwards they get reparented and can no
        // longer be told apart from unrelated processes.
        let descendants = self.probe.descendants(pid).unwrap_or_else(|e| {
            log::debug!("Cannot list descendants of {}: {:#}", pid, e);
            Vec::new()
        });

        proc.start_kill()
            .unwrap_or_else(|e| log::warn!("Failed to kill process {}: {:#}", pid, e));
        kill_all(&descendants);
    }

    async fn drain(&self, mut task: JoinHandle<io::Result<Vec<u8>>>, name: &str) -> Vec<String> {
        match tokio::time::timeout(self.drain_timeout, &mut task).await {
            Ok(Ok(Ok(buf))) => split_lines(&String::from_utf8_lossy(&buf)),
            Ok(Ok(Err(e))) => {
                log::warn!("Failed to read {} of subprocess: {:#}", name, e);
                Vec::new()
            }
            Ok(Err(e)) => {
                log::warn!("Reader task for {} failed: {:#}", name, e);
                Vec::new()
            }
            Err(_) => {
                log::warn!(
                    "{} still open {}ms after the process ended; a descendant may hold it",
                    name,
                    self.drain_timeout.as_millis()
                );
                task.abort();
                Vec::new()
            }
        }
    }
}

fn pipe_error(name: &str) -> RunError {
    RunError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("Failed to open {}", name),
    ))
}

async fn feed_stdin(mut stdin: ChildStdin, data: Vec<u8>) {
    match stdin.write_all(&data).await {
        Ok(()) => {}
        // The candidate is free to exit without reading its input.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Err(e) => log::debug!("Failed to pass input-data to stdin: {:#}", e),
    }
    // dropping `stdin` closes the pipe so the candidate sees EOF
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

#[cfg(unix)]
fn kill_all(pids: &[u32]) {
    use nix::{
        errno::Errno,
        sys::signal::{kill, Signal},
        unistd::Pid,
    };

    for &pid in pids {
        let Ok(raw) = i32::try_from(pid) else {
            continue
        };
        match kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => log::warn!("Failed to kill descendant process {}: {}", pid, e),
        }
    }
}

#[cfg(not(unix))]
fn kill_all(pids: &[u32]) {
    if !pids.is_empty() {
        log::warn!("Cannot kill descendant processes {:?} on this platform", pids);
    }
}
