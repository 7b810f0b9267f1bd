// Process sandbox - one isolated child process per render job
//
// The child (`infographic-render-child`) owns a headless browser. It gets a
// `RenderJobSpec` as JSON on stdin and answers with one `ResultRecord` line
// on stdout. The parent never returns before the child has exited.
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use infographic_core::application::cancel::CancelToken;
use infographic_core::application::worker::constants::{
    CHILD_REPORT_MARGIN, DEFAULT_COMPLETION_MARKER, DEFAULT_ROOT_SELECTOR,
    DEFAULT_SETTLE_DURATION, DIAGNOSTICS_TAIL_BYTES, GRACEFUL_TERMINATION_TIMEOUT,
    MAX_RECORD_BYTES,
};
use infographic_core::domain::{RenderJobSpec, ResultRecord, SandboxPhase, Viewport};
use infographic_core::port::{RenderSandbox, SandboxError};

/// Environment variables a render child may inherit
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "PATH", "HOME", "USER", "LANG", "TMPDIR", "RUST_LOG", "CHROME",
];

/// How long to keep draining output pipes after the child has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a child that has reported may take to exit on its own
const RECORD_EXIT_GRACE: Duration = Duration::from_secs(1);

/// Render child settings
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Render child executable
    pub program: PathBuf,
    /// Arguments passed before anything else
    pub args: Vec<String>,
    /// Environment variables copied from the parent (everything else is cleared)
    pub env_allowlist: Vec<String>,
    pub viewport: Viewport,
    /// Completion marker the documents signal with
    pub marker: String,
    /// Fallback settle window
    pub settle: Duration,
    pub root_selector: String,
    pub strip_styles: bool,
    /// Grace between SIGTERM and SIGKILL
    pub termination_grace: Duration,
    /// Stdout a child may produce before it is treated as crashed
    pub max_record_bytes: usize,
}

impl SandboxConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            viewport: Viewport::default(),
            marker: DEFAULT_COMPLETION_MARKER.to_string(),
            settle: DEFAULT_SETTLE_DURATION,
            root_selector: DEFAULT_ROOT_SELECTOR.to_string(),
            strip_styles: true,
            termination_grace: GRACEFUL_TERMINATION_TIMEOUT,
            max_record_bytes: MAX_RECORD_BYTES,
        }
    }
}

/// Sandbox that runs every render in a fresh child process
pub struct ProcessSandbox {
    config: SandboxConfig,
}

/// How the wait for the child ended
enum WaitOutcome {
    Reported(ResultRecord),
    Exited(std::io::Result<ExitStatus>),
    Overflow,
    TimedOut,
    Cancelled,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Filter environment variables to the allowlist only
    fn filter_env<I>(&self, env: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        env.into_iter()
            .filter(|(k, _)| self.config.env_allowlist.contains(k))
            .collect()
    }

    /// Budget the child gets, leaving it room to report `timed_out` itself
    fn child_budget(timeout: Duration) -> Duration {
        timeout
            .saturating_sub(CHILD_REPORT_MARGIN)
            .max(timeout / 2)
    }

    fn job_spec(&self, document: &str, timeout: Duration) -> RenderJobSpec {
        RenderJobSpec {
            document: document.to_string(),
            viewport: self.config.viewport,
            marker: self.config.marker.clone(),
            timeout_ms: Self::child_budget(timeout).as_millis() as u64,
            settle_ms: self.config.settle.as_millis() as u64,
            root_selector: self.config.root_selector.clone(),
            strip_styles: self.config.strip_styles,
        }
    }

    fn spawn(&self) -> std::io::Result<Child> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so teardown reaches the browser as well
        #[cfg(unix)]
        {
            command.process_group(0);
        }

        command.spawn()
    }

    /// Kill the child with SIGTERM first, then SIGKILL, and reap it
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                use nix::sys::signal::{killpg, Signal};
                use nix::unistd::Pid;

                let group = Pid::from_raw(pid as i32);

                info!(pid = %pid, "Sending SIGTERM to sandbox process group");
                if let Err(e) = killpg(group, Signal::SIGTERM) {
                    warn!(pid = %pid, error = %e, "SIGTERM failed");
                }

                match timeout(self.config.termination_grace, child.wait()).await {
                    Ok(_) => info!(pid = %pid, "Sandbox exited after SIGTERM"),
                    Err(_) => warn!(pid = %pid, "Sandbox did not exit after SIGTERM, sending SIGKILL"),
                }
            }
        }

        if let Err(e) = child.start_kill() {
            debug!(error = %e, "Sandbox already exited");
        }
        if let Err(e) = child.wait().await {
            warn!(error = %e, "Failed to reap sandbox process");
        }
    }

    /// Terminate a child that never reported; returns its diagnostics
    async fn tear_down(
        &self,
        child: &mut Child,
        pid: Option<u32>,
        handoff: Option<JoinHandle<()>>,
        stderr_task: JoinHandle<String>,
    ) -> String {
        self.terminate(child).await;
        kill_stragglers(pid);
        abort_handoff(handoff);
        collect(stderr_task).await
    }

    /// Run one child until it reports, exits, times out or is cancelled
    async fn run_child(
        &self,
        document: &str,
        timeout_budget: Duration,
        mut cancel: CancelToken,
        phase: &mut PhaseTracker,
    ) -> Result<String, SandboxError> {
        let started = Instant::now();

        let spec = serde_json::to_vec(&self.job_spec(document, timeout_budget)).map_err(|e| {
            phase.advance(SandboxPhase::RenderCrashed);
            SandboxError::Spawn(format!("failed to encode job spec: {}", e))
        })?;

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(e) => {
                phase.advance(SandboxPhase::RenderCrashed);
                return Err(SandboxError::Spawn(format!(
                    "{}: {}",
                    self.config.program.display(),
                    e
                )));
            }
        };
        phase.advance(SandboxPhase::Spawned);
        let pid = child.id();
        info!(
            pid = ?pid,
            program = %self.config.program.display(),
            timeout_ms = timeout_budget.as_millis() as u64,
            "Sandbox spawned"
        );

        let mut records = RecordReader::new(child.stdout.take(), self.config.max_record_bytes);
        let stderr_task = spawn_reader(child.stderr.take(), DIAGNOSTICS_TAIL_BYTES);

        // A child that dies before reading shows up as a crash below
        let handoff = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&spec).await {
                    warn!(error = %e, "Failed to hand job spec to sandbox");
                }
                let _ = stdin.shutdown().await;
            })
        });
        phase.advance(SandboxPhase::AwaitingSignal);

        let expiry = tokio::time::sleep(timeout_budget);
        tokio::pin!(expiry);
        let mut stdout_open = true;

        let outcome = loop {
            tokio::select! {
                biased;
                event = records.next_event(), if stdout_open => match event {
                    StdoutEvent::Record(record) => break WaitOutcome::Reported(record),
                    StdoutEvent::Overflow => break WaitOutcome::Overflow,
                    // Keep waiting for the exit status
                    StdoutEvent::Closed(_) => stdout_open = false,
                },
                status = child.wait() => break WaitOutcome::Exited(status),
                _ = &mut expiry => break WaitOutcome::TimedOut,
                _ = cancel.cancelled() => break WaitOutcome::Cancelled,
            }
        };

        // Settle the child and work out which record (if any) counts
        let (status, event) = match outcome {
            WaitOutcome::Reported(record) => {
                let status = match timeout(RECORD_EXIT_GRACE, child.wait()).await {
                    Ok(Ok(status)) => Some(status),
                    _ => {
                        debug!(pid = ?pid, "Sandbox still running after its record, tearing down");
                        self.terminate(&mut child).await;
                        None
                    }
                };
                (status, StdoutEvent::Record(record))
            }
            WaitOutcome::Exited(Ok(status)) => {
                let event = match timeout(OUTPUT_DRAIN_TIMEOUT, records.next_event()).await {
                    Ok(event) => event,
                    Err(_) => {
                        warn!("Sandbox output pipe still open after exit, abandoning it");
                        records.abandon()
                    }
                };
                (Some(status), event)
            }
            WaitOutcome::Exited(Err(e)) => {
                let diagnostics = self.tear_down(&mut child, pid, handoff, stderr_task).await;
                phase.advance(SandboxPhase::RenderCrashed);
                return Err(SandboxError::Crashed {
                    exit_code: None,
                    reason: format!("failed to wait for sandbox: {}", e),
                    diagnostics,
                });
            }
            WaitOutcome::Overflow => {
                self.terminate(&mut child).await;
                (None, StdoutEvent::Overflow)
            }
            WaitOutcome::TimedOut => {
                self.tear_down(&mut child, pid, handoff, stderr_task).await;
                phase.advance(SandboxPhase::RenderTimeout);
                return Err(SandboxError::Timeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            WaitOutcome::Cancelled => {
                self.tear_down(&mut child, pid, handoff, stderr_task).await;
                phase.advance(SandboxPhase::RenderTimeout);
                return Err(SandboxError::Cancelled);
            }
        };

        kill_stragglers(pid);
        abort_handoff(handoff);
        let diagnostics = collect(stderr_task).await;

        let result = interpret_report(event, status, self.config.max_record_bytes, diagnostics);
        phase.advance(match &result {
            Ok(_) => SandboxPhase::Extracted,
            Err(SandboxError::Timeout { .. }) => SandboxPhase::RenderTimeout,
            Err(_) => SandboxPhase::RenderCrashed,
        });
        result
    }
}

fn abort_handoff(handoff: Option<JoinHandle<()>>) {
    if let Some(handoff) = handoff {
        handoff.abort();
    }
}

/// Map what the child reported to the sandbox result
///
/// `status` is the child's own exit status; `None` when the parent had to
/// tear it down after it reported.
fn interpret_report(
    event: StdoutEvent,
    status: Option<ExitStatus>,
    record_limit: usize,
    diagnostics: String,
) -> Result<String, SandboxError> {
    let exit_code = status.and_then(|s| s.code());

    let record = match event {
        StdoutEvent::Record(record) => Ok(record),
        StdoutEvent::Closed(last_line) => {
            ResultRecord::parse_output(last_line.as_deref().unwrap_or_default())
        }
        StdoutEvent::Overflow => {
            return Err(SandboxError::Crashed {
                exit_code,
                reason: format!("result record exceeds {} bytes", record_limit),
                diagnostics,
            })
        }
    };

    if let Some(status) = status.filter(|s| !s.success()) {
        let reason = match record {
            Ok(ResultRecord::Failed { error }) => error,
            _ => describe_abnormal_exit(status),
        };
        return Err(SandboxError::Crashed {
            exit_code,
            reason,
            diagnostics,
        });
    }

    match record {
        Ok(ResultRecord::Extracted { payload }) => Ok(payload),
        Ok(ResultRecord::TimedOut { waited_ms }) => Err(SandboxError::Timeout { waited_ms }),
        Ok(ResultRecord::Failed { error }) => Err(SandboxError::Crashed {
            exit_code,
            reason: error,
            diagnostics,
        }),
        Err(e) => Err(SandboxError::Crashed {
            exit_code,
            reason: e.to_string(),
            diagnostics,
        }),
    }
}

/// SIGKILL whatever is left in the child's process group (browser helpers)
fn kill_stragglers(pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = pid {
            // ESRCH: the group is already gone
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

fn describe_abnormal_exit(status: ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("child killed by signal {}", signal);
        }
    }
    format!("child exited with {}", status)
}

/// Read a pipe to the end, keeping at most the last `limit` bytes
fn spawn_reader<R>(pipe: Option<R>, limit: usize) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return String::new();
        };
        let mut kept: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    kept.extend_from_slice(&chunk[..n]);
                    if kept.len() > limit {
                        let excess = kept.len() - limit;
                        kept.drain(..excess);
                    }
                }
            }
        }
        String::from_utf8_lossy(&kept).into_owned()
    })
}

/// Output of a reader; pipes still held open by stray processes are abandoned
async fn collect(mut reader: JoinHandle<String>) -> String {
    match timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader).await {
        Ok(Ok(text)) => text,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            reader.abort();
            warn!("Sandbox output pipe still open after exit, abandoning it");
            String::new()
        }
    }
}

/// What the child's stdout produced
enum StdoutEvent {
    Record(ResultRecord),
    /// Pipe closed without a record; carries the last non-empty line
    Closed(Option<String>),
    Overflow,
}

/// Scans child stdout line by line for the first parseable result record
///
/// Browser chatter before the record is skipped. `next_event` is cancel
/// safe: partial lines stay buffered between calls.
struct RecordReader<R> {
    pipe: Option<R>,
    pending: Vec<u8>,
    last_line: Option<String>,
    total: usize,
    limit: usize,
}

impl<R: AsyncRead + Unpin> RecordReader<R> {
    fn new(pipe: Option<R>, limit: usize) -> Self {
        Self {
            pipe,
            pending: Vec::new(),
            last_line: None,
            total: 0,
            limit,
        }
    }

    async fn next_event(&mut self) -> StdoutEvent {
        let mut chunk = [0u8; 8192];
        loop {
            if let Some(record) = self.complete_lines() {
                return StdoutEvent::Record(record);
            }
            let Some(pipe) = self.pipe.as_mut() else {
                return StdoutEvent::Closed(self.last_line.clone());
            };
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => {
                    self.pipe = None;
                    let rest = std::mem::take(&mut self.pending);
                    if let Some(record) = self.consider(&rest) {
                        return StdoutEvent::Record(record);
                    }
                }
                Ok(n) => {
                    self.total += n;
                    if self.total > self.limit {
                        self.pipe = None;
                        self.pending.clear();
                        return StdoutEvent::Overflow;
                    }
                    self.pending.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    /// Stop reading a pipe some stray process still holds open
    fn abandon(&mut self) -> StdoutEvent {
        self.pipe = None;
        let rest = std::mem::take(&mut self.pending);
        match self.consider(&rest) {
            Some(record) => StdoutEvent::Record(record),
            None => StdoutEvent::Closed(self.last_line.clone()),
        }
    }

    fn complete_lines(&mut self) -> Option<ResultRecord> {
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            if let Some(record) = self.consider(&line) {
                return Some(record);
            }
        }
        None
    }

    fn consider(&mut self, line: &[u8]) -> Option<ResultRecord> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match serde_json::from_str(text) {
            Ok(record) => Some(record),
            Err(_) => {
                self.last_line = Some(text.to_string());
                None
            }
        }
    }
}

/// Per-job lifecycle, logged as it advances
struct PhaseTracker {
    phase: SandboxPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            phase: SandboxPhase::Pending,
        }
    }

    fn advance(&mut self, to: SandboxPhase) {
        match self.phase.transition(to) {
            Ok(next) => {
                debug!(from = %self.phase, to = %next, "Sandbox phase");
                self.phase = next;
            }
            Err(e) => warn!(error = %e, "Unexpected sandbox phase transition"),
        }
    }
}

#[async_trait]
impl RenderSandbox for ProcessSandbox {
    async fn extract(
        &self,
        document: &str,
        timeout: Duration,
        cancel: CancelToken,
    ) -> Result<String, SandboxError> {
        let started = Instant::now();
        let mut phase = PhaseTracker::new();

        let result = self.run_child(document, timeout, cancel, &mut phase).await;

        info!(
            phase = %phase.phase,
            duration_ms = started.elapsed().as_millis() as u64,
            "Sandbox finished"
        );
        result
    }
}
