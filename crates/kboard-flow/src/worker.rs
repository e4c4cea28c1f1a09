//! External worker invocation.
//!
//! Each pipeline stage runs as an isolated child process (the collector and
//! Best-K scripts). The contract with a worker:
//!
//! - it reads one JSON document from stdin (absent for the simple
//!   collectors), then stdin is closed;
//! - it writes human-readable progress lines containing a bracketed
//!   `[current/total]` marker to stdout/stderr;
//! - on completion it writes a single JSON report to stdout and exits 0 on
//!   success, non-zero otherwise.
//!
//! Output is consumed line-by-line as it streams so very long-running
//! workers never accumulate unbounded buffers on the error side; stdout is
//! kept whole because the final report must be parsed from it.
//!
//! There is no cooperative cancellation: on timeout the child is killed
//! outright and the invocation is reported as a failure.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use kboard_core::Error as CoreError;

use crate::error::{Error, Result};
use crate::progress::ProgressTracker;

/// Maximum stderr retained for diagnostics, in bytes.
const STDERR_EXCERPT_BYTES: usize = 4096;

/// Specification of one external worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// Program to execute (e.g. `python3`).
    pub program: String,
    /// Arguments, typically the script path.
    pub args: Vec<String>,
    /// Worker name used in logs and errors.
    pub label: String,
    /// Wall-clock timeout for the whole invocation.
    pub timeout: Duration,
    /// Expected item total, used to seed the progress tracker until the
    /// worker's first marker arrives.
    pub expected_total: u64,
}

impl WorkerCommand {
    /// Creates a command running `program script` with the given label.
    #[must_use]
    pub fn new(
        program: impl Into<String>,
        script: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args: vec![script.into()],
            label: label.into(),
            timeout: Duration::from_secs(600),
            expected_total: 200,
        }
    }

    /// Sets the wall-clock timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the expected item total.
    #[must_use]
    pub fn with_expected_total(mut self, expected_total: u64) -> Self {
        self.expected_total = expected_total;
        self
    }
}

/// Final JSON report a worker writes to stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Whether the worker considers the run successful.
    pub success: bool,
    /// Optional structured result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Runs one worker to completion.
///
/// Writes `payload` (if any) to the child's stdin, streams stdout/stderr
/// through the progress tracker, and maps the outcome:
///
/// - exit 0 with parseable stdout → `Ok(WorkerReport)`
/// - exit 0 with unparseable stdout → [`Error::MalformedOutput`]
/// - non-zero exit → [`Error::WorkerExit`] with a stderr excerpt
/// - spawn failure → [`Error::Spawn`]
/// - deadline exceeded → child killed, [`Error::Timeout`]
///
/// # Errors
///
/// See the outcome mapping above.
pub async fn invoke(
    command: &WorkerCommand,
    payload: Option<&Value>,
    tracker: &ProgressTracker,
) -> Result<WorkerReport> {
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::Spawn {
            worker: command.label.clone(),
            source,
        })?;

    write_payload(&mut child, payload, &command.label).await?;

    let stdout = child.stdout.take().ok_or_else(|| {
        CoreError::internal(format!("worker {}: stdout not captured", command.label))
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        CoreError::internal(format!("worker {}: stderr not captured", command.label))
    })?;

    let streamed = async {
        let collect_stdout = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut buf = String::new();
            while let Some(line) = lines.next_line().await.map_err(|e| {
                CoreError::internal(format!("worker {} stdout read: {e}", command.label))
            })? {
                tracker.observe_line(&line);
                buf.push_str(&line);
                buf.push('\n');
            }
            Ok::<String, Error>(buf)
        };

        let collect_stderr = async {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = String::new();
            while let Some(line) = lines.next_line().await.map_err(|e| {
                CoreError::internal(format!("worker {} stderr read: {e}", command.label))
            })? {
                tracker.observe_line(&line);
                push_bounded(&mut tail, &line, STDERR_EXCERPT_BYTES);
            }
            Ok::<String, Error>(tail)
        };

        let (out, err) = tokio::try_join!(collect_stdout, collect_stderr)?;
        let status = child.wait().await.map_err(|e| {
            CoreError::internal(format!("worker {} wait: {e}", command.label))
        })?;
        Ok::<_, Error>((status, out, err))
    };

    // Awaited into a variable so the streaming future (and its borrow of
    // the child) is dropped before the timeout arm touches the child again.
    let outcome = tokio::time::timeout(command.timeout, streamed).await;
    let (status, stdout_text, stderr_excerpt) = match outcome {
        Ok(result) => result?,
        Err(_elapsed) => {
            // Forceful termination only; the worker gets no signal to
            // clean up, so a timeout is always a failure outcome.
            child.start_kill().ok();
            child.wait().await.ok();
            tracing::warn!(
                worker = %command.label,
                timeout_secs = command.timeout.as_secs(),
                "worker killed after timeout"
            );
            return Err(Error::Timeout {
                worker: command.label.clone(),
                seconds: command.timeout.as_secs(),
            });
        }
    };

    if !status.success() {
        return Err(Error::WorkerExit {
            worker: command.label.clone(),
            code: status.code(),
            stderr: stderr_excerpt,
        });
    }

    serde_json::from_str(stdout_text.trim()).map_err(|e| Error::MalformedOutput {
        worker: command.label.clone(),
        message: e.to_string(),
    })
}

async fn write_payload(child: &mut Child, payload: Option<&Value>, label: &str) -> Result<()> {
    // Taking stdin drops it at scope end, closing the stream so the worker
    // sees EOF even when there is no payload.
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| CoreError::internal(format!("worker {label}: stdin not captured")))?;

    if let Some(payload) = payload {
        let body = serde_json::to_vec(payload)
            .map_err(|e| CoreError::serialization(format!("worker {label} payload: {e}")))?;
        stdin
            .write_all(&body)
            .await
            .map_err(|e| CoreError::internal(format!("worker {label} stdin write: {e}")))?;
    }
    stdin
        .shutdown()
        .await
        .map_err(|e| CoreError::internal(format!("worker {label} stdin close: {e}")))?;
    Ok(())
}

/// Appends a line to `buf`, keeping only the trailing `cap` bytes.
fn push_bounded(buf: &mut String, line: &str, cap: usize) {
    buf.push_str(line);
    buf.push('\n');
    if buf.len() > cap {
        let cut = buf.len() - cap;
        // Find a char boundary at or after the cut point.
        let boundary = (cut..buf.len())
            .find(|i| buf.is_char_boundary(*i))
            .unwrap_or(buf.len());
        buf.drain(..boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            label: "test-worker".to_string(),
            timeout: Duration::from_secs(10),
            expected_total: 10,
        }
    }

    #[tokio::test]
    async fn successful_worker_returns_parsed_report() {
        let tracker = ProgressTracker::new();
        tracker.reset(10);

        let report = invoke(
            &sh(r#"echo '{"success": true, "message": "done"}'"#),
            None,
            &tracker,
        )
        .await
        .unwrap();

        assert!(report.success);
        assert_eq!(report.message.as_deref(), Some("done"));
        // Tracker untouched by non-marker lines.
        assert_eq!(tracker.snapshot().current, 0);
    }

    #[tokio::test]
    async fn progress_markers_from_both_streams_update_tracker() {
        let tracker = ProgressTracker::new();
        tracker.reset(200);

        invoke(
            &sh(
                r#"echo '[10/200] first' >&2; echo '[200/200] last' >&2; echo '{"success": true}'"#,
            ),
            None,
            &tracker,
        )
        .await
        .unwrap();

        let snap = tracker.snapshot();
        assert_eq!(snap.current, 200);
        assert_eq!(snap.percent, 100);
    }

    #[tokio::test]
    async fn nonzero_exit_maps_to_worker_exit_with_stderr() {
        let tracker = ProgressTracker::new();
        let err = invoke(&sh("echo 'boom' >&2; exit 3"), None, &tracker)
            .await
            .unwrap_err();

        match err {
            Error::WorkerExit {
                code, ref stderr, ..
            } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected WorkerExit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn killed_style_exit_code_is_preserved() {
        let tracker = ProgressTracker::new();
        let err = invoke(&sh("exit 137"), None, &tracker).await.unwrap_err();
        assert!(matches!(err, Error::WorkerExit { code: Some(137), .. }));
    }

    #[tokio::test]
    async fn clean_exit_with_garbage_stdout_is_malformed_output() {
        let tracker = ProgressTracker::new();
        let err = invoke(&sh("echo 'not json at all'"), None, &tracker)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let tracker = ProgressTracker::new();
        let cmd = WorkerCommand::new("kboard-no-such-binary", "x.py", "ghost");
        let err = invoke(&cmd, None, &tracker).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn timeout_kills_the_worker() {
        let tracker = ProgressTracker::new();
        let cmd = sh("sleep 30").with_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = invoke(&cmd, None, &tracker).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn payload_is_delivered_on_stdin() {
        let tracker = ProgressTracker::new();
        let payload = serde_json::json!({"period": "week_1"});

        // The stub echoes stdin back inside the report's data field.
        let report = invoke(
            &sh(r#"input=$(cat); printf '{"success": true, "data": %s}' "$input""#),
            Some(&payload),
            &tracker,
        )
        .await
        .unwrap();

        assert_eq!(report.data, Some(payload));
    }

    #[test]
    fn bounded_push_keeps_the_tail() {
        let mut buf = String::new();
        for i in 0..100 {
            push_bounded(&mut buf, &format!("line {i}"), 64);
        }
        assert!(buf.len() <= 64);
        assert!(buf.contains("line 99"));
        assert!(!buf.contains("line 1\n"));
    }
}
