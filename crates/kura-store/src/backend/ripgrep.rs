//! Ripgrep fast path for disk grep.
//!
//! [`RipgrepSearcher::search`] either returns every match or says why it
//! could not. The disk backend treats any [`FallbackReason`] as "use the
//! in-process scan instead"; callers never see it.
//!
//! The search runs from the search root over `.` with hidden, ignored, and
//! binary files included, so a glob containing `/` is relative to the
//! search root and the file set is the one the in-process scan walks.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::runtime::{Builder, Handle};

use crate::constants::DEFAULT_GREP_TIMEOUT_SECS;
use crate::types::GrepMatch;

/// Why the fast path was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackReason {
    /// The executable could not be found.
    #[error("ripgrep not found")]
    ToolMissing,

    /// Exit status other than 0 (matches) or 1 (no matches).
    #[error("ripgrep exited unexpectedly (code {0:?})")]
    UnexpectedExit(Option<i32>),

    /// The search ran past its deadline and was killed.
    #[error("ripgrep timed out after {0:?}")]
    TimedOut(Duration),

    /// Spawning or talking to the process failed.
    #[error("ripgrep i/o error: {0}")]
    Io(String),
}

/// Runs `rg --json -F` with a deadline.
#[derive(Debug, Clone)]
pub struct RipgrepSearcher {
    program: PathBuf,
    timeout: Duration,
}

impl Default for RipgrepSearcher {
    fn default() -> Self {
        Self::new("rg", Duration::from_secs(DEFAULT_GREP_TIMEOUT_SECS))
    }
}

impl RipgrepSearcher {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Search the directory `root` for the literal `pattern`.
    ///
    /// Files over `max_filesize` bytes are skipped. Returned paths are
    /// `root` joined with the file's path relative to it.
    pub async fn search(
        &self,
        pattern: &str,
        root: &Path,
        glob: Option<&str>,
        max_filesize: Option<u64>,
    ) -> Result<Vec<GrepMatch>, FallbackReason> {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "--json",
            "--fixed-strings",
            "--hidden",
            "--no-ignore",
            "--no-config",
            "--text",
        ]);
        if let Some(glob) = glob {
            cmd.arg("--glob").arg(glob);
        }
        if let Some(max) = max_filesize {
            cmd.arg("--max-filesize").arg(max.to_string());
        }
        cmd.arg("--")
            .arg(pattern)
            .arg(".")
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FallbackReason::ToolMissing,
            _ => FallbackReason::Io(e.to_string()),
        })?;

        // Dropping the child on timeout kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(FallbackReason::Io(e.to_string())),
            Err(_) => return Err(FallbackReason::TimedOut(self.timeout)),
        };

        match output.status.code() {
            Some(0) | Some(1) => {
                let mut matches = parse_json_lines(&String::from_utf8_lossy(&output.stdout));
                for m in &mut matches {
                    let rel = m.path.strip_prefix("./").unwrap_or(&m.path);
                    m.path = root.join(rel).to_string_lossy().into_owned();
                }
                Ok(matches)
            }
            code => Err(FallbackReason::UnexpectedExit(code)),
        }
    }

    /// [`search`](Self::search) for synchronous callers.
    ///
    /// On a runtime's blocking pool the surrounding runtime drives the
    /// child process; with no runtime a single-threaded one is built for
    /// the call. Must not be called from inside an async task.
    pub fn search_blocking(
        &self,
        pattern: &str,
        root: &Path,
        glob: Option<&str>,
        max_filesize: Option<u64>,
    ) -> Result<Vec<GrepMatch>, FallbackReason> {
        let search = self.search(pattern, root, glob, max_filesize);
        match Handle::try_current() {
            Ok(handle) => handle.block_on(search),
            Err(_) => Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| FallbackReason::Io(e.to_string()))?
                .block_on(search),
        }
    }
}

#[derive(Deserialize)]
struct Message {
    #[serde(rename = "type")]
    kind: String,
    data: Option<MatchData>,
}

#[derive(Deserialize)]
struct MatchData {
    path: Text,
    lines: Text,
    line_number: Option<usize>,
}

/// Ripgrep emits `{"text": ...}` for UTF-8 data and `{"bytes": ...}` otherwise.
#[derive(Deserialize)]
struct Text {
    text: Option<String>,
}

/// Extract `match` events from ripgrep's JSON Lines output.
///
/// Non-UTF-8 paths or lines and malformed records are skipped.
pub fn parse_json_lines(output: &str) -> Vec<GrepMatch> {
    output
        .lines()
        .filter_map(|line| serde_json::from_str::<Message>(line).ok())
        .filter(|msg| msg.kind == "match")
        .filter_map(|msg| {
            let data = msg.data?;
            let path = data.path.text?;
            let text = data.lines.text?;
            let text = text.strip_suffix('\n').unwrap_or(&text);
            let text = text.strip_suffix('\r').unwrap_or(text);
            Some(GrepMatch::new(path, data.line_number?, text))
        })
        .collect()
}
