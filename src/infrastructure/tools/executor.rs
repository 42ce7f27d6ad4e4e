//! # Host Executor
//!
//! Process and filesystem calls against the host.
//! Paths arrive already resolved and checked against the working root;
//! this layer only performs the call and captures what happened.

use crate::domain::config::ExecutionConfig;
use crate::domain::types::ExecutionFailure;
use regex::{Regex, RegexBuilder};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use walkdir::{DirEntry, WalkDir};

const SNIFF_BYTES: usize = 512;
const MAX_SIMILAR: usize = 5;

/// Raw outcome of one host call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
    pub failure: Option<ExecutionFailure>,
}

impl HostOutput {
    fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_status: Some(0),
            ..Default::default()
        }
    }

    fn failed(failure: ExecutionFailure, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            failure: Some(failure),
            ..Default::default()
        }
    }
}

/// Executes host calls with the configured limits.
#[derive(Debug, Clone)]
pub struct HostExecutor {
    cwd: PathBuf,
    timeout: Duration,
    search_depth: usize,
    max_search_results: usize,
}

impl HostExecutor {
    pub fn new(cwd: impl Into<PathBuf>, config: &ExecutionConfig) -> Self {
        Self {
            cwd: cwd.into(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            search_depth: config.search_depth,
            max_search_results: config.max_search_results.max(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs a shell command in the working directory.
    ///
    /// A non-zero exit is a failed output, not an error. On unix the shell
    /// leads its own process group, and a timeout kills the whole group.
    pub async fn run_shell(&self, command: &str) -> HostOutput {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = tokio::process::Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = tokio::process::Command::new("sh");
            c.args(["-c", command]);
            c
        };

        cmd.current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to spawn shell for `{}`: {}", command, e);
                return HostOutput::failed(ExecutionFailure::Io(e.to_string()), e.to_string());
            }
        };

        let pid = child.id();
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return HostOutput::failed(ExecutionFailure::Io(e.to_string()), e.to_string());
            }
            Err(_) => {
                tracing::warn!("Command timed out after {:?}: {}", self.timeout, command);
                #[cfg(unix)]
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                return HostOutput::failed(
                    ExecutionFailure::TimedOut {
                        after: self.timeout,
                    },
                    format!("killed after {}s", self.timeout.as_secs()),
                );
            }
        };

        let exit_status = output.status.code();
        HostOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_status,
            failure: (!output.status.success())
                .then_some(ExecutionFailure::ExitStatus(exit_status)),
        }
    }

    /// Starts an application without waiting for it.
    pub fn launch(&self, app: &str) -> HostOutput {
        let spawned = tokio::process::Command::new(app)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => {
                let pid = child.id().map(|p| p.to_string()).unwrap_or_else(|| "?".into());
                tracing::info!("Launched {} (pid {})", app, pid);
                HostOutput::ok(format!("Launched {app} (pid {pid})"))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => HostOutput::failed(
                ExecutionFailure::NotFound(app.to_string()),
                format!("{app}: command not found"),
            ),
            Err(e) => HostOutput::failed(ExecutionFailure::Io(e.to_string()), e.to_string()),
        }
    }

    /// Reports whether `path` exists and what it is. `shown` is the name used in messages.
    pub async fn describe_path(&self, path: &Path, shown: &str) -> HostOutput {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let mut stderr = format!("{shown}: no such file or directory");
                let similar = similar_files(path);
                if !similar.is_empty() {
                    stderr.push_str(&format!("\nSimilar files: {}", similar.join(", ")));
                }
                return HostOutput::failed(ExecutionFailure::NotFound(shown.to_string()), stderr);
            }
            Err(e) => return HostOutput::failed(ExecutionFailure::Io(e.to_string()), e.to_string()),
        };

        if metadata.is_dir() {
            return HostOutput::ok(format!("{shown}: directory ({})", path.display()));
        }

        let kind = if looks_like_text(path).await { "text" } else { "binary" };
        HostOutput::ok(format!(
            "{shown}: {kind} file, {} bytes ({})",
            metadata.len(),
            path.display()
        ))
    }

    /// Lists a directory as `name [DIR]` / `name [FILE]` lines, sorted by name.
    pub async fn list_dir(&self, path: &Path) -> HostOutput {
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let shown = path.display().to_string();
                return HostOutput::failed(
                    ExecutionFailure::NotFound(shown.clone()),
                    format!("{shown}: no such directory"),
                );
            }
            Err(e) => return HostOutput::failed(ExecutionFailure::Io(e.to_string()), e.to_string()),
        };

        let mut lines = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    let file_type = if is_dir { "DIR" } else { "FILE" };
                    lines.push(format!("{} [{}]", name, file_type));
                }
                Ok(None) => break,
                Err(e) => {
                    return HostOutput::failed(ExecutionFailure::Io(e.to_string()), e.to_string());
                }
            }
        }
        lines.sort();
        HostOutput::ok(lines.join("\n"))
    }

    /// Searches below `base` for directories whose name contains `query`
    /// (case-insensitive). Hidden directories and `venv` are not entered.
    pub async fn find_dirs(&self, base: &Path, query: &str) -> HostOutput {
        let needle = query.to_lowercase();
        let found = self
            .search(base, move |e| {
                e.file_type().is_dir()
                    && e.file_name().to_string_lossy().to_lowercase().contains(&needle)
            })
            .await;
        match found {
            Ok(paths) => {
                let missing = format!("No directories matching '{query}' under {}", base.display());
                found_or_missing(paths, query, missing)
            }
            Err(output) => output,
        }
    }

    /// Searches below `base` for files whose name matches `pattern`, with the
    /// same depth, result limit and skipped directories as [`Self::find_dirs`].
    pub async fn find_files(&self, base: &Path, pattern: &NamePattern) -> HostOutput {
        let matcher = pattern.clone();
        let found = self
            .search(base, move |e| {
                !e.file_type().is_dir() && matcher.matches(&e.file_name().to_string_lossy())
            })
            .await;
        match found {
            Ok(paths) => {
                let missing = format!(
                    "No files matching '{}' under {}",
                    pattern.as_str(),
                    base.display()
                );
                found_or_missing(paths, pattern.as_str(), missing)
            }
            Err(output) => output,
        }
    }

    /// Walks `base` on the blocking pool and collects the matching paths.
    async fn search<F>(&self, base: &Path, matches: F) -> Result<Vec<String>, HostOutput>
    where
        F: Fn(&DirEntry) -> bool + Send + 'static,
    {
        if !tokio::fs::metadata(base).await.map(|m| m.is_dir()).unwrap_or(false) {
            let shown = base.display().to_string();
            return Err(HostOutput::failed(
                ExecutionFailure::NotFound(shown.clone()),
                format!("{shown}: no such directory"),
            ));
        }

        let base = base.to_path_buf();
        let depth = self.search_depth.max(1);
        let limit = self.max_search_results;
        tokio::task::spawn_blocking(move || {
            visible_entries(&base, depth)
                .filter(|e| matches(e))
                .take(limit)
                .map(|e| e.path().display().to_string())
                .collect()
        })
        .await
        .map_err(|e| HostOutput::failed(ExecutionFailure::Io(e.to_string()), e.to_string()))
    }
}

/// File-name pattern for [`HostExecutor::find_files`].
///
/// With `*` or `?` the whole name must match the glob; otherwise the pattern
/// matches as a substring.
#[derive(Debug, Clone)]
pub struct NamePattern {
    raw: String,
    regex: Regex,
}

impl NamePattern {
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let body = if pattern.contains(['*', '?']) {
            let mut re = String::from("^");
            for c in pattern.chars() {
                match c {
                    '*' => re.push_str(".*"),
                    '?' => re.push('.'),
                    other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
                }
            }
            re.push('$');
            re
        } else {
            regex::escape(pattern)
        };
        let regex = RegexBuilder::new(&body)
            .case_insensitive(case_insensitive)
            .build()?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Entries below `base` up to `depth`, without descending into hidden directories or `venv`.
fn visible_entries(base: &Path, depth: usize) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(base)
        .min_depth(1)
        .max_depth(depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0 || !(e.file_type().is_dir() && (name.starts_with('.') || name == "venv"))
        })
        .filter_map(|e| e.ok())
}

fn found_or_missing(paths: Vec<String>, query: &str, missing: String) -> HostOutput {
    if paths.is_empty() {
        return HostOutput {
            stderr: missing,
            exit_status: Some(1),
            failure: Some(ExecutionFailure::NotFound(query.to_string())),
            ..Default::default()
        };
    }
    HostOutput::ok(paths.join("\n"))
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    // The shell was started with process_group(0), so its pid is the group id.
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!("killpg({}) failed: {}", pgid, std::io::Error::last_os_error());
    }
}

/// Heuristic: no NUL byte in the first block.
async fn looks_like_text(path: &Path) -> bool {
    use tokio::io::AsyncReadExt;

    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut buf = [0u8; SNIFF_BYTES];
    match file.read(&mut buf).await {
        Ok(n) => !buf[..n].contains(&0),
        Err(_) => false,
    }
}

/// Files next to a missing path whose stem overlaps with the requested one.
fn similar_files(missing: &Path) -> Vec<String> {
    let (Some(dir), Some(stem)) = (missing.parent(), missing.file_stem()) else {
        return Vec::new();
    };
    let stem = stem.to_string_lossy().to_lowercase();
    if stem.is_empty() {
        return Vec::new();
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| {
            let candidate = Path::new(name)
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            !candidate.is_empty() && (candidate.contains(&stem) || stem.contains(&candidate))
        })
        .collect();
    names.sort();
    names.truncate(MAX_SIMILAR);
    names
}
