//! External tool bridge
//!
//! Runs command-line tools (Tesseract) as child processes with a per-call
//! timeout. Image data is piped through stdin so no temporary files are needed.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Poll interval while waiting for a child
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Tool bridge error types
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Process failed: {0}")]
    ProcessFailed(String),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retry count
    pub max_retries: u32,
    /// Retry interval
    pub retry_interval: Duration,
    /// Use exponential backoff
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_interval: Duration::from_millis(500),
            exponential_backoff: true,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.exponential_backoff {
            self.retry_interval * 2_u32.saturating_pow(attempt)
        } else {
            self.retry_interval
        }
    }
}

/// Tool bridge configuration
#[derive(Debug, Clone)]
pub struct ToolBridgeConfig {
    /// Executable name or path
    pub program: PathBuf,
    /// Per-call timeout
    pub timeout: Duration,
    /// Retry configuration
    pub retry_config: RetryConfig,
}

impl Default for ToolBridgeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tesseract"),
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
        }
    }
}

impl ToolBridgeConfig {
    pub fn builder() -> ToolBridgeConfigBuilder {
        ToolBridgeConfigBuilder::default()
    }
}

/// Builder for [`ToolBridgeConfig`]
#[derive(Debug, Default)]
pub struct ToolBridgeConfigBuilder {
    config: ToolBridgeConfig,
}

impl ToolBridgeConfigBuilder {
    #[must_use]
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.program = program.into();
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, count: u32) -> Self {
        self.config.retry_config.max_retries = count;
        self
    }

    #[must_use]
    pub fn build(self) -> ToolBridgeConfig {
        self.config
    }
}

/// Captured output of a finished child
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Subprocess-based bridge
#[derive(Debug, Clone)]
pub struct ToolBridge {
    config: ToolBridgeConfig,
}

impl ToolBridge {
    pub fn new(config: ToolBridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolBridgeConfig {
        &self.config
    }

    /// First line of `<program> --version`, if it runs
    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.config.program)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .ok()?;
        // Tesseract has printed its version on stderr in some releases
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        text.lines().next().map(|l| l.trim().to_string())
    }

    /// Run the tool, retrying failed attempts per the retry config
    ///
    /// Timeouts are never retried.
    pub fn run(&self, args: &[String], stdin: Option<&[u8]>) -> Result<ToolOutput> {
        let retry = &self.config.retry_config;
        let mut attempt = 0;
        loop {
            match self.run_once(args, stdin) {
                Err(BridgeError::ProcessFailed(msg)) if attempt < retry.max_retries => {
                    let delay = retry.delay_for(attempt);
                    warn!(attempt, error = %msg, ?delay, "tool failed, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn run_once(&self, args: &[String], stdin: Option<&[u8]>) -> Result<ToolOutput> {
        let start = Instant::now();
        debug!(program = %self.config.program.display(), ?args, "spawning tool");

        let mut child = Command::new(&self.config.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    BridgeError::ToolNotFound(self.config.program.display().to_string())
                }
                _ => BridgeError::IoError(e),
            })?;

        let writer = match (stdin, child.stdin.take()) {
            (Some(data), Some(mut pipe)) => {
                let data = data.to_vec();
                Some(thread::spawn(move || {
                    // Broken pipe here just means the tool stopped reading early
                    let _ = pipe.write_all(&data);
                }))
            }
            _ => None,
        };
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = match wait_with_timeout(&mut child, self.config.timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                warn!(
                    program = %self.config.program.display(),
                    timeout = ?self.config.timeout,
                    "tool timed out, killed"
                );
                return Err(BridgeError::Timeout(self.config.timeout));
            }
        };

        if let Some(handle) = writer {
            let _ = handle.join();
        }
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(BridgeError::ProcessFailed(format!(
                "{} exited with {}: {}",
                self.config.program.display(),
                status,
                stderr.trim()
            )));
        }

        Ok(ToolOutput {
            stdout,
            stderr,
            duration: start.elapsed(),
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// `Ok(None)` when the deadline passed first
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
