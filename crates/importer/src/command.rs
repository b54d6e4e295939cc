//! External command abstraction.
//!
//! The converter and inspector are separate programs. They are described as a
//! [`CommandSpec`], run through a [`CommandRunner`], and judged by a
//! [`FailurePolicy`]. Arguments that carry credentials are marked sensitive so
//! the rendered command line is safe to log.

use crate::error::{ImportError, ImportResult};
use async_trait::async_trait;
use geoingest_core::config::FailurePolicy;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// One command-line argument.
#[derive(Clone, PartialEq, Eq)]
pub enum CommandArg {
    Plain(String),
    /// Passed verbatim to the process, rendered as `redacted` in logs.
    Sensitive { value: String, redacted: String },
}

impl CommandArg {
    pub fn value(&self) -> &str {
        match self {
            Self::Plain(value) | Self::Sensitive { value, .. } => value,
        }
    }

    pub fn display(&self) -> &str {
        match self {
            Self::Plain(value) => value,
            Self::Sensitive { redacted, .. } => redacted,
        }
    }
}

impl fmt::Debug for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.display())
    }
}

impl From<&str> for CommandArg {
    fn from(value: &str) -> Self {
        Self::Plain(value.to_string())
    }
}

impl From<String> for CommandArg {
    fn from(value: String) -> Self {
        Self::Plain(value)
    }
}

/// A program and its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<CommandArg>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<CommandArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<CommandArg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn sensitive_arg(mut self, value: impl Into<String>, redacted: impl Into<String>) -> Self {
        self.args.push(CommandArg::Sensitive {
            value: value.into(),
            redacted: redacted.into(),
        });
        self
    }

    /// File name of the program, for metrics and error messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Actual argument values, in order.
    pub fn arg_values(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(CommandArg::value)
    }
}

/// Renders the command line with sensitive arguments redacted.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            let shown = arg.display();
            if shown.is_empty() || shown.contains(char::is_whitespace) {
                write!(f, " \"{shown}\"")?;
            } else {
                write!(f, " {shown}")?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion, capturing both output streams. The process is
    /// killed and `CommandTimeout` returned when `timeout` expires first.
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> ImportResult<CommandOutput>;
}

/// Runs commands as child processes of the server.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> ImportResult<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(spec.arg_values());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!(command = %spec, "spawning external command");
        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| ImportError::Spawn {
            program: spec.program_name(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    command = %spec,
                    timeout_secs = timeout.as_secs(),
                    "external command timed out"
                );
                return Err(ImportError::CommandTimeout {
                    program: spec.program_name(),
                    timeout,
                });
            }
        };

        let duration = started.elapsed();
        let program = spec.program_name();
        crate::metrics::COMMAND_DURATION
            .with_label_values(&[program.as_str()])
            .observe(duration.as_secs_f64());

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        })
    }
}

/// Decide whether `output` is a failure under `policy`, returning the captured
/// stdout on success.
pub fn judge_output(
    spec: &CommandSpec,
    output: CommandOutput,
    policy: FailurePolicy,
) -> ImportResult<String> {
    let stderr = output.stderr.trim();
    let failed = match policy {
        FailurePolicy::ExitStatus => !output.success(),
        FailurePolicy::AnyStderr => !output.success() || !stderr.is_empty(),
    };

    if failed {
        return Err(ImportError::CommandFailed {
            program: spec.program_name(),
            exit_code: output.exit_code,
            stderr: if stderr.is_empty() {
                "(no error output)".to_string()
            } else {
                stderr.to_string()
            },
        });
    }

    if !stderr.is_empty() {
        tracing::warn!(
            program = %spec.program_name(),
            stderr = %stderr,
            "external command succeeded with error output"
        );
    }
    Ok(output.stdout)
}
