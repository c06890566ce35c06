use std::fmt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use thiserror::Error;
use tracing::debug;

/// How the child's standard streams are wired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Inherit stdio so the operator sees progress and can answer prompts.
    Stream,
    /// Pipe stdout/stderr back to the caller for parsing.
    Capture,
    /// Pipe stdout only. Stdin and stderr stay on the terminal so keyring
    /// passphrase prompts are visible and can be answered.
    CaptureStdout,
}

/// One external command: program, argument list, and stream wiring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub mode: Mode,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            mode,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured output of a finished command. Empty for streamed commands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {}{}", describe_code(.code), describe_stderr(.stderr))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Seam between the workflows and the operating system.
pub trait CommandRunner: Send + Sync {
    /// Runs to completion. Non-zero exit is an error.
    fn run(&self, invocation: &Invocation) -> Result<Output, RunError>;

    /// Starts a long-lived child with inherited stdio.
    fn spawn(&self, invocation: &Invocation) -> Result<Child, RunError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<Output, RunError> {
        debug!(command = %invocation, mode = ?invocation.mode, "running");
        let mut command = invocation.command();
        match invocation.mode {
            Mode::Stream => {
                let status = command.status().map_err(|source| spawn_error(invocation, source))?;
                if !status.success() {
                    return Err(RunError::Failed {
                        command: invocation.to_string(),
                        code: status.code(),
                        stderr: String::new(),
                    });
                }
                Ok(Output::default())
            }
            Mode::Capture | Mode::CaptureStdout => {
                command.stdin(Stdio::inherit());
                if invocation.mode == Mode::CaptureStdout {
                    command.stderr(Stdio::inherit());
                }
                let output = command
                    .output()
                    .map_err(|source| spawn_error(invocation, source))?;
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if !output.status.success() {
                    return Err(RunError::Failed {
                        command: invocation.to_string(),
                        code: output.status.code(),
                        stderr,
                    });
                }
                Ok(Output { stdout, stderr })
            }
        }
    }

    fn spawn(&self, invocation: &Invocation) -> Result<Child, RunError> {
        debug!(command = %invocation, "spawning");
        invocation
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| spawn_error(invocation, source))
    }
}

fn spawn_error(invocation: &Invocation, source: std::io::Error) -> RunError {
    RunError::Spawn {
        program: invocation.program.display().to_string(),
        source,
    }
}
