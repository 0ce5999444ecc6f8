use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Captured result of a successful utility invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// The full command line that was run, program first.
    pub command: Vec<String>,
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of a client `execute()`: the process result plus the resolved files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub process: ProcessOutput,
    pub output_file: PathBuf,
    /// Request payload file, archive protocol only.
    pub request_file: Option<PathBuf>,
}

/// Runs one external fetch utility. Arguments are passed straight to the process,
/// never through a shell.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    interpreter: Option<PathBuf>,
    working_dir: Option<PathBuf>,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            interpreter: None,
            working_dir: None,
        }
    }

    /// Run the program as a script under `interpreter` (e.g. a Python 2 binary).
    pub fn interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Resolved command line for `args`, program (and interpreter) first.
    pub fn command(&self, args: &[String]) -> Result<Vec<String>> {
        let mut cmd = Vec::with_capacity(args.len() + 2);
        if let Some(interp) = &self.interpreter {
            cmd.push(resolve_program(interp)?.display().to_string());
        }
        cmd.push(resolve_program(&self.program)?.display().to_string());
        cmd.extend(args.iter().cloned());
        Ok(cmd)
    }

    /// Run to completion. A non-zero exit becomes [`Error::Execution`] with the
    /// captured output; nothing is retried.
    pub fn run(&self, args: &[String]) -> Result<ProcessOutput> {
        let command = self.command(args)?;
        let (program, rest) = command
            .split_first()
            .ok_or_else(|| Error::ExecutableNotFound(self.program.display().to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        info!(program = %program, args = ?rest, "running fetch utility");
        let output = cmd.output().map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let status = output.status.code();
        debug!(program = %program, ?status, "fetch utility exited");

        match status {
            Some(0) => Ok(ProcessOutput {
                command,
                status: 0,
                stdout,
                stderr,
            }),
            status => Err(Error::Execution {
                program: program.clone(),
                status,
                stdout,
                stderr,
            }),
        }
    }
}

/// Bare names are looked up on `PATH`; anything with a directory part must exist.
pub fn resolve_program(program: &Path) -> Result<PathBuf> {
    let not_found = || Error::ExecutableNotFound(program.display().to_string());
    if program.as_os_str().is_empty() {
        return Err(not_found());
    }
    if program.components().count() > 1 || program.is_absolute() {
        return if program.is_file() {
            Ok(program.to_path_buf())
        } else {
            Err(not_found())
        };
    }
    which::which(program).map_err(|_| not_found())
}
