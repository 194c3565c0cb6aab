use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

#[derive(Clone, PartialEq, Eq)]
pub enum Arg {
    Plain(String),
    /// Passed to the tool verbatim but never logged.
    Secret(String),
}

impl Arg {
    fn value(&self) -> &str {
        match self {
            Arg::Plain(value) | Arg::Secret(value) => value,
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Plain(value) => write!(f, "{value:?}"),
            Arg::Secret(_) => f.write_str("***"),
        }
    }
}

/// An external tool call: program, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<Arg>,
    pub current_dir: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<String>, current_dir: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: current_dir.to_path_buf(),
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(value.into()));
        self
    }

    pub fn path(self, value: &Path) -> Self {
        self.arg(value.to_string_lossy())
    }

    pub fn secret(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg::Secret(value.into()));
        self
    }

    pub fn arg_values(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(Arg::value)
    }

    /// Shell-like rendering with secrets masked, for logs and diagnostics.
    pub fn redacted(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            match arg {
                Arg::Secret(_) => rendered.push_str("***"),
                Arg::Plain(value) if value.contains(char::is_whitespace) => {
                    rendered.push('\'');
                    rendered.push_str(value);
                    rendered.push('\'');
                }
                Arg::Plain(value) => rendered.push_str(value),
            }
        }
        rendered
    }
}

/// How an external tool finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn failure(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external tools to completion. `Err` means the tool could not be
/// started at all.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<ExitOutcome>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: &Invocation) -> io::Result<ExitOutcome> {
        (**self).run(invocation)
    }
}

/// Spawns real processes, inheriting stdio so tool output reaches the CI log.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<ExitOutcome> {
        debug!(command = %invocation.redacted(), dir = %invocation.current_dir.display(), "Spawning");
        let status = Command::new(&invocation.program)
            .args(invocation.arg_values())
            .current_dir(&invocation.current_dir)
            .status()?;
        Ok(ExitOutcome {
            code: status.code(),
        })
    }
}
