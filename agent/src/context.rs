//! Startup context shared by every invocation mode
//!
//! The router resolves a mode once and hands each mode the same context: an
//! environment accessor and the process output streams.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Read access to the process environment
pub trait Environment {
    /// Value of an environment variable, `None` when unset or not unicode
    fn var(&self, key: &str) -> Option<String>;

    /// Current working directory
    fn current_dir(&self) -> io::Result<PathBuf>;
}

/// The real process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEnvironment;

impl Environment for OsEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn current_dir(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }
}

/// A fixed environment, used when running modes in-process (tests, embedding)
#[derive(Debug, Default, Clone)]
pub struct StaticEnvironment {
    vars: HashMap<String, String>,
    dir: Option<PathBuf>,
}

impl StaticEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl Environment for StaticEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn current_dir(&self) -> io::Result<PathBuf> {
        self.dir
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "getwd: no working directory"))
    }
}

/// Everything a mode needs from the process it runs in
pub struct Context<'a> {
    pub env: &'a dyn Environment,
    pub stdout: &'a mut dyn Write,
    pub stderr: &'a mut dyn Write,
}

impl<'a> Context<'a> {
    pub fn new(env: &'a dyn Environment, stdout: &'a mut dyn Write, stderr: &'a mut dyn Write) -> Self {
        Self { env, stdout, stderr }
    }

    /// Look up a required variable; empty counts as unset
    pub fn getenv(&self, key: &str) -> Option<String> {
        self.env.var(key).filter(|v| !v.is_empty())
    }

    /// Absolute form of the current working directory
    pub fn getwd(&self) -> io::Result<PathBuf> {
        let dir = self.env.current_dir()?;
        if dir.is_absolute() {
            return Ok(dir);
        }
        Ok(std::env::current_dir()?.join(dir))
    }
}
