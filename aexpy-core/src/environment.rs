//! Execution environments: where the inspector and trigger snippets run.
//!
//! An environment is an opaque command runner. [`CurrentEnvironment`] uses the
//! caller's interpreter as is; [`VenvEnvironment`] builds a throwaway virtual
//! environment and removes it when dropped.

use std::ffi::{OsStr, OsString};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::error::{Error, Result};

/// Interpreter used when nothing else is configured.
pub const DEFAULT_PYTHON: &str = "python3";

/// Captured result of one command.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed or timed out.
    pub exit: Option<i32>,
    pub out: String,
    pub err: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit == Some(0)
    }

    /// Turn a non-zero exit into [`Error::Command`].
    pub fn check(self, command: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::Command {
                command: command.to_string(),
                code: self.exit,
                stderr: self.err,
            })
        }
    }
}

/// A command line plus the options it runs with.
#[derive(Clone, Debug, Default)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    stdin: Option<String>,
    timeout: Option<Duration>,
    envs: Vec<(OsString, OsString)>,
    python_path: Vec<PathBuf>,
    cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            ..Default::default()
        }
    }

    /// An invocation whose program is the environment's interpreter.
    /// Use with [`ExecutionEnvironment::run_python`].
    pub fn python() -> Self {
        Self::default()
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Add a directory to `PYTHONPATH`.
    pub fn python_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.python_path.push(dir.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    fn with_program(mut self, program: &Path) -> Self {
        self.program = program.as_os_str().to_os_string();
        self
    }

    /// Human readable command line for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn the process and wait for it, honouring the timeout.
    pub fn execute(self) -> Result<CommandOutput> {
        let shown = self.display();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in &self.envs {
            command.env(k, v);
        }
        if !self.python_path.is_empty() {
            let mut paths = self.python_path.clone();
            if let Some(existing) = std::env::var_os("PYTHONPATH") {
                paths.extend(std::env::split_paths(&existing));
            }
            let joined = std::env::join_paths(paths)
                .map_err(|e| Error::Environment(format!("invalid PYTHONPATH entry: {}", e)))?;
            command.env("PYTHONPATH", joined);
        }
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        tracing::debug!(command = %shown, "Spawning process");
        let mut child = command.spawn()?;

        let writer = match (child.stdin.take(), self.stdin) {
            (Some(mut pipe), Some(input)) => Some(thread::spawn(move || {
                let _ = pipe.write_all(input.as_bytes());
            })),
            _ => None,
        };
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = match self.timeout {
            None => Some(child.wait()?),
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break Some(status);
                    }
                    if Instant::now() >= deadline {
                        tracing::warn!(command = %shown, ?limit, "Process timed out, killing");
                        let _ = child.kill();
                        let _ = child.wait();
                        break None;
                    }
                    thread::sleep(Duration::from_millis(20));
                }
            }
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let out = stdout.map(join_reader).unwrap_or_default();
        let err = stderr.map(join_reader).unwrap_or_default();
        let exit = status.and_then(|s| s.code());
        tracing::debug!(command = %shown, ?exit, "Process finished");
        Ok(CommandOutput { exit, out, err })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Runs commands on behalf of a stage.
pub trait ExecutionEnvironment {
    /// Interpreter executable inside the environment.
    fn python(&self) -> &Path;

    /// Short description for logs.
    fn describe(&self) -> String;

    /// Adjust an invocation before it runs (environment variables, paths).
    fn prepare(&self, invocation: Invocation) -> Invocation {
        invocation
    }

    fn run(&self, invocation: Invocation) -> Result<CommandOutput> {
        self.prepare(invocation).execute()
    }

    /// Run the environment's interpreter with the invocation's arguments.
    fn run_python(&self, invocation: Invocation) -> Result<CommandOutput> {
        self.run(invocation.with_program(self.python()))
    }
}

/// The caller's own environment.
#[derive(Clone, Debug)]
pub struct CurrentEnvironment {
    python: PathBuf,
}

impl Default for CurrentEnvironment {
    fn default() -> Self {
        Self::new(DEFAULT_PYTHON)
    }
}

impl CurrentEnvironment {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl ExecutionEnvironment for CurrentEnvironment {
    fn python(&self) -> &Path {
        &self.python
    }

    fn describe(&self) -> String {
        format!("current({})", self.python.display())
    }
}

/// A temporary virtual environment, deleted on drop.
#[derive(Debug)]
pub struct VenvEnvironment {
    dir: TempDir,
    python: PathBuf,
    site_packages: Option<PathBuf>,
}

impl VenvEnvironment {
    /// Create a fresh venv with `base_python -m venv`.
    pub fn create(base_python: impl AsRef<OsStr>) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("aexpy-env-").tempdir()?;
        let base = base_python.as_ref();
        tracing::info!(python = %base.to_string_lossy(), path = %dir.path().display(), "Creating virtual environment");
        Invocation::new(base)
            .args(["-m", "venv"])
            .arg(dir.path())
            .execute()?
            .check(&format!("{} -m venv", base.to_string_lossy()))?;

        let python = if cfg!(windows) {
            dir.path().join("Scripts").join("python.exe")
        } else {
            dir.path().join("bin").join("python")
        };
        if !python.exists() {
            return Err(Error::Environment(format!(
                "virtual environment has no interpreter at {}",
                python.display()
            )));
        }
        let site_packages = find_site_packages(dir.path());
        Ok(Self {
            dir,
            python,
            site_packages,
        })
    }

    /// Create a venv and install `requirements` into it.
    pub fn with_requirements(base_python: impl AsRef<OsStr>, requirements: &[String]) -> Result<Self> {
        let env = Self::create(base_python)?;
        env.install(requirements)?;
        Ok(env)
    }

    /// `pip install` the given specs. An empty list is a no-op.
    pub fn install(&self, specs: &[String]) -> Result<()> {
        if specs.is_empty() {
            return Ok(());
        }
        tracing::info!(count = specs.len(), "Installing packages into environment");
        self.run_python(
            Invocation::python()
                .args(["-m", "pip", "install", "--disable-pip-version-check", "-q"])
                .args(specs),
        )?
        .check("pip install")?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn site_packages(&self) -> Option<&Path> {
        self.site_packages.as_deref()
    }
}

fn find_site_packages(root: &Path) -> Option<PathBuf> {
    let windows = root.join("Lib").join("site-packages");
    if windows.is_dir() {
        return Some(windows);
    }
    std::fs::read_dir(root.join("lib"))
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path().join("site-packages"))
        .find(|p| p.is_dir())
}

impl ExecutionEnvironment for VenvEnvironment {
    fn python(&self) -> &Path {
        &self.python
    }

    fn describe(&self) -> String {
        format!("venv({})", self.dir.path().display())
    }

    fn prepare(&self, invocation: Invocation) -> Invocation {
        let bin = self
            .python
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.dir.path().to_path_buf());
        let mut paths = vec![bin];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        let mut invocation = invocation.env("VIRTUAL_ENV", self.dir.path());
        if let Ok(joined) = std::env::join_paths(paths) {
            invocation = invocation.env("PATH", joined);
        }
        // Embedded interpreters do not read VIRTUAL_ENV; expose site-packages directly.
        match &self.site_packages {
            Some(site) => invocation.python_path(site),
            None => invocation,
        }
    }
}

impl Drop for VenvEnvironment {
    fn drop(&mut self) {
        tracing::debug!(path = %self.dir.path().display(), "Removing virtual environment");
    }
}

/// Whether `python` can be launched at all.
pub fn python_available(python: &str) -> bool {
    Invocation::new(python)
        .arg("--version")
        .timeout(Duration::from_secs(10))
        .execute()
        .map(|o| o.success())
        .unwrap_or(false)
}

/// `(major, minor)` of a version string such as `3.8` or `3.11.4`.
pub fn major_minor(pyversion: &str) -> Option<(u32, u32)> {
    let mut parts = pyversion.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Interpreter command for a target version: `3.8` → `python3.8`.
pub fn versioned_python(pyversion: &str) -> Option<String> {
    major_minor(pyversion).map(|(major, minor)| format!("python{}.{}", major, minor))
}

/// Interpreter that runs a distribution.
///
/// An explicit choice wins. Otherwise the interpreter matching `pyversion` is
/// used when it can be launched, falling back to [`DEFAULT_PYTHON`].
pub fn select_python(explicit: Option<&str>, pyversion: &str) -> String {
    select_python_with(explicit, pyversion, python_available)
}

fn select_python_with(explicit: Option<&str>, pyversion: &str, available: impl Fn(&str) -> bool) -> String {
    if let Some(python) = explicit {
        return python.to_string();
    }
    match versioned_python(pyversion) {
        Some(python) if available(&python) => {
            tracing::debug!(%python, "Selected interpreter for target version");
            python
        }
        Some(python) => {
            tracing::warn!(%python, fallback = DEFAULT_PYTHON, "Interpreter for target version not found");
            DEFAULT_PYTHON.to_string()
        }
        None => DEFAULT_PYTHON.to_string(),
    }
}
