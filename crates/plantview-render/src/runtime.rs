//! Embedded PlantUML runtime
//!
//! Locates a Java executable and the PlantUML jar, probes them once, and
//! keeps the result for the rest of the process.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        PlantUmlRuntime                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  1. Locate plantuml.jar and java (lazy, singleton, never retried)   │
//! │  2. Probe `java -version` once                                      │
//! │  3. Per call: java -jar plantuml.jar -pipe -t<fmt>  (serialised)    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no teardown: once started (or once failed) the runtime stays
//! that way until the process exits.

use std::env;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::error::{RenderError, Result};
use crate::types::OutputFormat;

/// Environment variable pointing at the PlantUML jar
pub const JAR_ENV: &str = "PLANTUML_JAR";
/// Environment variable pointing at a Java installation
pub const JAVA_HOME_ENV: &str = "JAVA_HOME";

const JAR_FILE_NAME: &str = "plantuml.jar";

/// How often a running engine process is checked for exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[cfg(windows)]
const JAVA_BIN: &str = "java.exe";
#[cfg(not(windows))]
const JAVA_BIN: &str = "java";

/// Process-wide runtime state. A failure is stored as well, so startup is
/// attempted exactly once.
static RUNTIME: OnceCell<std::result::Result<PlantUmlRuntime, String>> = OnceCell::new();

/// Where to look for the runtime
///
/// Explicit paths win over environment variables, which win over the
/// conventional locations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeLocator {
    /// Explicit path to `plantuml.jar`
    pub jar: Option<PathBuf>,
    /// Explicit path to the `java` executable
    pub java: Option<PathBuf>,
}

impl RuntimeLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jar(mut self, jar: impl Into<PathBuf>) -> Self {
        self.jar = Some(jar.into());
        self
    }

    pub fn with_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = Some(java.into());
        self
    }

    /// Candidate jar paths in lookup order
    pub fn jar_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(jar) = &self.jar {
            candidates.push(jar.clone());
        }
        if let Some(jar) = env::var_os(JAR_ENV) {
            candidates.push(PathBuf::from(jar));
        }
        candidates.push(Path::new("jar").join(JAR_FILE_NAME));
        if let Some(dir) = env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
            candidates.push(dir.join("jar").join(JAR_FILE_NAME));
        }
        candidates.push(PathBuf::from(JAR_FILE_NAME));
        candidates
    }

    /// Candidate java executables in lookup order
    pub fn java_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(java) = &self.java {
            candidates.push(java.clone());
        }
        if let Some(home) = env::var_os(JAVA_HOME_ENV) {
            candidates.push(PathBuf::from(home).join("bin").join(JAVA_BIN));
        }
        // Bare name, resolved through PATH by the OS
        candidates.push(PathBuf::from(JAVA_BIN));
        candidates
    }

    /// Find the first existing jar
    pub fn locate_jar(&self) -> std::result::Result<PathBuf, String> {
        let candidates = self.jar_candidates();
        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| {
                format!(
                    "{} not found (looked in: {}). Set {} or [engine].jar in plantview.toml.",
                    JAR_FILE_NAME,
                    display_paths(&candidates),
                    JAR_ENV
                )
            })
    }

    /// Find the first java executable that answers `-version`
    ///
    /// Returns the executable and the first line of its version banner.
    pub fn locate_java(&self) -> std::result::Result<(PathBuf, String), String> {
        let candidates = self.java_candidates();
        for candidate in &candidates {
            match probe_java(candidate) {
                Ok(version) => return Ok((candidate.clone(), version)),
                Err(e) => log::debug!("Java candidate {} rejected: {}", candidate.display(), e),
            }
        }
        Err(format!(
            "no working Java runtime (tried: {}). Install Java, or set {} or [engine].java in plantview.toml.",
            display_paths(&candidates),
            JAVA_HOME_ENV
        ))
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run `java -version` and return the first banner line
fn probe_java(java: &Path) -> std::result::Result<String, String> {
    let output = Command::new(java)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(format!("exited with {}", output.status));
    }
    // The banner goes to stderr on every JDK we know of
    let banner = if output.stderr.is_empty() {
        output.stdout
    } else {
        output.stderr
    };
    Ok(String::from_utf8_lossy(&banner)
        .lines()
        .next()
        .unwrap_or("unknown version")
        .trim()
        .to_string())
}

/// A started PlantUML runtime
///
/// Obtained only through [`PlantUmlRuntime::start`]; there is at most one
/// per process.
#[derive(Debug)]
pub struct PlantUmlRuntime {
    java: PathBuf,
    jar: PathBuf,
    java_version: String,
    /// Serialises every call into the engine
    lock: Mutex<()>,
    /// Engine process of the call in progress
    active: Mutex<Option<Child>>,
}

impl PlantUmlRuntime {
    /// Start the runtime, or return the one already started
    ///
    /// The locator is only consulted on the first call. If that call failed,
    /// every later call fails with the same `RuntimeUnavailable` reason.
    pub fn start(locator: &RuntimeLocator) -> Result<&'static PlantUmlRuntime> {
        let state = RUNTIME.get_or_init(|| {
            let started = Self::launch(locator);
            match &started {
                Ok(runtime) => log::info!(
                    "PlantUML runtime started: jar={} java={} ({})",
                    runtime.jar.display(),
                    runtime.java.display(),
                    runtime.java_version
                ),
                Err(reason) => log::error!("PlantUML runtime unavailable: {}", reason),
            }
            started
        });

        match state {
            Ok(runtime) => Ok(runtime),
            Err(reason) => Err(RenderError::RuntimeUnavailable(reason.clone())),
        }
    }

    /// The started runtime, if startup already succeeded
    pub fn get() -> Option<&'static PlantUmlRuntime> {
        RUNTIME.get().and_then(|state| state.as_ref().ok())
    }

    /// Whether startup has been attempted in this process
    pub fn is_initialized() -> bool {
        RUNTIME.get().is_some()
    }

    fn launch(locator: &RuntimeLocator) -> std::result::Result<Self, String> {
        let jar = locator.locate_jar()?;
        let (java, java_version) = locator.locate_java()?;
        Ok(Self {
            java,
            jar,
            java_version,
            lock: Mutex::new(()),
            active: Mutex::new(None),
        })
    }

    pub fn jar(&self) -> &Path {
        &self.jar
    }

    pub fn java(&self) -> &Path {
        &self.java
    }

    pub fn java_version(&self) -> &str {
        &self.java_version
    }

    /// Run the engine on `source` and return the raw image bytes
    ///
    /// Calls are serialised. [`PlantUmlRuntime::cancel`] kills the call in
    /// progress.
    pub fn render(&self, source: &str, format: OutputFormat) -> Result<Vec<u8>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut child = Command::new(&self.java)
            .arg("-Djava.awt.headless=true")
            .arg("-jar")
            .arg(&self.jar)
            .arg("-pipe")
            .arg(format.plantuml_flag())
            .arg("-charset")
            .arg("UTF-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RenderError::Render(format!("Failed to launch PlantUML: {}", e)))?;

        // Each pipe gets its own thread so a large image on stdout cannot
        // deadlock against a large source on stdin
        let stdin = child.stdin.take();
        let input = source.as_bytes().to_vec();
        let writer = thread::spawn(move || -> io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input)?;
            }
            Ok(())
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        *self.active_child() = Some(child);
        let status = self.wait_active();
        self.active_child().take();

        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::debug!("Writing diagram source to PlantUML failed: {}", e),
            Err(_) => log::warn!("PlantUML stdin writer panicked"),
        }
        let stdout = collect(stdout);
        let stderr = collect(stderr);
        let status =
            status.map_err(|e| RenderError::Render(format!("PlantUML process failed: {}", e)))?;

        if !status.success() {
            return Err(RenderError::Render(engine_diagnostic(
                &stderr,
                &stdout,
                format,
                status.code(),
            )));
        }

        Ok(stdout)
    }

    /// Kill the engine process of the call in progress, if any
    ///
    /// The interrupted [`PlantUmlRuntime::render`] returns a render error and
    /// releases the runtime for the next call.
    pub fn cancel(&self) -> bool {
        match self.active_child().as_mut() {
            Some(child) => {
                log::warn!("Killing PlantUML process {}", child.id());
                if let Err(e) = child.kill() {
                    log::debug!("PlantUML process already gone: {}", e);
                }
                true
            }
            None => false,
        }
    }

    fn active_child(&self) -> MutexGuard<'_, Option<Child>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Poll the active child until it exits
    ///
    /// The slot is only locked for each `try_wait`, so `cancel` can reach the
    /// child in between.
    fn wait_active(&self) -> io::Result<ExitStatus> {
        loop {
            {
                let mut slot = self.active_child();
                let Some(child) = slot.as_mut() else {
                    return Err(io::Error::other("engine process slot is empty"));
                };
                if let Some(status) = child.try_wait()? {
                    return Ok(status);
                }
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

/// Read a child pipe to the end on its own thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                log::debug!("Reading PlantUML output failed: {}", e);
            }
        }
        buf
    })
}

fn collect(reader: JoinHandle<Vec<u8>>) -> Vec<u8> {
    reader.join().unwrap_or_default()
}

/// Pick the most useful diagnostic from a failed engine run
fn engine_diagnostic(stderr: &[u8], stdout: &[u8], format: OutputFormat, code: Option<i32>) -> String {
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    // PNG error images are binary; only SVG stdout is worth showing
    if format.is_text() {
        if let Ok(text) = std::str::from_utf8(stdout) {
            let text = text.trim();
            if !text.is_empty() && !text.starts_with('<') {
                return text.to_string();
            }
        }
    }
    match code {
        Some(code) => format!("PlantUML exited with status {}", code),
        None => "PlantUML was terminated by a signal".to_string(),
    }
}
