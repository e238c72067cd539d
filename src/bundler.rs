//! External asset bundling.
//!
//! Assets are never compiled in-process. The compiler builds a
//! [`BundleInvocation`] from the entrypoint assets and hands it to a
//! [`Bundler`]; the production implementation, [`ParcelBundler`], runs the
//! configured command as a subprocess in the site root and returns its
//! standard output.
//!
//! That output is a human-oriented report, which [`BundleReport::parse`]
//! turns back into `output ← inputs` associations:
//!
//! ```text
//! ✨  Built in 1.52s.
//!
//! public/assets/app.js      1.21 KB    1.23s
//! ├── assets/app.js           830 B    112ms
//! └── assets/lib/util.js      380 B     21ms
//!
//! public/assets/app.css       512 B    310ms
//! └── assets/app.css          512 B     9ms
//!
//! Done in 1.74s.
//! ```
//!
//! Paths in the report are relative to the site root. Anything printed
//! before the `✨` line (package-runner banners) is ignored.

use crate::config::Config;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Asset compilation failed ({status}): {stderr}")]
    AssetCompilationFailed { status: String, stderr: String },
    #[error("Asset report unparseable: {0}")]
    AssetReportUnparseable(String),
    #[error("Failed to start bundler: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Everything needed to run one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInvocation {
    /// Program and leading arguments, e.g. `["yarn", "run", "parcel"]`.
    pub program: Vec<String>,
    /// Directory the bundler runs in; report paths are relative to it.
    pub working_dir: PathBuf,
    pub minify: bool,
    /// `None` disables the bundler's cache.
    pub cache_dir: Option<PathBuf>,
    pub dist_dir: PathBuf,
    pub public_url: String,
    pub entrypoints: Vec<PathBuf>,
}

impl BundleInvocation {
    pub fn from_config(config: &Config, entrypoints: Vec<PathBuf>) -> Self {
        let dist_dir = config.output_assets_path();
        let public_url = dist_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            program: config.bundler_command().to_vec(),
            working_dir: config.root().to_path_buf(),
            minify: config.minify(),
            cache_dir: config.cache_directory_path(),
            dist_dir,
            public_url,
            entrypoints,
        }
    }

    /// The full argument vector, program first.
    pub fn command_line(&self) -> Vec<String> {
        let mut line = self.program.clone();
        line.push("build".into());
        if !self.minify {
            line.push("--no-minify".into());
        }
        match &self.cache_dir {
            Some(dir) => {
                line.push("--cache-dir".into());
                line.push(lossy(dir));
            }
            None => line.push("--no-cache".into()),
        }
        line.push("--dist-dir".into());
        line.push(lossy(&self.dist_dir));
        line.push("--public-url".into());
        line.push(self.public_url.clone());
        line.extend(self.entrypoints.iter().map(|p| lossy(p)));
        line
    }
}

fn lossy(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Runs a bundle and returns the bundler's report text.
pub trait Bundler: Send + Sync {
    fn bundle(&self, invocation: &BundleInvocation) -> Result<String, BundleError>;
}

/// Runs the configured bundler command as a blocking subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParcelBundler;

impl Bundler for ParcelBundler {
    fn bundle(&self, invocation: &BundleInvocation) -> Result<String, BundleError> {
        let line = invocation.command_line();
        let Some((program, args)) = line.split_first() else {
            return Err(BundleError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty bundler command",
            )));
        };

        debug!(command = %line.join(" "), cwd = %invocation.working_dir.display(), "running bundler");
        let output = Command::new(program)
            .args(args)
            .current_dir(&invocation.working_dir)
            .output()
            .map_err(BundleError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(status = %output.status, %stderr, "asset compilation failed");
            return Err(BundleError::AssetCompilationFailed {
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ============================================================================
// Report parsing
// ============================================================================

/// One compiled file and the inputs the bundler built it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledOutput {
    pub output: String,
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleReport {
    pub outputs: Vec<BundledOutput>,
}

static REPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^✨[^\n]*\n[ \t]*\n(?P<blocks>.*?)^[^\n]*Done in[^\n]*\s*\z")
        .expect("report pattern is valid")
});

static BLOCK_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("separator pattern is valid"));

static ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>.*?)\s+(?P<size>[0-9.]+\s*[A-Z]?B)\s+(?P<time>[0-9.]+[a-z]?s)$")
        .expect("entry pattern is valid")
});

const INPUT_MARKERS: [&str; 2] = ["└── ", "├── "];

impl BundleReport {
    pub fn parse(stdout: &str) -> Result<Self, BundleError> {
        let stdout = stdout.replace("\r\n", "\n");
        let caps = REPORT.captures(&stdout).ok_or_else(|| {
            unparseable("missing `✨` header or `Done in` footer".to_string())
        })?;

        let blocks = caps.name("blocks").map_or("", |m| m.as_str()).trim();
        if blocks.is_empty() {
            return Ok(Self::default());
        }

        let outputs = BLOCK_SEPARATOR
            .split(blocks)
            .map(parse_block)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { outputs })
    }
}

fn parse_block(block: &str) -> Result<BundledOutput, BundleError> {
    let mut lines = block.lines().map(str::trim_end);
    let header = lines.next().unwrap_or_default();
    let output = entry_path(header)?;

    let inputs = lines
        .map(|line| {
            let trimmed = line.trim_start();
            let entry = INPUT_MARKERS
                .iter()
                .find_map(|marker| trimmed.strip_prefix(marker))
                .ok_or_else(|| unparseable(format!("expected an input line, got {line:?}")))?;
            entry_path(entry)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if inputs.is_empty() {
        return Err(unparseable(format!("no inputs listed for {output}")));
    }
    Ok(BundledOutput { output, inputs })
}

/// The path column of an `<path>  <size>  <time>` line.
fn entry_path(line: &str) -> Result<String, BundleError> {
    ENTRY
        .captures(line.trim())
        .and_then(|caps| caps.name("path"))
        .map(|m| m.as_str().to_string())
        .filter(|path| !path.is_empty())
        .ok_or_else(|| unparseable(format!("cannot read entry {line:?}")))
}

fn unparseable(message: String) -> BundleError {
    error!(%message, "asset report unparseable");
    BundleError::AssetReportUnparseable(message)
}
