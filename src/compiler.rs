//! Whole-site compilation.
//!
//! [`Compiler::compile_everything`] runs two phases, strictly in order,
//! under one lock:
//!
//! ```text
//! 1. Assets    entrypoints ──▶ bundler ──▶ report ──▶ reconcile into Blobs<Asset>
//! 2. Contents  for each content route: render (+ layout) ──▶ write gates ──▶ file
//! ```
//!
//! Assets go first because content templates link to compiled assets by
//! their reconciled URL paths.
//!
//! ## Destinations
//!
//! | Route | Destination |
//! |-------|-------------|
//! | `/` | `<output_root>/index.html` |
//! | `/blog/` | `<output_root>/blog/index.html` |
//! | `/feed.xml` | `<output_root>/feed.xml` |
//!
//! The index file name comes from `compiler.output_directory_index`.
//!
//! ## Write Gates
//!
//! Every destination passes two gates before anything is written:
//!
//! 1. **Unchanged**: the file already holds exactly the rendered bytes, so
//!    nothing is written. A second build of an unchanged site touches no file.
//! 2. **Containment**: the destination, after folding `..` segments, must lie
//!    inside the output root. Escaping routes are skipped with a warning and
//!    reported as [`WriteOutcome::OutsideOutputRoot`]; they do not fail the
//!    build.
//!
//! Otherwise the parent directories are created and the file is written.
//!
//! Any error aborts the whole compile: a bundler failure stops it before a
//! single content is rendered, and one failing template stops the rest.

use crate::blob::{BlobError, HasInputPath, Routable};
use crate::bundler::{BundleError, BundleInvocation, BundleReport, Bundler, ParcelBundler};
use crate::paths;
use crate::render::RenderError;
use crate::routes::{RouteError, RouteTarget};
use crate::site::Site;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Path does not exist: {0}")]
    PathDoesNotExist(PathBuf),
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("Route error: {0}")]
    Route(#[from] RouteError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened to one content destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The file already held the rendered bytes.
    Unchanged,
    /// The destination escaped the output root; nothing was written.
    OutsideOutputRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub route: String,
    pub input_path: PathBuf,
    pub destination: PathBuf,
    pub outcome: WriteOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub input_path: PathBuf,
    pub url_path: String,
    pub output_path: PathBuf,
}

/// Summary of one `compile_everything` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    pub output_root: PathBuf,
    /// Assets reconciled from the bundler report, in report order.
    pub assets: Vec<AssetRecord>,
    /// Content routes, in route assignment order.
    pub contents: Vec<ContentRecord>,
}

impl CompileReport {
    pub fn count(&self, outcome: WriteOutcome) -> usize {
        self.contents.iter().filter(|c| c.outcome == outcome).count()
    }
}

pub struct Compiler {
    bundler: Box<dyn Bundler>,
    lock: Mutex<()>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A compiler that shells out to the configured bundler command.
    pub fn new() -> Self {
        Self::with_bundler(ParcelBundler)
    }

    pub fn with_bundler(bundler: impl Bundler + 'static) -> Self {
        Self {
            bundler: Box::new(bundler),
            lock: Mutex::new(()),
        }
    }

    /// Compile assets, then contents. Concurrent calls on the same compiler
    /// run one after the other.
    pub fn compile_everything(&self, site: &mut Site) -> Result<CompileReport, CompileError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let output_root = site.config().output_root_path();
        let mut report = CompileReport {
            output_root: output_root.clone(),
            ..Default::default()
        };

        info!(output_root = %output_root.display(), "compiling assets");
        create_destination_directory(&output_root)?;
        self.compile_assets(site, &mut report)?;

        info!("compiling contents");
        create_destination_directory(&output_root)?;
        compile_contents(site, &mut report)?;

        info!(
            written = report.count(WriteOutcome::Written),
            unchanged = report.count(WriteOutcome::Unchanged),
            skipped = report.count(WriteOutcome::OutsideOutputRoot),
            "finished compiling contents"
        );
        Ok(report)
    }

    /// Hand the entrypoint assets to the bundler and reconcile its report.
    ///
    /// Entrypoints are passed in the registry's iteration order, which is
    /// sorted by absolute input path, not by registration order.
    fn compile_assets(&self, site: &mut Site, report: &mut CompileReport) -> Result<(), CompileError> {
        let entrypoints: Vec<PathBuf> = site
            .assets()
            .iter()
            .filter(|asset| asset.is_entrypoint())
            .map(|asset| asset.input_path().to_path_buf())
            .collect();
        if entrypoints.is_empty() {
            debug!("no entrypoint assets, skipping bundler");
            return Ok(());
        }

        let invocation = BundleInvocation::from_config(site.config(), entrypoints);
        debug!(command = %invocation.command_line().join(" "), "bundling assets");
        let stdout = self.bundler.bundle(&invocation)?;
        let bundle = BundleReport::parse(&stdout)?;
        reconcile_assets(site, &bundle, report)
    }
}

/// Make sure `output_root` exists, creating it only when its parent does.
fn create_destination_directory(output_root: &Path) -> Result<(), CompileError> {
    if output_root.is_dir() {
        return Ok(());
    }
    match output_root.parent() {
        Some(parent) if parent.is_dir() => {
            fs::create_dir(output_root)?;
            Ok(())
        }
        _ => Err(CompileError::PathDoesNotExist(output_root.to_path_buf())),
    }
}

/// Point every tracked asset named in `bundle` at its compiled output.
///
/// Report inputs that aren't tracked (dependencies pulled in by the bundler)
/// are ignored.
fn reconcile_assets(
    site: &mut Site,
    bundle: &BundleReport,
    report: &mut CompileReport,
) -> Result<(), CompileError> {
    let root = site.config().root().to_path_buf();
    let output_root = report.output_root.clone();

    for bundled in &bundle.outputs {
        let output_path = paths::clean(&paths::concat(&root, [&bundled.output]));
        let url_path = paths::relative_to(&output_path, &output_root)
            .map(|rel| paths::to_slash(&rel))
            .unwrap_or_else(|| {
                warn!(output = %output_path.display(), "bundler output outside the output root");
                bundled.output.clone()
            });
        let mut body: Option<String> = None;

        for input in &bundled.inputs {
            let input_path = paths::clean(&paths::concat(&root, [input]));
            let Ok(asset) = site.assets_mut().get_mut(&input_path) else {
                debug!(input = %input, "untracked bundler input");
                continue;
            };

            let text = match &body {
                Some(text) => text.clone(),
                None => {
                    let bytes = fs::read(&output_path)?;
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    body = Some(text.clone());
                    text
                }
            };
            asset.set_url_path(&url_path);
            asset.set_output_path(output_path.clone());
            asset.set_body(text);

            let url_path = asset.url_path().unwrap_or_default().to_string();
            debug!(input = %input, url_path = %url_path, "reconciled asset");
            report.assets.push(AssetRecord {
                input_path,
                url_path,
                output_path: output_path.clone(),
            });
        }
    }
    Ok(())
}

/// Render every content route and write it out.
fn compile_contents(site: &mut Site, report: &mut CompileReport) -> Result<(), CompileError> {
    let output_root = report.output_root.clone();
    let index = site.config().output_directory_index().to_string();

    let routed: Vec<(String, PathBuf)> = site
        .routes()
        .iter()
        .filter_map(|(route, target)| match target {
            RouteTarget::Content(input_path) => Some((route.to_string(), input_path.clone())),
            RouteTarget::Asset(_) => None,
        })
        .collect();

    for (route, input_path) in routed {
        debug!(route = %route, input = %input_path.display(), "rendering content");
        let rendered = {
            let content = site.contents().get(&input_path)?;
            let layout = match content.layout() {
                Some(layout) => Some(site.layouts().get(layout)?),
                None => None,
            };
            let view = site.view_context(content)?;
            view.render(content, layout, None)?
        };

        let destination = destination_path(&output_root, &route, &index);
        let outcome = write_output(&output_root, &destination, &rendered)?;

        let content = site.contents_mut().get_mut(&input_path)?;
        content.set_output_path(destination.clone());
        content.set_rendered(rendered);

        report.contents.push(ContentRecord {
            route,
            input_path,
            destination,
            outcome,
        });
    }
    Ok(())
}

/// Where `route` is written below `output_root`.
pub fn destination_path(output_root: &Path, route: &str, index: &str) -> PathBuf {
    let mut destination = paths::concat(output_root, [route]);
    if route.ends_with('/') {
        destination.push(index);
    }
    paths::clean(&destination)
}

/// Write `body` to `destination` unless it is unchanged or escapes
/// `output_root`.
pub fn write_output(
    output_root: &Path,
    destination: &Path,
    body: &str,
) -> Result<WriteOutcome, CompileError> {
    if fs::read(destination).is_ok_and(|existing| existing == body.as_bytes()) {
        debug!(destination = %destination.display(), "unchanged");
        return Ok(WriteOutcome::Unchanged);
    }
    if !paths::contains(output_root, destination) {
        warn!(
            destination = %destination.display(),
            output_root = %output_root.display(),
            "skipping write outside the output root"
        );
        return Ok(WriteOutcome::OutsideOutputRoot);
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(destination, body)?;
    debug!(destination = %destination.display(), bytes = body.len(), "written");
    Ok(WriteOutcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn directory_routes_get_the_index_file() {
        let root = Path::new("/out");
        assert_eq!(destination_path(root, "/", "index.html"), Path::new("/out/index.html"));
        assert_eq!(
            destination_path(root, "/blog/", "index.htm"),
            Path::new("/out/blog/index.htm")
        );
        assert_eq!(
            destination_path(root, "/feed.xml", "index.html"),
            Path::new("/out/feed.xml")
        );
    }

    #[test]
    fn escaping_routes_resolve_outside() {
        let root = Path::new("/out");
        let destination = destination_path(root, "/x/../../y", "index.html");
        assert_eq!(destination, Path::new("/y"));
        assert!(!paths::contains(root, &destination));
    }

    #[test]
    fn write_creates_parents_then_skips_identical_content() {
        let tmp = TempDir::new().unwrap();
        let destination = tmp.path().join("a/b/index.html");

        assert_eq!(
            write_output(tmp.path(), &destination, "hello").unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(fs::read_to_string(&destination).unwrap(), "hello");
        assert_eq!(
            write_output(tmp.path(), &destination, "hello").unwrap(),
            WriteOutcome::Unchanged
        );
        assert_eq!(
            write_output(tmp.path(), &destination, "changed").unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(fs::read_to_string(&destination).unwrap(), "changed");
    }

    #[test]
    fn write_outside_root_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let output_root = tmp.path().join("out");
        let destination = tmp.path().join("elsewhere.html");

        assert_eq!(
            write_output(&output_root, &destination, "x").unwrap(),
            WriteOutcome::OutsideOutputRoot
        );
        assert!(!destination.exists());
    }

    #[test]
    fn destination_directory_needs_an_existing_parent() {
        let tmp = TempDir::new().unwrap();

        let direct = tmp.path().join("build");
        create_destination_directory(&direct).unwrap();
        assert!(direct.is_dir());
        create_destination_directory(&direct).unwrap();

        let nested = tmp.path().join("missing/build");
        assert!(matches!(
            create_destination_directory(&nested),
            Err(CompileError::PathDoesNotExist(p)) if p == nested
        ));
    }
}
