//! Tracked source files and their routing/rendering metadata.
//!
//! Three blob kinds exist, each living in its own [`Blobs`](crate::blobs::Blobs)
//! registry:
//!
//! | Kind | Routable | Renderable | Body |
//! |------|----------|------------|------|
//! | [`Asset`] | yes | no | set by the compiler from the bundler's output |
//! | [`Content`] | yes | yes | source text after the frontmatter header |
//! | [`Layout`] | no | yes | source text, verbatim |
//!
//! Shared behaviour is expressed through small capability traits
//! ([`HasInputPath`], [`Routable`], [`Renderable`]) so the route map and the
//! render chain can work with whichever kinds support them.

use crate::frontmatter::{self, Frontmatter};
use crate::render::Renderer;
use crate::routes::{self, RouteTarget};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unknown blob: {0}")]
    UnknownBlob(PathBuf),
    #[error("Can't add more {0}s after the initial setup")]
    RegistryClosed(&'static str),
}

/// Every blob knows the absolute path of its source file.
pub trait HasInputPath {
    fn input_path(&self) -> &Path;
}

/// Blobs that can be bound to a route and written somewhere.
pub trait Routable: HasInputPath {
    fn url_path(&self) -> Option<&str>;

    /// Store `route` in its normalized form.
    fn set_url_path(&mut self, route: &str);

    fn output_path(&self) -> Option<&Path>;

    fn set_output_path(&mut self, path: PathBuf);

    /// The handle the route map stores for this blob.
    fn route_target(&self) -> RouteTarget;
}

/// Blobs that carry a template body and a renderer list.
pub trait Renderable: HasInputPath {
    /// Source text handed to the first renderer. Read lazily, once.
    fn body(&self) -> Result<&str, BlobError>;

    fn renderers(&self) -> &[RendererSlot];

    fn set_renderers(&mut self, renderers: Vec<RendererSlot>);
}

/// Construction contract used by the registries.
pub trait BlobKind: HasInputPath + Sized {
    /// Per-blob options; `Default` is what bulk registration uses.
    type Options: Default;

    /// Human name used in error messages.
    const KIND: &'static str;

    fn create(input_path: PathBuf, options: Self::Options) -> Self;
}

/// One entry of a renderer list: either a concrete renderer or a request to
/// derive renderers from the file's extensions.
#[derive(Clone)]
pub enum RendererSlot {
    Guess,
    Unit(Arc<dyn Renderer>),
}

impl RendererSlot {
    pub fn unit(renderer: impl Renderer + 'static) -> Self {
        RendererSlot::Unit(Arc::new(renderer))
    }
}

impl fmt::Debug for RendererSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RendererSlot::Guess => f.write_str("Guess"),
            RendererSlot::Unit(renderer) => write!(f, "Unit({})", renderer.name()),
        }
    }
}

fn read_source(path: &Path) -> Result<String, BlobError> {
    let bytes = std::fs::read(path).map_err(|source| BlobError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ============================================================================
// Asset
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AssetOptions {
    /// Hand this file to the bundler as a build entry.
    pub entrypoint: bool,
}

impl AssetOptions {
    pub fn entrypoint() -> Self {
        Self { entrypoint: true }
    }
}

/// A file handled by the external bundler.
#[derive(Debug, Clone)]
pub struct Asset {
    input_path: PathBuf,
    entrypoint: bool,
    body: Option<String>,
    output_path: Option<PathBuf>,
    url_path: Option<String>,
}

impl Asset {
    pub fn is_entrypoint(&self) -> bool {
        self.entrypoint
    }

    /// Compiled output, once the bundler has reported it.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn set_body(&mut self, body: String) {
        self.body = Some(body);
    }
}

impl HasInputPath for Asset {
    fn input_path(&self) -> &Path {
        &self.input_path
    }
}

impl Routable for Asset {
    fn url_path(&self) -> Option<&str> {
        self.url_path.as_deref()
    }

    fn set_url_path(&mut self, route: &str) {
        self.url_path = Some(routes::normalize(route));
    }

    fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    fn set_output_path(&mut self, path: PathBuf) {
        self.output_path = Some(path);
    }

    fn route_target(&self) -> RouteTarget {
        RouteTarget::Asset(self.input_path.clone())
    }
}

impl BlobKind for Asset {
    type Options = AssetOptions;
    const KIND: &'static str = "asset";

    fn create(input_path: PathBuf, options: AssetOptions) -> Self {
        Self {
            input_path,
            entrypoint: options.entrypoint,
            body: None,
            output_path: None,
            url_path: None,
        }
    }
}

// ============================================================================
// Content
// ============================================================================

/// Options for a content blob. The default renderer list is a single
/// [`RendererSlot::Guess`].
#[derive(Debug, Clone)]
pub struct ContentOptions {
    pub layout: Option<PathBuf>,
    pub locals: Map<String, Value>,
    pub renderers: Vec<RendererSlot>,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            layout: None,
            locals: Map::new(),
            renderers: vec![RendererSlot::Guess],
        }
    }
}

impl ContentOptions {
    /// Wrap the content in `layout` when rendering.
    pub fn layout(mut self, layout: &Layout) -> Self {
        self.layout = Some(layout.input_path().to_path_buf());
        self
    }

    pub fn local(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.locals.insert(key.into(), value.into());
        self
    }

    pub fn locals(mut self, locals: Map<String, Value>) -> Self {
        self.locals = locals;
        self
    }

    pub fn renderers(mut self, renderers: Vec<RendererSlot>) -> Self {
        self.renderers = renderers;
        self
    }
}

/// A routable page rendered through its own render chain.
#[derive(Debug)]
pub struct Content {
    input_path: PathBuf,
    layout: Option<PathBuf>,
    locals: Map<String, Value>,
    renderers: Vec<RendererSlot>,
    source: OnceLock<(Frontmatter, String)>,
    url_path: Option<String>,
    output_path: Option<PathBuf>,
    rendered: Option<String>,
}

impl Content {
    /// Absolute path of the layout blob, if any.
    pub fn layout(&self) -> Option<&Path> {
        self.layout.as_deref()
    }

    pub fn set_layout(&mut self, layout: Option<&Layout>) {
        self.layout = layout.map(|l| l.input_path().to_path_buf());
    }

    pub fn locals(&self) -> &Map<String, Value> {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.locals
    }

    pub fn frontmatter(&self) -> Result<&Frontmatter, BlobError> {
        Ok(&self.parsed()?.0)
    }

    /// Frontmatter overlaid with locals; locals win on collisions.
    pub fn input(&self) -> Result<Map<String, Value>, BlobError> {
        let mut input = self.frontmatter()?.clone();
        input.extend(self.locals.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(input)
    }

    /// Output of the most recent render.
    pub fn rendered(&self) -> Option<&str> {
        self.rendered.as_deref()
    }

    pub fn set_rendered(&mut self, rendered: String) {
        self.rendered = Some(rendered);
    }

    fn parsed(&self) -> Result<&(Frontmatter, String), BlobError> {
        if let Some(parsed) = self.source.get() {
            return Ok(parsed);
        }
        let parsed = frontmatter::parse(&read_source(&self.input_path)?);
        Ok(self.source.get_or_init(|| parsed))
    }
}

impl HasInputPath for Content {
    fn input_path(&self) -> &Path {
        &self.input_path
    }
}

impl Routable for Content {
    fn url_path(&self) -> Option<&str> {
        self.url_path.as_deref()
    }

    fn set_url_path(&mut self, route: &str) {
        self.url_path = Some(routes::normalize(route));
    }

    fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    fn set_output_path(&mut self, path: PathBuf) {
        self.output_path = Some(path);
    }

    fn route_target(&self) -> RouteTarget {
        RouteTarget::Content(self.input_path.clone())
    }
}

impl Renderable for Content {
    fn body(&self) -> Result<&str, BlobError> {
        Ok(&self.parsed()?.1)
    }

    fn renderers(&self) -> &[RendererSlot] {
        &self.renderers
    }

    fn set_renderers(&mut self, renderers: Vec<RendererSlot>) {
        self.renderers = renderers;
    }
}

impl BlobKind for Content {
    type Options = ContentOptions;
    const KIND: &'static str = "content";

    fn create(input_path: PathBuf, options: ContentOptions) -> Self {
        Self {
            input_path,
            layout: options.layout,
            locals: options.locals,
            renderers: options.renderers,
            source: OnceLock::new(),
            url_path: None,
            output_path: None,
            rendered: None,
        }
    }
}

// ============================================================================
// Layout
// ============================================================================

#[derive(Debug, Clone)]
pub struct LayoutOptions {
    pub renderers: Vec<RendererSlot>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            renderers: vec![RendererSlot::Guess],
        }
    }
}

/// A wrapper template. Layouts are referenced by contents, never routed.
#[derive(Debug)]
pub struct Layout {
    input_path: PathBuf,
    renderers: Vec<RendererSlot>,
    body: OnceLock<String>,
}

impl HasInputPath for Layout {
    fn input_path(&self) -> &Path {
        &self.input_path
    }
}

impl Renderable for Layout {
    fn body(&self) -> Result<&str, BlobError> {
        if let Some(body) = self.body.get() {
            return Ok(body);
        }
        let body = read_source(&self.input_path)?;
        Ok(self.body.get_or_init(|| body))
    }

    fn renderers(&self) -> &[RendererSlot] {
        &self.renderers
    }

    fn set_renderers(&mut self, renderers: Vec<RendererSlot>) {
        self.renderers = renderers;
    }
}

impl BlobKind for Layout {
    type Options = LayoutOptions;
    const KIND: &'static str = "layout";

    fn create(input_path: PathBuf, options: LayoutOptions) -> Self {
        Self {
            input_path,
            renderers: options.renderers,
            body: OnceLock::new(),
        }
    }
}
