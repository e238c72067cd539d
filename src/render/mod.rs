//! Render chains and the view context templates see.
//!
//! # Renderers
//!
//! A [`Renderer`] is an opaque string transformer: it receives the body so
//! far, the [`ViewContext`], the originating path and an optional block (the
//! continuation standing for "yielded" content) and returns a new body. The
//! core never looks inside; [`erb`] and [`markdown`] are the two shipped
//! units.
//!
//! # Render Chains
//!
//! A [`RenderChain`] folds a renderer list over a body, first to last:
//!
//! ```text
//! body ──▶ renderers[0] ──▶ renderers[1] ──▶ … ──▶ result
//! ```
//!
//! Renderer lists for `post.md.erb` are guessed as `[erb, md]` (see
//! [`guess`]), so the template runs first and its output is then converted
//! from Markdown.
//!
//! # Layouts
//!
//! [`ViewContext::render`] runs a blob's chain and, when a layout is given,
//! feeds the result as the block of a second chain over the layout's body.
//! Both chains share the same view context, so a layout can read the
//! content's locals and frontmatter.

pub mod erb;
pub mod guess;
pub mod markdown;

pub use erb::ErbRenderer;
pub use guess::{Guesser, Guesses, RendererFactory};
pub use markdown::MarkdownRenderer;

use crate::blob::{
    Asset, BlobError, Content, HasInputPath, Layout, Renderable, RendererSlot, Routable,
};
use crate::blobs::Blobs;
use crate::frontmatter::Frontmatter;
use crate::routes::{RouteError, RouteIdentifiers, RouteTarget};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("Route error: {0}")]
    Route(#[from] RouteError),
    #[error("Unresolved renderer guess for {0}")]
    UnresolvedGuess(PathBuf),
    #[error("Template syntax error in {path}: {message}")]
    Syntax { path: String, message: String },
    #[error("Unknown name: {0}")]
    UnknownName(String),
    #[error("Cannot index into {0}")]
    NotIndexable(String),
    #[error("Cannot iterate over {0}")]
    NotIterable(String),
    #[error("Cannot render {0}")]
    NotRenderable(String),
    #[error("Cannot print {0}")]
    Unprintable(String),
    #[error("yield called without a block")]
    NoBlock,
    #[error("Unknown helper: {0}")]
    UnknownHelper(String),
    #[error("Wrong arguments for {name}: {message}")]
    Arguments { name: String, message: String },
    #[error("Helper {name} failed: {message}")]
    Helper { name: String, message: String },
}

/// The continuation handed to renderers: produces the yielded content.
pub type Block<'b> = &'b dyn Fn() -> Result<String, RenderError>;

/// A pluggable body transformer.
pub trait Renderer: Send + Sync {
    /// Short name used in logs and debug output.
    fn name(&self) -> &str;

    fn render(
        &self,
        source: &str,
        view: &ViewContext<'_>,
        path: Option<&Path>,
        block: Option<Block<'_>>,
    ) -> Result<String, RenderError>;
}

/// A named function templates can call, e.g. `<%= link_to("Home", "/") %>`.
///
/// Helpers are attached to every view context before rendering.
pub trait ViewHelper: Send + Sync {
    fn name(&self) -> &str;

    fn call(&self, view: &ViewContext<'_>, args: &[Value]) -> Result<Value, RenderError>;
}

/// Ordered application of renderers to one body.
pub struct RenderChain<'a, 'v> {
    body: &'a str,
    path: Option<&'a Path>,
    renderers: &'a [RendererSlot],
    view: &'a ViewContext<'v>,
}

impl<'a, 'v> RenderChain<'a, 'v> {
    pub fn new(
        body: &'a str,
        path: Option<&'a Path>,
        renderers: &'a [RendererSlot],
        view: &'a ViewContext<'v>,
    ) -> Self {
        Self {
            body,
            path,
            renderers,
            view,
        }
    }

    /// Chain over a blob's own body and renderer list.
    pub fn for_blob(blob: &'a dyn Renderable, view: &'a ViewContext<'v>) -> Result<Self, RenderError> {
        Ok(Self::new(
            blob.body()?,
            Some(blob.input_path()),
            blob.renderers(),
            view,
        ))
    }

    pub fn invoke(&self, block: Option<Block<'_>>) -> Result<String, RenderError> {
        let mut memo = self.body.to_string();
        for slot in self.renderers {
            match slot {
                RendererSlot::Unit(renderer) => {
                    memo = renderer.render(&memo, self.view, self.path, block)?;
                }
                RendererSlot::Guess => {
                    let path = self.path.map(Path::to_path_buf).unwrap_or_default();
                    return Err(RenderError::UnresolvedGuess(path));
                }
            }
        }
        Ok(memo)
    }
}

/// A blob borrowed out of one of the site's registries.
#[derive(Debug, Clone, Copy)]
pub enum BlobRef<'v> {
    Asset(&'v Asset),
    Content(&'v Content),
    Layout(&'v Layout),
}

impl<'v> BlobRef<'v> {
    pub fn input_path(&self) -> &'v Path {
        match self {
            BlobRef::Asset(a) => a.input_path(),
            BlobRef::Content(c) => c.input_path(),
            BlobRef::Layout(l) => l.input_path(),
        }
    }

    pub fn url_path(&self) -> Option<&'v str> {
        match self {
            BlobRef::Asset(a) => a.url_path(),
            BlobRef::Content(c) => c.url_path(),
            BlobRef::Layout(_) => None,
        }
    }

    pub fn as_renderable(&self) -> Option<&'v dyn Renderable> {
        match self {
            BlobRef::Asset(_) => None,
            BlobRef::Content(c) => Some(*c),
            BlobRef::Layout(l) => Some(*l),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BlobRef::Asset(_) => "asset",
            BlobRef::Content(_) => "content",
            BlobRef::Layout(_) => "layout",
        }
    }
}

/// Everything a template can see during one top-level render.
///
/// Read-only views of the site's registries and route map, plus the locals
/// and frontmatter of the blob being compiled. One context serves a content
/// render and its layout render. Compiled templates are cached here, so a
/// partial rendered many times is compiled once per context.
pub struct ViewContext<'v> {
    routes: &'v RouteIdentifiers,
    layouts: &'v Blobs<Layout>,
    assets: &'v Blobs<Asset>,
    contents: &'v Blobs<Content>,
    locals: &'v Map<String, Value>,
    frontmatter: &'v Frontmatter,
    helpers: Vec<Arc<dyn ViewHelper>>,
    compiled: RefCell<HashMap<String, Rc<erb::Template>>>,
}

impl<'v> ViewContext<'v> {
    pub fn new(
        routes: &'v RouteIdentifiers,
        layouts: &'v Blobs<Layout>,
        assets: &'v Blobs<Asset>,
        contents: &'v Blobs<Content>,
        locals: &'v Map<String, Value>,
        frontmatter: &'v Frontmatter,
    ) -> Self {
        Self {
            routes,
            layouts,
            assets,
            contents,
            locals,
            frontmatter,
            helpers: Vec::new(),
            compiled: RefCell::new(HashMap::new()),
        }
    }

    /// Attach a helper. Later helpers shadow earlier ones with the same name.
    pub fn extend(&mut self, helper: Arc<dyn ViewHelper>) {
        self.helpers.push(helper);
    }

    pub fn routes(&self) -> &'v RouteIdentifiers {
        self.routes
    }

    pub fn layouts(&self) -> &'v Blobs<Layout> {
        self.layouts
    }

    pub fn assets(&self) -> &'v Blobs<Asset> {
        self.assets
    }

    pub fn contents(&self) -> &'v Blobs<Content> {
        self.contents
    }

    pub fn locals(&self) -> &'v Map<String, Value> {
        self.locals
    }

    pub fn frontmatter(&self) -> &'v Frontmatter {
        self.frontmatter
    }

    /// Frontmatter overlaid with locals; locals win.
    pub fn input(&self) -> Map<String, Value> {
        let mut input = self.frontmatter.clone();
        input.extend(self.locals.iter().map(|(k, v)| (k.clone(), v.clone())));
        input
    }

    pub fn helper(&self, name: &str) -> Option<&dyn ViewHelper> {
        self.helpers
            .iter()
            .rev()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
    }

    /// Blob bound to `route`.
    pub fn resolve_route(&self, route: &str) -> Result<BlobRef<'v>, RenderError> {
        Ok(match self.routes.resolve(route)? {
            RouteTarget::Content(path) => BlobRef::Content(self.contents.get(path)?),
            RouteTarget::Asset(path) => BlobRef::Asset(self.assets.get(path)?),
        })
    }

    /// Render `blob` through its chain, then wrap it in `layout`'s chain.
    ///
    /// When a `block` is supplied it is captured into its own buffer each
    /// time the blob's template yields.
    pub fn render(
        &self,
        blob: &dyn Renderable,
        layout: Option<&Layout>,
        block: Option<Block<'_>>,
    ) -> Result<String, RenderError> {
        let chain = RenderChain::for_blob(blob, self)?;
        let rendered = chain.invoke(block)?;

        let Some(layout) = layout else {
            return Ok(rendered);
        };
        let yielded = || -> Result<String, RenderError> { Ok(rendered.clone()) };
        RenderChain::for_blob(layout, self)?.invoke(Some(&yielded))
    }

    /// Compiled template for `key`, compiling it on first use.
    pub(crate) fn compiled_template(
        &self,
        key: &str,
        compile: impl FnOnce() -> Result<erb::Template, RenderError>,
    ) -> Result<Rc<erb::Template>, RenderError> {
        if let Some(template) = self.compiled.borrow().get(key) {
            return Ok(Rc::clone(template));
        }
        let template = Rc::new(compile()?);
        self.compiled
            .borrow_mut()
            .insert(key.to_string(), Rc::clone(&template));
        Ok(template)
    }

    /// Number of distinct templates compiled in this context.
    pub fn compiled_template_count(&self) -> usize {
        self.compiled.borrow().len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blob::{BlobKind, ContentOptions, LayoutOptions};

    /// Renderer that appends its tag, for checking application order.
    pub struct Tag(pub &'static str);

    impl Renderer for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn render(
            &self,
            source: &str,
            _view: &ViewContext<'_>,
            _path: Option<&Path>,
            block: Option<Block<'_>>,
        ) -> Result<String, RenderError> {
            let yielded = match block {
                Some(block) => format!("({})", block()?),
                None => String::new(),
            };
            Ok(format!("{source}+{}{yielded}", self.0))
        }
    }

    pub struct Empty {
        pub routes: RouteIdentifiers,
        pub layouts: Blobs<Layout>,
        pub assets: Blobs<Asset>,
        pub contents: Blobs<Content>,
        pub locals: Map<String, Value>,
        pub frontmatter: Frontmatter,
    }

    impl Empty {
        pub fn new() -> Self {
            Self {
                routes: RouteIdentifiers::new(),
                layouts: Blobs::new("/site/layouts"),
                assets: Blobs::new("/site/assets"),
                contents: Blobs::new("/site/contents"),
                locals: Map::new(),
                frontmatter: Frontmatter::new(),
            }
        }

        pub fn view(&self) -> ViewContext<'_> {
            ViewContext::new(
                &self.routes,
                &self.layouts,
                &self.assets,
                &self.contents,
                &self.locals,
                &self.frontmatter,
            )
        }
    }

    #[test]
    fn chain_applies_renderers_in_list_order() {
        let site = Empty::new();
        let view = site.view();
        let renderers = vec![RendererSlot::unit(Tag("a")), RendererSlot::unit(Tag("b"))];
        let chain = RenderChain::new("body", None, &renderers, &view);
        assert_eq!(chain.invoke(None).unwrap(), "body+a+b");
    }

    #[test]
    fn empty_chain_returns_body() {
        let site = Empty::new();
        let view = site.view();
        let chain = RenderChain::new("untouched", None, &[], &view);
        assert_eq!(chain.invoke(None).unwrap(), "untouched");
    }

    #[test]
    fn chain_passes_block_to_renderers() {
        let site = Empty::new();
        let view = site.view();
        let renderers = vec![RendererSlot::unit(Tag("a"))];
        let block = || -> Result<String, RenderError> { Ok("inner".to_string()) };
        let chain = RenderChain::new("x", None, &renderers, &view);
        assert_eq!(chain.invoke(Some(&block)).unwrap(), "x+a(inner)");
    }

    #[test]
    fn leftover_guess_is_an_error() {
        let site = Empty::new();
        let view = site.view();
        let renderers = vec![RendererSlot::Guess];
        let chain = RenderChain::new("x", Some(Path::new("/c/a.erb")), &renderers, &view);
        assert!(matches!(
            chain.invoke(None),
            Err(RenderError::UnresolvedGuess(p)) if p == Path::new("/c/a.erb")
        ));
    }

    #[test]
    fn layout_receives_rendered_content_as_block() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("page"), "page").unwrap();
        std::fs::write(tmp.path().join("wrap"), "wrap").unwrap();

        let content = Content::create(
            tmp.path().join("page"),
            ContentOptions::default().renderers(vec![RendererSlot::unit(Tag("c"))]),
        );
        let layout = Layout::create(
            tmp.path().join("wrap"),
            LayoutOptions {
                renderers: vec![RendererSlot::unit(Tag("l"))],
            },
        );

        let site = Empty::new();
        let view = site.view();
        assert_eq!(
            view.render(&content, Some(&layout), None).unwrap(),
            "wrap+l(page+c)"
        );
        assert_eq!(view.render(&content, None, None).unwrap(), "page+c");
    }

    #[test]
    fn input_prefers_locals() {
        let mut site = Empty::new();
        site.frontmatter.insert("title".into(), "fm".into());
        site.frontmatter.insert("only_fm".into(), 1.into());
        site.locals.insert("title".into(), "local".into());

        let input = site.view().input();
        assert_eq!(input["title"], "local");
        assert_eq!(input["only_fm"], 1);
    }
}
