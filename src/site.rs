//! The site-build phase.
//!
//! A [`Site`] owns everything the compiler works on: the three blob
//! registries, the route map, the renderer-guess registry and the view
//! helpers. It is set up exactly once through [`Site::rules`]:
//!
//! ```text
//! Site::new(config)
//!     │  guesses / helpers adjusted
//!     ▼
//! site.rules(|r| { register blobs, assign routes })
//!     │  Guess slots resolved from file names
//!     │  registries and route map closed
//!     ▼
//! Compiler::compile_everything(&mut site)
//! ```
//!
//! After `rules` returns, no blob can be registered and no route assigned;
//! the compiler only updates fields of blobs that already exist.

use crate::blob::{Asset, BlobError, Content, HasInputPath, Layout, Renderable};
use crate::blobs::Blobs;
use crate::config::Config;
use crate::render::{Guesser, Guesses, ViewContext, ViewHelper};
use crate::routes::{RouteError, RouteIdentifiers};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("Route error: {0}")]
    Route(#[from] RouteError),
    #[error("Rules error: {0}")]
    Rules(String),
}

/// Mutable handles given to the rules callback.
pub struct Rules<'s> {
    pub assets: &'s mut Blobs<Asset>,
    pub layouts: &'s mut Blobs<Layout>,
    pub contents: &'s mut Blobs<Content>,
    pub routes: &'s mut RouteIdentifiers,
    /// Read-only: guesses are fixed before the rules run.
    pub guesses: &'s Guesses,
}

pub struct Site {
    config: Config,
    routes: RouteIdentifiers,
    assets: Blobs<Asset>,
    layouts: Blobs<Layout>,
    contents: Blobs<Content>,
    guesses: Guesses,
    view_helpers: Vec<Arc<dyn ViewHelper>>,
}

impl Site {
    /// Empty registries rooted at the configured source directories, with
    /// the built-in `erb` and `md` guesses.
    pub fn new(config: Config) -> Self {
        Self {
            routes: RouteIdentifiers::new(),
            assets: Blobs::new(config.assets_path()),
            layouts: Blobs::new(config.layouts_path()),
            contents: Blobs::new(config.contents_path()),
            guesses: Guesses::builtin(),
            view_helpers: Vec::new(),
            config,
        }
    }

    pub fn with_guesses(mut self, guesses: Guesses) -> Self {
        self.guesses = guesses;
        self
    }

    /// Add a helper available to every template.
    pub fn helper(&mut self, helper: Arc<dyn ViewHelper>) -> &mut Self {
        self.view_helpers.push(helper);
        self
    }

    /// Run the site-build phase.
    ///
    /// `define` registers blobs and assigns routes. Afterwards every
    /// `Guess` slot of every layout and content is replaced by the renderers
    /// guessed from its file name, and all registries and the route map are
    /// closed. A second call fails as soon as it tries to register anything.
    pub fn rules<F>(&mut self, define: F) -> Result<(), SiteError>
    where
        F: FnOnce(&mut Rules<'_>) -> Result<(), SiteError>,
    {
        define(&mut Rules {
            assets: &mut self.assets,
            layouts: &mut self.layouts,
            contents: &mut self.contents,
            routes: &mut self.routes,
            guesses: &self.guesses,
        })?;

        let guesser = Guesser::new(&self.guesses);
        for layout in self.layouts.iter_mut() {
            let renderers = guesser.resolve(layout.renderers(), layout.input_path());
            debug!(layout = %layout.input_path().display(), ?renderers, "resolved renderers");
            layout.set_renderers(renderers);
        }
        for content in self.contents.iter_mut() {
            let renderers = guesser.resolve(content.renderers(), content.input_path());
            debug!(content = %content.input_path().display(), ?renderers, "resolved renderers");
            content.set_renderers(renderers);
        }

        self.assets.close();
        self.layouts.close();
        self.contents.close();
        self.routes.close();

        info!(
            assets = self.assets.len(),
            layouts = self.layouts.len(),
            contents = self.contents.len(),
            routes = self.routes.len(),
            "site rules applied"
        );
        Ok(())
    }

    /// True once [`rules`](Self::rules) has completed.
    pub fn is_built(&self) -> bool {
        self.routes.is_closed()
    }

    /// View context for rendering `content`, with every site helper attached.
    pub fn view_context<'s>(&'s self, content: &'s Content) -> Result<ViewContext<'s>, BlobError> {
        let mut view = ViewContext::new(
            &self.routes,
            &self.layouts,
            &self.assets,
            &self.contents,
            content.locals(),
            content.frontmatter()?,
        );
        for helper in &self.view_helpers {
            view.extend(Arc::clone(helper));
        }
        Ok(view)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn routes(&self) -> &RouteIdentifiers {
        &self.routes
    }

    pub fn assets(&self) -> &Blobs<Asset> {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut Blobs<Asset> {
        &mut self.assets
    }

    pub fn layouts(&self) -> &Blobs<Layout> {
        &self.layouts
    }

    pub fn contents(&self) -> &Blobs<Content> {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut Blobs<Content> {
        &mut self.contents
    }

    pub fn guesses(&self) -> &Guesses {
        &self.guesses
    }
}
