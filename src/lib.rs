//! # Confine
//!
//! A static site compiler. A site is three directories of source files
//! (assets, layouts, contents), a map from URL routes to those files, and a
//! chain of renderers per file. Compiling a site hands the asset entry points
//! to an external bundler, reads back what it produced, then renders every
//! routed content through its chain and layout into an output directory.
//!
//! # Architecture: Two Phases
//!
//! ```text
//! 1. Site build   Site::rules(|r| …)          register blobs, assign routes,
//!                                              resolve renderer guesses, close
//! 2. Compile      Compiler::compile_everything  bundle assets, reconcile report,
//!                                              render + write each route
//! ```
//!
//! Everything the compiler reads is fixed by the end of phase 1: registries and
//! the route map are closed, so phase 2 only fills in per-blob results (asset
//! bodies and URLs, rendered content).
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`paths`] | Pure path helpers: joining under a root, cleaning, containment |
//! | [`frontmatter`] | Leading `---` YAML header parsing |
//! | [`blob`] | The three blob kinds (`Asset`, `Layout`, `Content`) and their traits |
//! | [`blobs`] | Per-kind registries scoped to one source directory |
//! | [`routes`] | Route normalisation and the route → blob map |
//! | [`render`] | Renderer trait, render chains, view context, guesses, `erb` and `md` |
//! | [`site`] | The site-build phase: `Site::rules` |
//! | [`bundler`] | Bundler invocation and report parsing |
//! | [`compiler`] | The compile phase: assets, then contents |
//! | [`conventions`] | Directory-driven rules used by the CLI |
//! | [`config`] | `site.toml` loading, defaults and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Closed Registries
//!
//! Blobs and routes may only be created inside [`site::Site::rules`]. The
//! compiler holds `&mut Site` and could in principle register more; closing
//! the registries turns that into an error instead of a silently incomplete
//! build.
//!
//! ## Opaque Renderers
//!
//! A renderer is a `(body, view, path, block) → body` function. The compiler
//! never inspects template syntax; layouts work by passing the content's
//! rendered output as the block of the layout's chain. New template languages
//! plug in through [`render::Guesses`] without touching the compiler.
//!
//! ## Unchanged Files Are Not Rewritten
//!
//! A destination whose bytes already equal the rendered output is left alone,
//! so file watchers and rsync see only what actually changed.
//!
//! ## External Bundling
//!
//! Asset compilation is delegated to a bundler process (Parcel by default).
//! Confine only builds the command line and parses the bundler's summary
//! report, mapping each output back to the source assets it was built from.

pub mod blob;
pub mod blobs;
pub mod bundler;
pub mod compiler;
pub mod config;
pub mod conventions;
pub mod frontmatter;
pub mod output;
pub mod paths;
pub mod render;
pub mod routes;
pub mod site;
