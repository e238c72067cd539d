//! Renderer guessing from chained file extensions.
//!
//! A blob registered with a [`RendererSlot::Guess`] gets its renderers from
//! its file name. Extensions are walked outermost first, and each one found
//! in the [`Guesses`] registry contributes a renderer:
//!
//! ```text
//! post.md.erb  →  extensions [md, erb]  →  walk [erb, md]  →  [Erb, Markdown]
//! ```
//!
//! The chain applies that list first to last, so the outermost extension is
//! the first transformation. Extensions with no registered renderer are
//! skipped.

use super::{ErbRenderer, MarkdownRenderer, Renderer};
use crate::blob::RendererSlot;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// How a guess produces its renderer.
#[derive(Clone)]
pub enum RendererFactory {
    /// A shared instance, handed out as is.
    Instance(Arc<dyn Renderer>),
    /// Invoked each time the extension is guessed.
    Constructor(Arc<dyn Fn() -> Arc<dyn Renderer> + Send + Sync>),
}

impl RendererFactory {
    pub fn build(&self) -> Arc<dyn Renderer> {
        match self {
            RendererFactory::Instance(renderer) => Arc::clone(renderer),
            RendererFactory::Constructor(construct) => construct(),
        }
    }
}

impl fmt::Debug for RendererFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RendererFactory::Instance(r) => write!(f, "Instance({})", r.name()),
            RendererFactory::Constructor(_) => f.write_str("Constructor"),
        }
    }
}

/// Extension → renderer registry.
#[derive(Debug, Clone, Default)]
pub struct Guesses {
    registry: BTreeMap<String, RendererFactory>,
}

impl Guesses {
    /// No guesses at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `erb` and `md`.
    pub fn builtin() -> Self {
        let mut guesses = Self::empty();
        guesses.constructor("erb", || Arc::new(ErbRenderer::new()));
        guesses.constructor("md", || Arc::new(MarkdownRenderer::new()));
        guesses
    }

    pub fn instance(&mut self, extension: impl Into<String>, renderer: Arc<dyn Renderer>) -> &mut Self {
        self.registry
            .insert(extension.into(), RendererFactory::Instance(renderer));
        self
    }

    pub fn constructor(
        &mut self,
        extension: impl Into<String>,
        construct: impl Fn() -> Arc<dyn Renderer> + Send + Sync + 'static,
    ) -> &mut Self {
        self.registry.insert(
            extension.into(),
            RendererFactory::Constructor(Arc::new(construct)),
        );
        self
    }

    pub fn remove(&mut self, extension: &str) -> Option<RendererFactory> {
        self.registry.remove(extension)
    }

    pub fn get(&self, extension: &str) -> Option<&RendererFactory> {
        self.registry.get(extension)
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.registry.contains_key(extension)
    }
}

/// Resolves renderer lists from paths against a [`Guesses`] registry.
#[derive(Debug, Clone, Copy)]
pub struct Guesser<'g> {
    guesses: &'g Guesses,
}

impl<'g> Guesser<'g> {
    pub fn new(guesses: &'g Guesses) -> Self {
        Self { guesses }
    }

    /// Renderers implied by `path`'s extensions, in application order.
    pub fn guess(&self, path: &Path) -> Vec<Arc<dyn Renderer>> {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        basename
            .split('.')
            .skip(1)
            .filter(|ext| !ext.is_empty())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .filter_map(|ext| self.guesses.get(ext))
            .map(RendererFactory::build)
            .collect()
    }

    /// Replace every `Guess` slot with the renderers guessed for `path`.
    pub fn resolve(&self, slots: &[RendererSlot], path: &Path) -> Vec<RendererSlot> {
        slots
            .iter()
            .flat_map(|slot| match slot {
                RendererSlot::Guess => self
                    .guess(path)
                    .into_iter()
                    .map(RendererSlot::Unit)
                    .collect(),
                unit => vec![unit.clone()],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::Tag;

    fn names(renderers: &[Arc<dyn Renderer>]) -> Vec<String> {
        renderers.iter().map(|r| r.name().to_string()).collect()
    }

    #[test]
    fn unregistered_extensions_are_skipped() {
        let mut guesses = Guesses::empty();
        guesses.constructor("erb", || Arc::new(ErbRenderer::new()));
        let guessed = Guesser::new(&guesses).guess(Path::new("posts/post.md.erb"));
        assert_eq!(names(&guessed), vec!["erb"]);
    }

    #[test]
    fn outermost_extension_comes_first() {
        let mut guesses = Guesses::empty();
        guesses.instance("md", Arc::new(Tag("md")));
        guesses.instance("erb", Arc::new(Tag("erb")));
        let guessed = Guesser::new(&guesses).guess(Path::new("post.md.erb"));
        assert_eq!(names(&guessed), vec!["erb", "md"]);
    }

    #[test]
    fn base_name_is_never_an_extension() {
        let mut guesses = Guesses::empty();
        guesses.instance("erb", Arc::new(Tag("erb")));
        assert!(Guesser::new(&guesses).guess(Path::new("erb")).is_empty());
        assert!(Guesser::new(&guesses).guess(Path::new("/a/b/")).is_empty());
    }

    #[test]
    fn instances_are_shared_and_constructors_rebuild() {
        let shared: Arc<dyn Renderer> = Arc::new(Tag("x"));
        let mut guesses = Guesses::empty();
        guesses.instance("x", Arc::clone(&shared));
        guesses.constructor("y", || Arc::new(Tag("y")));
        let guesser = Guesser::new(&guesses);

        let first = guesser.guess(Path::new("a.x"));
        assert!(Arc::ptr_eq(&first[0], &shared));

        let one = guesser.guess(Path::new("a.y"));
        let two = guesser.guess(Path::new("a.y"));
        assert!(!Arc::ptr_eq(&one[0], &two[0]));
    }

    #[test]
    fn resolve_expands_guess_slots_in_place() {
        let mut guesses = Guesses::empty();
        guesses.instance("erb", Arc::new(Tag("erb")));
        let slots = vec![
            RendererSlot::unit(Tag("before")),
            RendererSlot::Guess,
            RendererSlot::unit(Tag("after")),
        ];
        let resolved = Guesser::new(&guesses).resolve(&slots, Path::new("page.erb"));
        let rendered: Vec<String> = resolved.iter().map(|s| format!("{s:?}")).collect();
        assert_eq!(rendered, vec!["Unit(before)", "Unit(erb)", "Unit(after)"]);
    }

    #[test]
    fn builtin_knows_erb_and_markdown() {
        let guesses = Guesses::builtin();
        let guessed = Guesser::new(&guesses).guess(Path::new("post.md.erb"));
        assert_eq!(names(&guessed), vec!["erb", "md"]);
    }
}
