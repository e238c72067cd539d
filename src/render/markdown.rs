//! Markdown to HTML, for `.md` files.

use super::{Block, RenderError, Renderer, ViewContext};
use pulldown_cmark::{Options, Parser, html};
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct MarkdownRenderer {
    options: Options,
}

impl MarkdownRenderer {
    /// CommonMark plus tables, footnotes, strikethrough and task lists.
    /// Smart punctuation is left off so quotes in templates survive.
    pub fn new() -> Self {
        Self {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS,
        }
    }

    pub fn with_options(options: Options) -> Self {
        Self { options }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for MarkdownRenderer {
    fn name(&self) -> &str {
        "md"
    }

    fn render(
        &self,
        source: &str,
        _view: &ViewContext<'_>,
        _path: Option<&Path>,
        _block: Option<Block<'_>>,
    ) -> Result<String, RenderError> {
        let parser = Parser::new_ext(source, self.options);
        let mut out = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut out, parser);
        Ok(out)
    }
}
