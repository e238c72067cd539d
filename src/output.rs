//! CLI output formatting for `build` and `check`.
//!
//! # Route-First Display
//!
//! Output is organised around **routes**, not files. Each content leads with
//! the route it is served at; the source file, layout and renderers appear as
//! indented context lines. Paths are shown relative to the site root (sources)
//! or the output root (destinations) so the listing stays short.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Routes
//! 001 /
//!     Source: contents/index.html.erb
//!     Layout: layouts/default.html.erb
//!     Renderers: erb
//! 002 /blog/
//!     Source: contents/blog/index.html.md.erb
//!     Renderers: erb, md
//!
//! Assets
//!     app.js (entrypoint)
//!     img/logo.png
//! ```
//!
//! ## Build
//!
//! ```text
//! Assets
//!     /assets/app.js ← assets/app.js
//!
//! Contents
//! 001 / → index.html
//! 002 /blog/ → blog/index.html (unchanged)
//! 003 /escape → ../escape (skipped: outside output root)
//!
//! Compiled 1 asset, 3 contents (1 written, 1 unchanged, 1 skipped) → tmp/build-development
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::blob::{HasInputPath, Renderable, RendererSlot};
use crate::compiler::{CompileReport, WriteOutcome};
use crate::paths;
use crate::routes::RouteTarget;
use crate::site::Site;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// `path` relative to `base` with forward slashes, or the full path when
/// outside it.
fn display_path(path: &Path, base: &Path) -> String {
    match paths::relative_to(path, base) {
        Some(relative) => paths::to_slash(&relative),
        None => path.display().to_string(),
    }
}

fn plural(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

/// Comma-separated renderer names; unresolved slots show as `?`.
fn renderer_names(slots: &[RendererSlot]) -> String {
    slots
        .iter()
        .map(|slot| match slot {
            RendererSlot::Guess => "?".to_string(),
            RendererSlot::Unit(renderer) => renderer.name().to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Check output
// ============================================================================

/// Format the route table of a built site.
///
/// Routes appear in assignment order. Contents without a route are not
/// listed; assets are listed by their path under the assets directory.
pub fn format_route_table(site: &Site) -> Vec<String> {
    let root = site.config().root();
    let mut lines = vec!["Routes".to_string()];

    for (i, (route, target)) in site.routes().iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), route));
        lines.push(format!(
            "    Source: {}",
            display_path(target.input_path(), root)
        ));
        match target {
            RouteTarget::Content(input_path) => {
                if let Ok(content) = site.contents().get(input_path) {
                    if let Some(layout) = content.layout() {
                        lines.push(format!("    Layout: {}", display_path(layout, root)));
                    }
                    let renderers = renderer_names(content.renderers());
                    if !renderers.is_empty() {
                        lines.push(format!("    Renderers: {renderers}"));
                    }
                }
            }
            RouteTarget::Asset(_) => lines.push("    Asset".to_string()),
        }
    }

    if !site.assets().is_empty() {
        lines.push(String::new());
        lines.push("Assets".to_string());
        let assets_root = site.assets().scoped_root();
        for asset in site.assets().iter() {
            let name = display_path(asset.input_path(), assets_root);
            if asset.is_entrypoint() {
                lines.push(format!("    {name} (entrypoint)"));
            } else {
                lines.push(format!("    {name}"));
            }
        }
    }

    lines
}

/// Print the route table to stdout.
pub fn print_route_table(site: &Site) {
    for line in format_route_table(site) {
        println!("{}", line);
    }
}

// ============================================================================
// Build output
// ============================================================================

/// Format the result of a compile run.
///
/// `root` is the site root; asset inputs are shown relative to it and
/// content destinations relative to the report's output root.
pub fn format_compile_report(report: &CompileReport, root: &Path) -> Vec<String> {
    let mut lines = Vec::new();

    if !report.assets.is_empty() {
        lines.push("Assets".to_string());
        for asset in &report.assets {
            lines.push(format!(
                "    {} \u{2190} {}",
                asset.url_path,
                display_path(&asset.input_path, root)
            ));
        }
        lines.push(String::new());
    }

    lines.push("Contents".to_string());
    for (i, content) in report.contents.iter().enumerate() {
        let destination = display_path(&content.destination, &report.output_root);
        let suffix = match content.outcome {
            WriteOutcome::Written => "",
            WriteOutcome::Unchanged => " (unchanged)",
            WriteOutcome::OutsideOutputRoot => " (skipped: outside output root)",
        };
        lines.push(format!(
            "{} {} \u{2192} {}{}",
            format_index(i + 1),
            content.route,
            destination,
            suffix
        ));
    }

    lines.push(String::new());
    lines.push(format!(
        "Compiled {}, {} ({} written, {} unchanged, {} skipped) \u{2192} {}",
        plural(report.assets.len(), "asset", "assets"),
        plural(report.contents.len(), "content", "contents"),
        report.count(WriteOutcome::Written),
        report.count(WriteOutcome::Unchanged),
        report.count(WriteOutcome::OutsideOutputRoot),
        display_path(&report.output_root, root)
    ));

    lines
}

/// Print a compile report to stdout.
pub fn print_compile_report(report: &CompileReport, root: &Path) {
    for line in format_compile_report(report, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
