//! Directory conventions used by the `confine` binary.
//!
//! A library user writes their own [`Site::rules`](crate::site::Site::rules)
//! callback. The binary uses [`apply`], which derives everything from the
//! source tree:
//!
//! | Source | Registered as | Route |
//! |--------|---------------|-------|
//! | `assets/app.js` | entrypoint asset (matches `conventions.entrypoints`) | none |
//! | `assets/img/logo.png` | plain asset | none |
//! | `layouts/default.html.erb` | layout | none |
//! | `contents/index.html.erb` | content | `/` |
//! | `contents/blog/index.html.md.erb` | content | `/blog/` |
//! | `contents/about.html.md` | content | `/about.html` |
//! | `contents/feed.xml.erb` | content | `/feed.xml` |
//!
//! Routes drop the trailing extensions that have a registered renderer guess,
//! and a remaining file name equal to the directory index becomes the
//! directory's route.
//!
//! A content's layout is its frontmatter `layout` key, relative to the
//! layouts directory. Without the key, `conventions.default_layout` is used
//! when that file exists. `layout: false` or `layout: null` opts out.

use crate::blob::{Asset, AssetOptions, ContentOptions};
use crate::blobs::Blobs;
use crate::config::Config;
use crate::render::Guesses;
use crate::routes;
use crate::site::{Rules, SiteError};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static ANY_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(".*").expect("catch-all pattern is valid"));

/// Register every source file and route every content.
pub fn apply(rules: &mut Rules<'_>, config: &Config) -> Result<(), SiteError> {
    let conventions = &config.site().conventions;

    let entrypoints = conventions
        .entrypoints
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| {
                SiteError::Rules(format!("invalid entrypoint pattern {pattern:?}: {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    register_assets(rules.assets, &entrypoints)?;

    rules.layouts.register_many(&ANY_FILE)?;

    let default_layout = conventions
        .default_layout
        .as_deref()
        .filter(|name| rules.layouts.lookup(name).is_ok());

    let index = config.output_directory_index();
    let files: Vec<String> = rules
        .contents
        .files()
        .iter()
        .map(|(relpath, _)| relpath.clone())
        .collect();

    for relpath in files {
        let content = rules.contents.register(&relpath, ContentOptions::default())?;

        let layout = match content.frontmatter()?.get("layout") {
            None => default_layout.map(str::to_string),
            Some(Value::Null | Value::Bool(false)) => None,
            Some(Value::String(name)) => Some(name.clone()),
            Some(other) => {
                return Err(SiteError::Rules(format!(
                    "{relpath}: layout must be a file name, got {other}"
                )));
            }
        };
        if let Some(name) = &layout {
            content.set_layout(Some(rules.layouts.lookup(name)?));
        }

        let route = route_for(&relpath, rules.guesses, index);
        debug!(content = %relpath, route = %route, layout = ?layout, "routed content");
        rules.routes.assign(&route, content)?;
    }
    Ok(())
}

/// Register every asset, flagging those matching an entrypoint pattern.
fn register_assets(assets: &mut Blobs<Asset>, entrypoints: &[Regex]) -> Result<(), SiteError> {
    let files: Vec<String> = assets.files().iter().map(|(relpath, _)| relpath.clone()).collect();
    for relpath in files {
        let entrypoint = entrypoints.iter().any(|pattern| pattern.is_match(&relpath));
        assets.register(&relpath, AssetOptions { entrypoint })?;
    }
    Ok(())
}

/// Route for a content at `relpath` (slash-separated, relative to the
/// contents directory).
pub fn route_for(relpath: &str, guesses: &Guesses, index: &str) -> String {
    let (dir, file) = relpath.rsplit_once('/').unwrap_or(("", relpath));

    let mut name = file;
    while let Some((stem, extension)) = name.rsplit_once('.') {
        if stem.is_empty() || !guesses.contains(extension) {
            break;
        }
        name = stem;
    }

    let path = if name == index {
        format!("{dir}/")
    } else {
        format!("{dir}/{name}")
    };
    routes::normalize(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Routable;
    use crate::config::SiteConfig;
    use crate::site::Site;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn routes_strip_renderer_extensions() {
        let guesses = Guesses::builtin();
        let route = |p: &str| route_for(p, &guesses, "index.html");
        assert_eq!(route("index.html.erb"), "/");
        assert_eq!(route("blog/index.html.md.erb"), "/blog/");
        assert_eq!(route("about.html.md"), "/about.html");
        assert_eq!(route("feed.xml.erb"), "/feed.xml");
        assert_eq!(route("notes.txt"), "/notes.txt");
        assert_eq!(route("docs/a/b.html"), "/docs/a/b.html");
    }

    #[test]
    fn dotfiles_keep_their_name() {
        assert_eq!(route_for(".erb", &Guesses::builtin(), "index.html"), "/.erb");
    }

    fn write(root: &Path, relpath: &str, body: &str) {
        let path = root.join(relpath);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn built_site(files: &[(&str, &str)]) -> (TempDir, Result<Site, SiteError>) {
        let tmp = TempDir::new().unwrap();
        for dir in ["assets", "contents", "layouts"] {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        for (relpath, body) in files {
            write(tmp.path(), relpath, body);
        }
        let config = Config::new(tmp.path(), SiteConfig::default(), "test").unwrap();
        let mut site = Site::new(config.clone());
        let result = site.rules(|rules| apply(rules, &config)).map(|()| site);
        (tmp, result)
    }

    #[test]
    fn registers_the_whole_tree() {
        let (_tmp, site) = built_site(&[
            ("assets/app.js", ""),
            ("assets/app.css", ""),
            ("assets/lib/util.ts", ""),
            ("layouts/default.html.erb", "<%= yield %>"),
            ("contents/index.html.erb", "home"),
            ("contents/blog/index.html.md", "# Blog"),
        ]);
        let site = site.unwrap();

        assert!(site.assets().lookup("app.js").unwrap().is_entrypoint());
        assert!(site.assets().lookup("app.css").unwrap().is_entrypoint());
        assert!(!site.assets().lookup("lib/util.ts").unwrap().is_entrypoint());

        let routes: Vec<&str> = site.routes().iter().map(|(route, _)| route).collect();
        assert_eq!(routes, vec!["/blog/", "/"]);
        assert_eq!(
            site.contents().lookup("index.html.erb").unwrap().url_path(),
            Some("/")
        );
    }

    #[test]
    fn layouts_come_from_frontmatter_or_default() {
        let (_tmp, site) = built_site(&[
            ("layouts/default.html.erb", "<%= yield %>"),
            ("layouts/post.html.erb", "<%= yield %>"),
            ("contents/a.html.erb", "plain"),
            ("contents/b.html.erb", "---\nlayout: post.html.erb\n---\nb"),
            ("contents/c.html.erb", "---\nlayout: false\n---\nc"),
        ]);
        let site = site.unwrap();
        let layout_of = |relpath: &str| {
            site.contents()
                .lookup(relpath)
                .unwrap()
                .layout()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        };

        assert_eq!(layout_of("a.html.erb").as_deref(), Some("default.html.erb"));
        assert_eq!(layout_of("b.html.erb").as_deref(), Some("post.html.erb"));
        assert_eq!(layout_of("c.html.erb"), None);
        assert_eq!(site.layouts().len(), 2);
    }

    #[test]
    fn missing_default_layout_is_ignored() {
        let (_tmp, site) = built_site(&[("contents/a.html.erb", "plain")]);
        let site = site.unwrap();
        assert!(site.contents().lookup("a.html.erb").unwrap().layout().is_none());
    }

    #[test]
    fn unknown_frontmatter_layout_fails() {
        let (_tmp, site) = built_site(&[("contents/a.html.erb", "---\nlayout: nope.erb\n---\nx")]);
        assert!(matches!(site, Err(SiteError::Blob(_))));
    }

    #[test]
    fn colliding_routes_fail() {
        let (_tmp, site) = built_site(&[
            ("contents/about.html.erb", "a"),
            ("contents/about.html.md", "b"),
        ]);
        assert!(matches!(site, Err(SiteError::Route(_))));
    }
}
