//! Route identifier map.
//!
//! Maps normalized URL paths to the single content or asset blob that owns
//! them. The map is append-only: a route can be assigned once, and no route
//! can be assigned after the site-build phase closes the map.
//!
//! It is called a map of route *identifiers* because the key is the name the
//! site refers to a blob by; the blob's own `url_path` is what gets written.
//! For contents the two are the same. For assets the bundler may later move
//! the file (hashed names, a different directory) and update the blob's
//! `url_path` while the identifier stays fixed.

use crate::blob::Routable;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Can't add route {0} after the initial setup")]
    RouteMapClosed(String),
    #[error("Route already defined: {0}")]
    DuplicateRoute(String),
    #[error("Route is not defined: {0}")]
    UndefinedRoute(String),
}

/// Which registry a route's blob lives in, keyed by absolute input path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteTarget {
    Content(PathBuf),
    Asset(PathBuf),
}

impl RouteTarget {
    pub fn input_path(&self) -> &Path {
        match self {
            RouteTarget::Content(path) | RouteTarget::Asset(path) => path,
        }
    }
}

/// Prefix `route` with `/` and collapse runs of `/` into one.
///
/// ```
/// assert_eq!(confine::routes::normalize("foo//bar"), "/foo/bar");
/// assert_eq!(confine::routes::normalize("/about/"), "/about/");
/// ```
pub fn normalize(route: &str) -> String {
    let mut normalized = String::with_capacity(route.len() + 1);
    normalized.push('/');
    for c in route.chars() {
        if c == '/' && normalized.ends_with('/') {
            continue;
        }
        normalized.push(c);
    }
    normalized
}

#[derive(Debug, Default)]
pub struct RouteIdentifiers {
    entries: Vec<(String, RouteTarget)>,
    index: HashMap<String, usize>,
    closed: bool,
}

impl RouteIdentifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `route` to `blob` and set the blob's URL path.
    pub fn assign(&mut self, route: &str, blob: &mut impl Routable) -> Result<(), RouteError> {
        let route = normalize(route);
        if self.closed {
            return Err(RouteError::RouteMapClosed(route));
        }
        if self.index.contains_key(&route) {
            return Err(RouteError::DuplicateRoute(route));
        }

        blob.set_url_path(&route);
        self.index.insert(route.clone(), self.entries.len());
        self.entries.push((route, blob.route_target()));
        Ok(())
    }

    pub fn resolve(&self, route: &str) -> Result<&RouteTarget, RouteError> {
        let route = normalize(route);
        self.index
            .get(&route)
            .map(|&i| &self.entries[i].1)
            .ok_or(RouteError::UndefinedRoute(route))
    }

    pub fn contains(&self, route: &str) -> bool {
        self.index.contains_key(&normalize(route))
    }

    /// Routes in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RouteTarget)> {
        self.entries.iter().map(|(route, target)| (route.as_str(), target))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{Asset, AssetOptions, BlobKind, Content, ContentOptions};

    fn content(path: &str) -> Content {
        Content::create(PathBuf::from(path), ContentOptions::default())
    }

    #[test]
    fn normalize_adds_leading_slash_and_squeezes() {
        assert_eq!(normalize("foo//bar"), "/foo/bar");
        assert_eq!(normalize("/foo/bar"), "/foo/bar");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("//"), "/");
        assert_eq!(normalize("a///b//"), "/a/b/");
    }

    #[test]
    fn assign_sets_url_path() {
        let mut routes = RouteIdentifiers::new();
        let mut page = content("/c/about.html.erb");
        routes.assign("about//", &mut page).unwrap();

        assert_eq!(page.url_path(), Some("/about/"));
        assert_eq!(
            routes.resolve("/about/").unwrap(),
            &RouteTarget::Content(PathBuf::from("/c/about.html.erb"))
        );
    }

    #[test]
    fn equivalent_routes_collide() {
        let mut routes = RouteIdentifiers::new();
        routes.assign("foo//bar", &mut content("/c/a")).unwrap();
        let err = routes.assign("/foo/bar", &mut content("/c/b")).unwrap_err();
        assert!(matches!(err, RouteError::DuplicateRoute(r) if r == "/foo/bar"));
    }

    #[test]
    fn duplicate_does_not_overwrite() {
        let mut routes = RouteIdentifiers::new();
        routes.assign("/", &mut content("/c/first")).unwrap();
        let mut second = content("/c/second");
        assert!(routes.assign("/", &mut second).is_err());

        assert_eq!(routes.resolve("/").unwrap().input_path(), Path::new("/c/first"));
        assert_eq!(second.url_path(), None);
    }

    #[test]
    fn resolve_unknown_route_fails() {
        let routes = RouteIdentifiers::new();
        assert!(matches!(
            routes.resolve("missing"),
            Err(RouteError::UndefinedRoute(r)) if r == "/missing"
        ));
    }

    #[test]
    fn closed_map_rejects_assignment() {
        let mut routes = RouteIdentifiers::new();
        routes.close();
        let err = routes.assign("/", &mut content("/c/a")).unwrap_err();
        assert!(matches!(err, RouteError::RouteMapClosed(_)));
    }

    #[test]
    fn iteration_follows_assignment_order() {
        let mut routes = RouteIdentifiers::new();
        routes.assign("/b", &mut content("/c/b")).unwrap();
        let mut asset = Asset::create(PathBuf::from("/a/app.js"), AssetOptions::entrypoint());
        routes.assign("/a", &mut asset).unwrap();

        let order: Vec<&str> = routes.iter().map(|(r, _)| r).collect();
        assert_eq!(order, vec!["/b", "/a"]);
        assert!(matches!(routes.resolve("/a").unwrap(), RouteTarget::Asset(_)));
    }
}
