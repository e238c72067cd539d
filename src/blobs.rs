//! Registries of tracked source files.
//!
//! A [`Blobs`] registry holds the blobs of one kind, keyed by absolute input
//! path, under a scoped root directory (the site's assets, contents or
//! layouts directory). Callers address blobs by path relative to that root.
//!
//! Registration is idempotent: registering a path that already has a blob
//! returns the existing blob untouched. This makes it safe to bulk-register
//! a whole directory with [`Blobs::register_many`] and then call
//! [`Blobs::register`] for the few files that need options; the explicit
//! call hands back the existing blob for adjusting.
//!
//! Registries are open while the site is being set up and closed once the
//! site-build phase ends; a closed registry can still be read.

use crate::blob::{BlobError, BlobKind};
use crate::paths;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

#[derive(Debug)]
pub struct Blobs<B> {
    scoped_root: PathBuf,
    lookup: BTreeMap<PathBuf, B>,
    /// `(relative path, absolute path)` of every file below the root,
    /// discovered on first use.
    files: OnceLock<Vec<(String, PathBuf)>>,
    closed: bool,
}

impl<B: BlobKind> Blobs<B> {
    pub fn new(scoped_root: impl Into<PathBuf>) -> Self {
        Self {
            scoped_root: scoped_root.into(),
            lookup: BTreeMap::new(),
            files: OnceLock::new(),
            closed: false,
        }
    }

    pub fn scoped_root(&self) -> &Path {
        &self.scoped_root
    }

    /// Absolute, cleaned path for `relpath` under the scoped root.
    pub fn abspath(&self, relpath: impl AsRef<Path>) -> PathBuf {
        paths::clean(&paths::concat(&self.scoped_root, [relpath]))
    }

    /// Find the blob registered for `relpath`.
    pub fn lookup(&self, relpath: impl AsRef<Path>) -> Result<&B, BlobError> {
        let abspath = self.abspath(relpath);
        self.lookup
            .get(&abspath)
            .ok_or(BlobError::UnknownBlob(abspath))
    }

    pub fn lookup_mut(&mut self, relpath: impl AsRef<Path>) -> Result<&mut B, BlobError> {
        let abspath = self.abspath(relpath);
        self.lookup
            .get_mut(&abspath)
            .ok_or(BlobError::UnknownBlob(abspath))
    }

    /// Find a blob by its absolute input path.
    pub fn get(&self, input_path: &Path) -> Result<&B, BlobError> {
        self.lookup
            .get(input_path)
            .ok_or_else(|| BlobError::UnknownBlob(input_path.to_path_buf()))
    }

    pub fn get_mut(&mut self, input_path: &Path) -> Result<&mut B, BlobError> {
        self.lookup
            .get_mut(input_path)
            .ok_or_else(|| BlobError::UnknownBlob(input_path.to_path_buf()))
    }

    /// Create the blob for `relpath`, or return the one already registered.
    pub fn register(
        &mut self,
        relpath: impl AsRef<Path>,
        options: B::Options,
    ) -> Result<&mut B, BlobError> {
        if self.closed {
            return Err(BlobError::RegistryClosed(B::KIND));
        }
        let abspath = self.abspath(relpath);
        Ok(self
            .lookup
            .entry(abspath.clone())
            .or_insert_with(|| B::create(abspath, options)))
    }

    /// [`register`](Self::register), then hand the blob to `customize`.
    pub fn register_with(
        &mut self,
        relpath: impl AsRef<Path>,
        options: B::Options,
        customize: impl FnOnce(&mut B),
    ) -> Result<&mut B, BlobError> {
        let blob = self.register(relpath, options)?;
        customize(&mut *blob);
        Ok(blob)
    }

    /// Register every file below the root whose relative path matches
    /// `pattern`, with default options. Returns the matching blobs in
    /// discovery order, including ones that were already registered.
    pub fn register_many(&mut self, pattern: &Regex) -> Result<Vec<&B>, BlobError> {
        if self.closed {
            return Err(BlobError::RegistryClosed(B::KIND));
        }

        let matched: Vec<PathBuf> = self
            .files()
            .iter()
            .filter(|(relpath, _)| pattern.is_match(relpath))
            .map(|(_, abspath)| abspath.clone())
            .collect();

        for abspath in &matched {
            if !self.lookup.contains_key(abspath) {
                let blob = B::create(abspath.clone(), B::Options::default());
                self.lookup.insert(abspath.clone(), blob);
            }
        }

        tracing::debug!(kind = B::KIND, pattern = %pattern, count = matched.len(), "registered blobs");
        Ok(matched.iter().filter_map(|p| self.lookup.get(p)).collect())
    }

    /// Files below the scoped root as `(relative, absolute)` pairs, sorted.
    /// Walked once per registry.
    pub fn files(&self) -> &[(String, PathBuf)] {
        self.files.get_or_init(|| discover(&self.scoped_root))
    }

    pub fn iter(&self) -> impl Iterator<Item = &B> {
        self.lookup.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut B> {
        self.lookup.values_mut()
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn discover(root: &Path) -> Vec<(String, PathBuf)> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relpath = e.path().strip_prefix(root).ok()?;
            Some((paths::to_slash(relpath), paths::clean(e.path())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{Asset, AssetOptions, Content, ContentOptions, HasInputPath};
    use std::fs;
    use tempfile::TempDir;

    fn site_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("posts")).unwrap();
        fs::write(tmp.path().join("index.html.erb"), "home").unwrap();
        fs::write(tmp.path().join("posts/1-first.md"), "one").unwrap();
        fs::write(tmp.path().join("posts/2-second.md"), "two").unwrap();
        fs::write(tmp.path().join("posts/notes.txt"), "skip").unwrap();
        tmp
    }

    #[test]
    fn lookup_normalizes_relative_paths() {
        let tmp = site_dir();
        let root = paths::clean(tmp.path());
        let mut blobs: Blobs<Content> = Blobs::new(&root);
        blobs.register("index.html.erb", ContentOptions::default()).unwrap();

        let found = blobs.lookup("posts/../index.html.erb").unwrap();
        assert_eq!(found.input_path(), root.join("index.html.erb"));
        assert!(blobs.lookup("./index.html.erb").is_ok());
    }

    #[test]
    fn lookup_unknown_blob_fails() {
        let blobs: Blobs<Content> = Blobs::new("/site/contents");
        let err = blobs.lookup("nope.erb").unwrap_err();
        assert!(matches!(err, BlobError::UnknownBlob(p) if p == Path::new("/site/contents/nope.erb")));
    }

    #[test]
    fn register_returns_existing_blob() {
        let mut blobs: Blobs<Asset> = Blobs::new("/site/assets");
        blobs.register("app.js", AssetOptions::entrypoint()).unwrap();
        let again = blobs.register("app.js", AssetOptions::default()).unwrap();

        assert!(again.is_entrypoint());
        assert_eq!(blobs.len(), 1);
    }

    #[test]
    fn register_with_customizes_blob() {
        let mut blobs: Blobs<Content> = Blobs::new("/site/contents");
        blobs
            .register_with("a.erb", ContentOptions::default(), |c| {
                c.locals_mut().insert("answer".into(), 42.into());
            })
            .unwrap();
        assert_eq!(blobs.lookup("a.erb").unwrap().locals()["answer"], 42);
    }

    #[test]
    fn closed_registry_rejects_registration() {
        let mut blobs: Blobs<Asset> = Blobs::new("/site/assets");
        blobs.close();
        assert!(matches!(
            blobs.register("app.js", AssetOptions::default()),
            Err(BlobError::RegistryClosed("asset"))
        ));
        assert!(matches!(
            blobs.register_many(&Regex::new(".*").unwrap()),
            Err(BlobError::RegistryClosed("asset"))
        ));
    }

    #[test]
    fn register_many_matches_relative_paths_in_order() {
        let tmp = site_dir();
        let mut blobs: Blobs<Content> = Blobs::new(paths::clean(tmp.path()));

        let pattern = Regex::new(r"^posts/.*\.md$").unwrap();
        let names: Vec<String> = blobs
            .register_many(&pattern)
            .unwrap()
            .iter()
            .map(|b| b.input_path().file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["1-first.md", "2-second.md"]);
        assert_eq!(blobs.len(), 2);
    }

    #[test]
    fn register_many_keeps_explicit_options() {
        let tmp = site_dir();
        let mut blobs: Blobs<Content> = Blobs::new(paths::clean(tmp.path()));
        blobs
            .register("posts/1-first.md", ContentOptions::default().local("pinned", true))
            .unwrap();

        let affected = blobs.register_many(&Regex::new(r"\.md$").unwrap()).unwrap();
        assert_eq!(affected.len(), 2);
        assert_eq!(blobs.lookup("posts/1-first.md").unwrap().locals()["pinned"], true);
    }

    #[test]
    fn files_are_discovered_once() {
        let tmp = site_dir();
        let mut blobs: Blobs<Content> = Blobs::new(paths::clean(tmp.path()));
        assert_eq!(blobs.files().len(), 4);

        fs::write(tmp.path().join("late.md"), "late").unwrap();
        let affected = blobs.register_many(&Regex::new(r"\.md$").unwrap()).unwrap();
        assert_eq!(affected.len(), 2);
    }

    #[test]
    fn missing_root_discovers_nothing() {
        let mut blobs: Blobs<Content> = Blobs::new("/definitely/not/here");
        assert!(blobs.register_many(&Regex::new(".*").unwrap()).unwrap().is_empty());
    }
}
