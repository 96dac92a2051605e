//! The `#include` resolution boundary. The scanner asks a resolver for the
//! text of a header; where that text comes from (filesystem, memory, an IDE
//! workspace) is the embedder's business.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct IncludedSource {
    /// Canonical-ish path recorded in the token stream's file table.
    pub path: PathBuf,
    pub text: String,
}

pub trait IncludeResolver {
    /// `angle` distinguishes `<name>` from `"name"`. `current` is the file
    /// containing the directive; `search` the configured include paths in
    /// order. `None` means not found.
    fn resolve(
        &self,
        name: &str,
        angle: bool,
        current: &Path,
        search: &[PathBuf],
    ) -> Option<IncludedSource>;
}

/// Filesystem resolution: quoted includes try the including file's directory
/// first, then the search paths; angle includes use the search paths only.
pub struct FileResolver;

impl IncludeResolver for FileResolver {
    fn resolve(
        &self,
        name: &str,
        angle: bool,
        current: &Path,
        search: &[PathBuf],
    ) -> Option<IncludedSource> {
        let mut candidates = Vec::new();
        if !angle {
            if let Some(dir) = current.parent() {
                candidates.push(dir.join(name));
            }
        }
        for dir in search {
            candidates.push(dir.join(name));
        }
        for candidate in candidates {
            if candidate.is_file() {
                if let Ok(text) = fs::read_to_string(&candidate) {
                    log::debug!("resolved include {name:?} to {candidate:?}");
                    return Some(IncludedSource {
                        path: candidate,
                        text,
                    });
                }
            }
        }
        None
    }
}

/// In-memory headers keyed by the spelled include name; for tests and
/// embedders that do not touch a filesystem.
#[derive(Default)]
pub struct MemoryResolver {
    headers: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.headers.insert(name.into(), text.into());
    }
}

impl IncludeResolver for MemoryResolver {
    fn resolve(
        &self,
        name: &str,
        _angle: bool,
        _current: &Path,
        _search: &[PathBuf],
    ) -> Option<IncludedSource> {
        self.headers.get(name).map(|text| IncludedSource {
            path: PathBuf::from(name),
            text: text.clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn memory_resolver_serves_registered_names() {
        let mut resolver = MemoryResolver::new();
        resolver.insert("foo.h", "int x;");
        let hit = resolver
            .resolve("foo.h", false, Path::new("main.c"), &[])
            .unwrap();
        assert_eq!(hit.text, "int x;");
        assert!(resolver
            .resolve("bar.h", false, Path::new("main.c"), &[])
            .is_none());
    }
}
