//! Script Source.
//!
//! Enumerates scripts from an ordered probing list of resource bundles and
//! classifies each by filename/path convention. The bundle abstraction
//! keeps the file-system layout of the embedding application out of scope:
//! an embedder supplies bundles, typically backed by `include_dir!`-style
//! embedded assets or a plain directory tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dbex_connector::error::{DbExError, DbExResult};
use dbex_connector::model::{FileReader, InMemoryReader, MigrationScript, ScriptKind, ScriptReader};

/// One probeable source of script files: a relative path plus a reader.
pub trait ResourceBundle: Send + Sync {
    /// List every file path (forward-slash separated, relative to the
    /// bundle root) this bundle contains.
    fn entries(&self) -> Vec<String>;

    fn reader_for(&self, path: &str) -> Arc<dyn ScriptReader>;
}

/// A bundle backed by a real directory tree.
pub struct DirBundle {
    root: PathBuf,
}

impl DirBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(dir: &Path, prefix: &str, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else { return };
        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };
            let path = entry.path();
            if path.is_dir() {
                Self::walk(&path, &rel, out);
            } else {
                out.push(rel);
            }
        }
    }
}

impl ResourceBundle for DirBundle {
    fn entries(&self) -> Vec<String> {
        let mut out = Vec::new();
        Self::walk(&self.root, "", &mut out);
        out
    }

    fn reader_for(&self, path: &str) -> Arc<dyn ScriptReader> {
        Arc::new(FileReader(self.root.join(path)))
    }
}

/// A bundle backed by in-memory content, used by tests and by embedders
/// with compile-time-included assets.
#[derive(Default)]
pub struct MemoryBundle {
    files: Vec<(String, Arc<str>)>,
}

impl MemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }
}

impl ResourceBundle for MemoryBundle {
    fn entries(&self) -> Vec<String> {
        self.files.iter().map(|(p, _)| p.clone()).collect()
    }

    fn reader_for(&self, path: &str) -> Arc<dyn ScriptReader> {
        let content = self
            .files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
            .unwrap_or_else(|| Arc::from(""));
        Arc::new(InMemoryReader(content))
    }
}

/// Discovers and classifies scripts across an ordered list of bundles.
/// Bundles are probed in order; a given relative path is only taken from
/// the first bundle that contains it.
pub struct ScriptSource {
    bundles: Vec<Box<dyn ResourceBundle>>,
}

impl ScriptSource {
    pub fn new(bundles: Vec<Box<dyn ResourceBundle>>) -> Self {
        Self { bundles }
    }

    /// Enumerate and classify every script visible through the probe list,
    /// in discovery order (not yet sorted by phase — the orchestrator does
    /// that).
    pub fn discover(&self) -> DbExResult<Vec<MigrationScript>> {
        let mut seen = std::collections::HashSet::new();
        let mut scripts = Vec::new();
        for bundle in &self.bundles {
            for path in bundle.entries() {
                if !seen.insert(path.clone()) {
                    continue;
                }
                if let Some(classified) = classify(&path) {
                    let reader = bundle.reader_for(&path);
                    scripts.push(MigrationScript {
                        name: classified.name,
                        kind: classified.kind,
                        content: reader,
                        group_order: classified.group_order,
                        run_always: classified.run_always,
                    });
                }
            }
        }
        Ok(scripts)
    }

    /// Look up a single named script across the probe list (used by
    /// `Execute`/`Script` to fetch one resource by name).
    pub fn find(&self, name: &str) -> DbExResult<MigrationScript> {
        self.discover()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| DbExError::ResourceNotFound(name.to_string()))
    }
}

struct Classified {
    name: String,
    kind: ScriptKind,
    group_order: i64,
    run_always: bool,
}

/// Classify a bundle-relative path per the standard naming conventions.
fn classify(path: &str) -> Option<Classified> {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();

    if name.ends_with(".pre.deploy.sql") {
        return Some(Classified {
            name,
            kind: ScriptKind::PreDeploy,
            group_order: 0,
            run_always: true,
        });
    }
    if name.ends_with(".post.deploy.sql") {
        return Some(Classified {
            name,
            kind: ScriptKind::PostDeploy,
            group_order: 0,
            run_always: true,
        });
    }
    if name.ends_with(".post.database.create.sql") {
        return Some(Classified {
            name,
            kind: ScriptKind::PostDatabaseCreate,
            group_order: 0,
            run_always: false,
        });
    }
    if let Some(rest) = path.strip_prefix("Migrations/") {
        if rest.ends_with(".sql") && !rest.contains('/') {
            return Some(Classified {
                name: rest.to_string(),
                kind: ScriptKind::Migrate,
                group_order: 0,
                run_always: false,
            });
        }
    }
    if let Some(rest) = path.strip_prefix("Schema/") {
        if rest.ends_with(".sql") {
            return Some(Classified {
                name: path.to_string(),
                kind: ScriptKind::Schema,
                group_order: 0,
                run_always: true,
            });
        }
    }
    if let Some(rest) = path.strip_prefix("Data/") {
        if rest.ends_with(".yaml") || rest.ends_with(".yml") || rest.ends_with(".json") {
            return Some(Classified {
                name: path.to_string(),
                kind: ScriptKind::Data,
                group_order: 0,
                run_always: true,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> MemoryBundle {
        MemoryBundle::new()
            .with_file("Migrations/20200101-000000-a.sql", "CREATE TABLE T(Id INT);")
            .with_file("Migrations/20200102-000000-b.sql", "ALTER TABLE T ADD Name VARCHAR(50);")
            .with_file("bootstrap.pre.deploy.sql", "INSERT INTO Log VALUES (1);")
            .with_file("bootstrap.post.deploy.sql", "UPDATE Log SET Done = 1;")
            .with_file("init.post.database.create.sql", "CREATE SCHEMA ref;")
            .with_file("Schema/dbo/Views/MyView.sql", "CREATE VIEW dbo.MyView AS SELECT 1;")
            .with_file("Data/Ref.yaml", "Ref: []")
            .with_file("README.md", "not a script")
    }

    #[test]
    fn classifies_every_convention() {
        let source = ScriptSource::new(vec![Box::new(bundle())]);
        let scripts = source.discover().unwrap();
        assert_eq!(scripts.len(), 7);
        assert!(scripts.iter().any(|s| s.kind == ScriptKind::Migrate && s.name == "20200101-000000-a.sql"));
        assert!(scripts.iter().any(|s| s.kind == ScriptKind::PreDeploy && s.run_always));
        assert!(scripts.iter().any(|s| s.kind == ScriptKind::PostDatabaseCreate && !s.run_always));
        assert!(scripts.iter().any(|s| s.kind == ScriptKind::Schema));
        assert!(scripts.iter().any(|s| s.kind == ScriptKind::Data));
    }

    #[test]
    fn earlier_bundle_wins_on_duplicate_path() {
        let first = MemoryBundle::new().with_file("Migrations/a.sql", "first");
        let second = MemoryBundle::new().with_file("Migrations/a.sql", "second");
        let source = ScriptSource::new(vec![Box::new(first), Box::new(second)]);
        let script = source.find("a.sql").unwrap();
        assert_eq!(script.read().unwrap(), "first");
    }
}
