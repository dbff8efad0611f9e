use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use futures::future::BoxFuture;
use tracing::debug;
use walkdir::WalkDir;

use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::ArtifactStore;
use troupe_core::types::{insert_lines, slice_lines, LineRange};

/// Artifact store backed by a single directory.
///
/// Document names are relative paths inside the root; absolute paths and
/// `..` components are rejected.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let rel = Path::new(name);
        if name.trim().is_empty() {
            return Err(TroupeError::InvalidPath("empty document name".into()));
        }
        let escapes = rel.components().any(|c| {
            matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if escapes {
            return Err(TroupeError::InvalidPath(name.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl ArtifactStore for DirStore {
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            if !self.root.exists() {
                return Ok(Vec::new());
            }
            let mut names = Vec::new();
            for entry in WalkDir::new(&self.root).follow_links(false) {
                let entry = entry.map_err(|e| TroupeError::Io(e.into()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                    let name = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    names.push(name);
                }
            }
            names.sort();
            Ok(names)
        })
    }

    fn read(&self, name: &str, range: LineRange) -> BoxFuture<'_, Result<String>> {
        let path = self.resolve(name);
        Box::pin(async move {
            let path = path?;
            debug!(path = %path.display(), ?range, "Reading document");
            let content = tokio::fs::read_to_string(&path).await?;
            Ok(slice_lines(&content, range))
        })
    }

    fn write(&self, name: &str, content: &str) -> BoxFuture<'_, Result<()>> {
        let path = self.resolve(name);
        let content = content.to_string();
        Box::pin(async move {
            let path = path?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            debug!(path = %path.display(), bytes = content.len(), "Writing document");
            tokio::fs::write(&path, content).await?;
            Ok(())
        })
    }

    fn edit(&self, name: &str, inserts: BTreeMap<usize, String>) -> BoxFuture<'_, Result<()>> {
        let path = self.resolve(name);
        let name = name.to_string();
        Box::pin(async move {
            let path = path?;
            let content = tokio::fs::read_to_string(&path).await?;
            let edited = insert_lines(&name, &content, inserts)?;
            debug!(path = %path.display(), "Editing document");
            tokio::fs::write(&path, edited).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, DirStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_list_empty_and_missing_root() {
        let (dir, store) = store();
        assert!(store.list().await.unwrap().is_empty());
        let missing = DirStore::new(dir.path().join("nope"));
        assert!(missing.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_list_sorted() {
        let (_dir, store) = store();
        store.write("outline.md", "x").await.unwrap();
        store.write("drafts/intro.md", "y").await.unwrap();
        store.write("abstract.md", "z").await.unwrap();
        assert_eq!(
            store.list().await.unwrap(),
            vec!["abstract.md", "drafts/intro.md", "outline.md"]
        );
    }

    #[tokio::test]
    async fn test_read_honors_range() {
        let (_dir, store) = store();
        store.write("doc.md", "l0\nl1\nl2\nl3\n").await.unwrap();
        assert_eq!(store.read("doc.md", LineRange::all()).await.unwrap(), "l0\nl1\nl2\nl3");
        assert_eq!(
            store.read("doc.md", LineRange::new(Some(2), None)).await.unwrap(),
            "l2\nl3"
        );
        assert_eq!(
            store.read("doc.md", LineRange::new(Some(1), Some(3))).await.unwrap(),
            "l1\nl2"
        );
        assert_eq!(store.read("doc.md", LineRange::new(Some(10), None)).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let (_dir, store) = store();
        for bad in ["../secret", "/etc/passwd", "a/../../b", ""] {
            let err = store.write(bad, "x").await.unwrap_err();
            assert!(matches!(err, TroupeError::InvalidPath(_)), "{bad} accepted");
        }
    }

    #[tokio::test]
    async fn test_edit_inserts_in_ascending_order() {
        let (_dir, store) = store();
        store.write("doc.md", "a\nb\nc\n").await.unwrap();
        let inserts = BTreeMap::from([(4, "after c".to_string()), (1, "top".to_string())]);
        store.edit("doc.md", inserts).await.unwrap();
        // Line 1 goes in first, shifting the rest; line 4 then lands before "c".
        assert_eq!(
            store.read("doc.md", LineRange::all()).await.unwrap(),
            "top\na\nb\nafter c\nc"
        );
    }

    #[tokio::test]
    async fn test_edit_out_of_range_leaves_file_untouched() {
        let (_dir, store) = store();
        store.write("doc.md", "a\nb\n").await.unwrap();
        let inserts = BTreeMap::from([(1, "ok".to_string()), (9, "bad".to_string())]);
        let err = store.edit("doc.md", inserts).await.unwrap_err();
        assert!(matches!(err, TroupeError::LineOutOfRange { line: 9, len: 3, .. }));
        assert_eq!(store.read("doc.md", LineRange::all()).await.unwrap(), "a\nb");
    }

    #[tokio::test]
    async fn test_edit_can_append_one_past_end() {
        let (_dir, store) = store();
        store.write("doc.md", "a").await.unwrap();
        store
            .edit("doc.md", BTreeMap::from([(2, "b".to_string())]))
            .await
            .unwrap();
        assert_eq!(store.read("doc.md", LineRange::all()).await.unwrap(), "a\nb");
    }

    #[tokio::test]
    async fn test_edit_missing_file_is_io_error() {
        let (_dir, store) = store();
        let err = store
            .edit("ghost.md", BTreeMap::from([(1, "x".to_string())]))
            .await
            .unwrap_err();
        assert!(matches!(err, TroupeError::Io(_)));
    }
}
