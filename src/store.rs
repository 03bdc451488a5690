// src/store.rs

use crate::error::{FatalError, FatalResult};
use crate::model::{EntryKind, ObjectId, TreeEntry};
use git2::{ObjectType, Repository};
use std::path::Path;
use tracing::debug;

/// A revision peeled down to the commit and its root tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRevision {
    pub commit: ObjectId,
    pub tree: ObjectId,
    /// Committer time, seconds since the Unix epoch
    pub time: i64,
}

/// Read access to the object database the walker needs.
pub trait ObjectStore {
    fn resolve(&self, revision: &str) -> Result<ResolvedRevision, git2::Error>;
    fn list_entries(&self, tree: ObjectId) -> Result<Vec<TreeEntry>, git2::Error>;
    fn read_blob(&self, id: ObjectId) -> Result<Vec<u8>, git2::Error>;
}

/// `ObjectStore` over a libgit2 repository
pub struct GitStore {
    repo: Repository,
}

impl GitStore {
    /// Open the repository at `path`, or the one enclosing it.
    pub fn open(path: &Path) -> FatalResult<Self> {
        let repo = Repository::discover(path).map_err(|source| FatalError::OpenRepository {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Opened git repository at {:?}", repo.path());
        Ok(Self { repo })
    }

    /// The `.git` directory (or the bare repository itself).
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// All tag names, sorted.
    pub fn tag_names(&self) -> Result<Vec<String>, git2::Error> {
        let tags = self.repo.tag_names(None)?;
        let mut names: Vec<String> = tags.iter().flatten().map(String::from).collect();
        names.sort();
        Ok(names)
    }
}

impl ObjectStore for GitStore {
    fn resolve(&self, revision: &str) -> Result<ResolvedRevision, git2::Error> {
        let commit = self.repo.revparse_single(revision)?.peel_to_commit()?;
        Ok(ResolvedRevision {
            commit: commit.id(),
            tree: commit.tree_id(),
            time: commit.time().seconds(),
        })
    }

    fn list_entries(&self, tree: ObjectId) -> Result<Vec<TreeEntry>, git2::Error> {
        let tree = self.repo.find_tree(tree)?;
        let entries = tree
            .iter()
            .map(|entry| TreeEntry {
                name: String::from_utf8_lossy(entry.name_bytes()).into_owned(),
                kind: match entry.kind() {
                    Some(ObjectType::Tree) => EntryKind::Tree,
                    Some(ObjectType::Blob) => EntryKind::Blob,
                    Some(ObjectType::Commit) => EntryKind::Submodule,
                    other => EntryKind::Other(format!("{:?}", other)),
                },
                id: entry.id(),
            })
            .collect();
        Ok(entries)
    }

    fn read_blob(&self, id: ObjectId) -> Result<Vec<u8>, git2::Error> {
        Ok(self.repo.find_blob(id)?.content().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Signature, Time};
    use tempfile::tempdir;

    #[test]
    fn test_list_entries_and_resolve() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let repo = Repository::init(dir.path())?;
        let blob = repo.blob(b"hello\n")?;
        let mut sub = repo.treebuilder(None)?;
        sub.insert("inner.txt", blob, 0o100644)?;
        let sub_id = sub.write()?;
        let mut root = repo.treebuilder(None)?;
        root.insert("a.txt", blob, 0o100644)?;
        root.insert("dir", sub_id, 0o040000)?;
        let tree_id = root.write()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = Signature::new("Alice", "alice@example.com", &Time::new(86_400 * 3, 0))?;
        let commit = repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])?;

        let store = GitStore::open(dir.path())?;
        let resolved = store.resolve("HEAD")?;
        assert_eq!(resolved.commit, commit);
        assert_eq!(resolved.tree, tree_id);
        assert_eq!(resolved.time, 86_400 * 3);

        let entries = store.list_entries(tree_id)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[0].kind, EntryKind::Blob);
        assert_eq!(entries[1].kind, EntryKind::Tree);
        assert_eq!(store.read_blob(blob)?, b"hello\n");
        assert!(store.resolve("no-such-branch").is_err());
        Ok(())
    }

    #[test]
    fn test_open_missing_repository() {
        let dir = tempdir().unwrap();
        let err = GitStore::open(&dir.path().join("nope")).err().unwrap();
        assert!(matches!(err, FatalError::OpenRepository { .. }));
    }
}
