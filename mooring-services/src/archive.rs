//! Exploded archives on disk.
use std::{
    fmt, io,
    path::{Path, PathBuf},
};

/// Archive flavor, told apart by the extension of the root's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Ear,
    Jar,
    War,
    Rar,
    Other,
}

impl ArchiveKind {
    pub fn of(name: &str) -> Self {
        let Some((_, extension)) = name.rsplit_once('.') else {
            return ArchiveKind::Other;
        };
        match extension.to_ascii_lowercase().as_str() {
            "ear" => ArchiveKind::Ear,
            "jar" => ArchiveKind::Jar,
            "war" => ArchiveKind::War,
            "rar" => ArchiveKind::Rar,
            _ => ArchiveKind::Other,
        }
    }

    /// Kinds that may be nested inside an EAR as modules.
    pub fn is_module(self) -> bool {
        matches!(self, ArchiveKind::Jar | ArchiveKind::War | ArchiveKind::Rar)
    }
}

/// The root directory of one (possibly nested) exploded archive.
#[derive(Clone, PartialEq, Eq)]
pub struct ResourceRoot {
    name: String,
    path: PathBuf,
}

impl ResourceRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArchiveKind {
        ArchiveKind::of(&self.name)
    }

    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.child(relative).exists()
    }

    /// Read a file below the root. A missing file is `Ok(None)`.
    pub fn read_to_string(&self, relative: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.child(relative)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Directories directly below the root, sorted by name.
    pub fn children(&self) -> io::Result<Vec<ResourceRoot>> {
        let mut children = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                children.push(ResourceRoot::new(entry.path()));
            }
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }
}

impl fmt::Debug for ResourceRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceRoot({})", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::{ArchiveKind, ResourceRoot};

    #[test]
    fn test_kind_by_extension() {
        assert_eq!(ArchiveKind::Ear, ArchiveKind::of("app.ear"));
        assert_eq!(ArchiveKind::Jar, ArchiveKind::of("client.JAR"));
        assert_eq!(ArchiveKind::War, ArchiveKind::of("web.war"));
        assert_eq!(ArchiveKind::Rar, ArchiveKind::of("ra.rar"));
        assert_eq!(ArchiveKind::Other, ArchiveKind::of("lib"));
        assert_eq!(ArchiveKind::Other, ArchiveKind::of("notes.txt"));
        assert!(ArchiveKind::Rar.is_module());
        assert!(!ArchiveKind::Ear.is_module());
    }

    #[test]
    fn test_children_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = ResourceRoot::new(dir.path().join("app.ear"));
        std::fs::create_dir_all(root.child("b.war")).unwrap();
        std::fs::create_dir_all(root.child("a.jar/META-INF")).unwrap();
        std::fs::write(root.child("a.jar/META-INF/MANIFEST.MF"), "x").unwrap();
        std::fs::write(root.child("readme.txt"), "hello").unwrap();

        let names: Vec<String> = root
            .children()
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(vec!["a.jar", "b.war"], names);
        assert_eq!(ArchiveKind::Ear, root.kind());
        assert_eq!(Some("hello".to_string()), root.read_to_string("readme.txt").unwrap());
        assert_eq!(None, root.read_to_string("missing.txt").unwrap());
        assert!(root.exists("a.jar/META-INF/MANIFEST.MF"));
    }
}
