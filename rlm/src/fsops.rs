//! Sandboxed filesystem helpers exposed to scripts as the `fs` object

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use walkdir::WalkDir;

use crate::error::{RlmError, RlmResult};
use crate::{DEFAULT_READ_CAP, EXCLUDED_DIRS};

/// A single entry returned by [`FsSandbox::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// One node of the tree returned by [`FsSandbox::tree`]
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub is_dir: bool,
    pub children: Vec<TreeNode>,
}

/// Read-only filesystem view rooted at the working directory.
///
/// Relative paths resolve against the root; absolute paths are taken
/// literally. Listings, globs and trees filter out the excluded
/// directory set so the model never wades through `.git` or
/// `node_modules`.
#[derive(Debug, Clone)]
pub struct FsSandbox {
    root: PathBuf,
    max_read_bytes: usize,
    excluded: Vec<String>,
    extensions: Option<Vec<String>>,
}

impl FsSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_read_bytes: DEFAULT_READ_CAP,
            excluded: EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
            extensions: None,
        }
    }

    /// Override the byte cap applied by [`read`](Self::read)
    pub fn with_max_read_bytes(mut self, cap: usize) -> Self {
        self.max_read_bytes = cap;
        self
    }

    /// Restrict listings and globs to the given file extensions
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() { p.to_path_buf() } else { self.root.join(p) }
    }

    fn is_excluded_name(&self, name: &str) -> bool {
        self.excluded.iter().any(|e| e == name)
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        match &self.extensions {
            None => true,
            Some(exts) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| exts.iter().any(|allowed| allowed.trim_start_matches('.') == e))
                .unwrap_or(false),
        }
    }

    /// List a directory, excluded names filtered, sorted by name
    pub fn list(&self, path: &str) -> RlmResult<Vec<FsEntry>> {
        let dir = self.resolve(path);
        if !dir.exists() {
            return Err(RlmError::Script(format!("no such path: {path}")));
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if self.is_excluded_name(&name) {
                continue;
            }
            let meta = entry.metadata()?;
            if meta.is_file() && !self.extension_allowed(&entry.path()) {
                continue;
            }
            entries.push(FsEntry {
                name,
                is_dir: meta.is_dir(),
                size: meta.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Read a file, truncating at the configured byte cap
    pub fn read(&self, path: &str) -> RlmResult<String> {
        let file = self.resolve(path);
        if !file.is_file() {
            return Err(RlmError::Script(format!("no such file: {path}")));
        }
        let content =
            fs::read_to_string(&file).map_err(|e| RlmError::Script(format!("cannot read {path}: {e}")))?;
        if content.len() > self.max_read_bytes {
            let mut cut = self.max_read_bytes;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            return Ok(format!("{}... [truncated]", &content[..cut]));
        }
        Ok(content)
    }

    /// Files under the root matching a glob pattern, excluded dirs pruned
    pub fn glob(&self, pattern: &str) -> RlmResult<Vec<String>> {
        let pat =
            Pattern::new(pattern).map_err(|e| RlmError::Script(format!("invalid glob {pattern:?}: {e}")))?;
        let mut out = Vec::new();
        let walker = WalkDir::new(&self.root).sort_by_file_name().into_iter();
        for entry in walker.filter_entry(|e| {
            e.depth() == 0
                || e.file_name()
                    .to_str()
                    .map(|n| !self.is_excluded_name(n))
                    .unwrap_or(true)
        }) {
            let entry = entry.map_err(|e| RlmError::Script(format!("walk failed: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            if pat.matches_path(rel) && self.extension_allowed(entry.path()) {
                out.push(rel.display().to_string());
            }
        }
        Ok(out)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    /// Nested directory tree down to `depth` levels below `path`
    pub fn tree(&self, path: &str, depth: usize) -> RlmResult<TreeNode> {
        let start = self.resolve(path);
        if !start.exists() {
            return Err(RlmError::Script(format!("no such path: {path}")));
        }
        let name = start
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        self.build_node(&start, name, depth)
    }

    fn build_node(&self, path: &Path, name: String, depth: usize) -> RlmResult<TreeNode> {
        let is_dir = path.is_dir();
        let mut children = Vec::new();
        if is_dir && depth > 0 {
            let mut entries: Vec<_> = fs::read_dir(path)?.collect::<Result<_, _>>()?;
            entries.sort_by_key(|e| e.file_name());
            for entry in entries {
                let child_name = entry.file_name().to_string_lossy().to_string();
                if self.is_excluded_name(&child_name) {
                    continue;
                }
                children.push(self.build_node(&entry.path(), child_name, depth - 1)?);
            }
        }
        Ok(TreeNode { name, is_dir, children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::create_dir(temp.path().join("node_modules")).unwrap();
        fs::write(temp.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(temp.path().join("src/lib.rs"), "pub fn lib() {}").unwrap();
        fs::write(temp.path().join("README.md"), "# readme").unwrap();
        fs::write(temp.path().join("node_modules/junk.js"), "x").unwrap();
        temp
    }

    #[test]
    fn test_list_filters_excluded() {
        let temp = fixture();
        let sandbox = FsSandbox::new(temp.path());
        let entries = sandbox.list(".").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["README.md", "src"]);
    }

    #[test]
    fn test_list_missing_path() {
        let temp = fixture();
        let sandbox = FsSandbox::new(temp.path());
        let err = sandbox.list("nope").unwrap_err();
        assert!(err.to_string().contains("no such path"));
    }

    #[test]
    fn test_read_truncates() {
        let temp = fixture();
        fs::write(temp.path().join("big.txt"), "x".repeat(100)).unwrap();
        let sandbox = FsSandbox::new(temp.path()).with_max_read_bytes(10);
        let content = sandbox.read("big.txt").unwrap();
        assert!(content.starts_with("xxxxxxxxxx"));
        assert!(content.ends_with("... [truncated]"));
    }

    #[test]
    fn test_read_missing_file() {
        let temp = fixture();
        let sandbox = FsSandbox::new(temp.path());
        assert!(sandbox.read("ghost.txt").is_err());
    }

    #[test]
    fn test_glob_prunes_excluded() {
        let temp = fixture();
        let sandbox = FsSandbox::new(temp.path());
        let matches = sandbox.glob("**/*.rs").unwrap();
        assert_eq!(matches, vec!["src/lib.rs", "src/main.rs"]);

        let js = sandbox.glob("**/*.js").unwrap();
        assert!(js.is_empty(), "node_modules must be pruned");
    }

    #[test]
    fn test_exists() {
        let temp = fixture();
        let sandbox = FsSandbox::new(temp.path());
        assert!(sandbox.exists("src/main.rs"));
        assert!(!sandbox.exists("missing"));
    }

    #[test]
    fn test_tree_depth() {
        let temp = fixture();
        let sandbox = FsSandbox::new(temp.path());
        let tree = sandbox.tree(".", 2).unwrap();
        assert!(tree.is_dir);
        let src = tree.children.iter().find(|c| c.name == "src").unwrap();
        assert_eq!(src.children.len(), 2);
        assert!(!tree.children.iter().any(|c| c.name == "node_modules"));

        let shallow = sandbox.tree(".", 1).unwrap();
        let src = shallow.children.iter().find(|c| c.name == "src").unwrap();
        assert!(src.children.is_empty());
    }

    #[test]
    fn test_extension_filter() {
        let temp = fixture();
        let sandbox = FsSandbox::new(temp.path()).with_extensions(vec!["rs".to_string()]);
        let entries = sandbox.list("src").unwrap();
        assert_eq!(entries.len(), 2);
        let top = sandbox.list(".").unwrap();
        assert!(!top.iter().any(|e| e.name == "README.md"));
    }
}
