use std::{
    env, fs,
    io::Read,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::error::LoadError;

/// Where a script's text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    Inline,
    File(PathBuf),
}

/// Script text plus the identifier used in errors and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    id: String,
    text: String,
    origin: Origin,
}

impl ScriptSource {
    /// Wrap in-memory script text.
    pub fn inline(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            origin: Origin::Inline,
        }
    }

    /// Read script text from a file. Relative paths resolve against the
    /// working directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = absolute(path.as_ref());
        let id = path.display().to_string();
        let text = fs::read_to_string(&path).map_err(|e| LoadError::Io {
            id: id.clone(),
            message: e.to_string(),
        })?;
        debug!(path = %id, "read script source");
        Ok(Self {
            id,
            text,
            origin: Origin::File(path),
        })
    }

    /// Read script text from any reader.
    pub fn from_reader(id: impl Into<String>, mut reader: impl Read) -> Result<Self, LoadError> {
        let id = id.into();
        let mut text = String::new();
        reader.read_to_string(&mut text).map_err(|e| LoadError::Io {
            id: id.clone(),
            message: e.to_string(),
        })?;
        Ok(Self::inline(id, text))
    }

    /// Find a script by location: first relative to the working directory,
    /// then under each search root in order.
    pub fn locate(location: &str, roots: &[PathBuf]) -> Result<Self, LoadError> {
        let direct = absolute(Path::new(location));
        if direct.is_file() {
            return Self::from_path(direct);
        }
        for root in roots {
            let candidate = root.join(location);
            if candidate.is_file() {
                debug!(location, root = %root.display(), "script found under search root");
                return Self::from_path(candidate);
            }
        }
        warn!(location, "script not found");
        Err(LoadError::Io {
            id: location.to_string(),
            message: "not found in the working directory or any search root".to_string(),
        })
    }

    /// Re-read a file-backed source. Inline sources are returned unchanged.
    pub fn reload(&self) -> Result<Self, LoadError> {
        match &self.origin {
            Origin::File(path) => Self::from_path(path),
            Origin::Inline => Ok(self.clone()),
        }
    }

    /// Source identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Script text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Path of a file-backed source.
    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::File(path) => Some(path),
            Origin::Inline => None,
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reader_sources_are_inline() {
        let source = ScriptSource::from_reader("mem", Cursor::new("fn f() { 1 }")).unwrap();
        assert_eq!(source.id(), "mem");
        assert_eq!(source.path(), None);
        assert_eq!(source.reload().unwrap(), source);
    }

    #[test]
    fn locate_searches_roots_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("calc.rhai"), "fn add(a, b) { a + b }").unwrap();

        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let source = ScriptSource::locate("calc.rhai", &roots).unwrap();
        assert_eq!(source.path(), Some(second.path().join("calc.rhai").as_path()));
        assert!(source.text().contains("fn add"));
    }

    #[test]
    fn missing_location_is_an_io_error() {
        let err = ScriptSource::locate("does/not/exist.rhai", &[]).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn reload_reads_current_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.rhai");
        fs::write(&path, "fn v() { 1 }").unwrap();
        let source = ScriptSource::from_path(&path).unwrap();
        fs::write(&path, "fn v() { 2 }").unwrap();
        assert_eq!(source.reload().unwrap().text(), "fn v() { 2 }");
        assert_eq!(source.text(), "fn v() { 1 }");
    }
}
