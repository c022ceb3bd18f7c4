use crate::error::{ElectionError, Result};

/// Absolute namespace path under which all candidates for one election
/// register.
///
/// Every process competing for the same logical leadership role must use an
/// identical election path; the path is what scopes the election.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElectionPath(String);

impl ElectionPath {
    /// Validate and wrap an election path.
    ///
    /// The path must be absolute, must not be the namespace root, and must
    /// not contain empty segments or a trailing slash.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(ElectionError::InvalidPath("path is empty".into()));
        }
        if !path.starts_with('/') {
            return Err(ElectionError::InvalidPath(format!(
                "path must be absolute: {path}"
            )));
        }
        if path == "/" {
            return Err(ElectionError::InvalidPath(
                "an election cannot live at the namespace root".into(),
            ));
        }
        if path.ends_with('/') {
            return Err(ElectionError::InvalidPath(format!(
                "path must not end with a slash: {path}"
            )));
        }
        if path.contains("//") {
            return Err(ElectionError::InvalidPath(format!(
                "path contains an empty segment: {path}"
            )));
        }
        Ok(Self(path))
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a child name onto this path.
    pub fn join(&self, child: &str) -> String {
        format!("{}/{}", self.0, child)
    }

    /// Absolute prefixes of this path, shortest first.
    ///
    /// For `/apps/workers/election` this yields `/apps`, `/apps/workers`,
    /// `/apps/workers/election`. Used for idempotent parent creation.
    pub fn ancestors(&self) -> impl Iterator<Item = &str> + '_ {
        let path = self.0.as_str();
        path.char_indices()
            .skip(1)
            .filter_map(move |(i, c)| (c == '/').then(|| &path[..i]))
            .chain(std::iter::once(path))
    }
}

impl std::fmt::Display for ElectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ElectionPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
