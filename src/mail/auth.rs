//! Credential verification collaborator

use crate::mail::error::MailError;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Verifies a username/password pair against an identity backend.
///
/// The directory protocol behind the check (LDAP, a database, anything
/// else) is not this crate's concern; the server only ever asks the yes/no
/// question.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> bool;
}

/// In-memory username/password table.
///
/// Stands in for an external directory. Loadable from a flat file of
/// `user:password` lines; `#` starts a comment.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    users: HashMap<String, String>,
}

impl StaticCredentials {
    /// Create an empty credential table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one user, builder style
    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.users
            .insert(username.to_string(), password.to_string());
        self
    }

    /// Load a `user:password` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MailError> {
        let contents = fs::read_to_string(path)?;
        let mut users = HashMap::new();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((username, password)) = line.split_once(':') {
                users.insert(username.to_string(), password.to_string());
            }
        }

        Ok(Self { users })
    }

    /// Number of known users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Authenticator for StaticCredentials {
    fn authenticate(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|stored| stored == password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_static_credentials() {
        let auth = StaticCredentials::new().with_user("alice", "secret");

        assert!(auth.authenticate("alice", "secret"));
        assert!(!auth.authenticate("alice", "wrong"));
        assert!(!auth.authenticate("bob", "secret"));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# test users").unwrap();
        writeln!(file, "alice:secret").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "bob:pass:with:colons").unwrap();
        file.flush().unwrap();

        let auth = StaticCredentials::from_file(file.path()).unwrap();
        assert_eq!(auth.len(), 2);
        assert!(auth.authenticate("alice", "secret"));
        // everything after the first colon is the password
        assert!(auth.authenticate("bob", "pass:with:colons"));
    }
}
