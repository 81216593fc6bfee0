//! Login failure tracking and the persisted ban list

use crate::mail::error::{Limits, MailError};

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

/// Tracks failed logins per origin address and bans repeat offenders.
///
/// The ban set is backed by a flat file, one address per line, append-only.
/// It is loaded once when the server starts; promotions append through to
/// the file so bans survive restarts. Failure counters are in-memory only
/// and reset with the process.
#[derive(Debug)]
pub struct AccessControl {
    ban_file: PathBuf,
    banned: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<String, u32>>,
}

impl AccessControl {
    /// Open the ban list at `ban_file`, creating an empty file if absent
    pub fn open(ban_file: impl Into<PathBuf>) -> Result<Self, MailError> {
        let ban_file = ban_file.into();

        let banned = match fs::read_to_string(&ban_file) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                fs::File::create(&ban_file)?;
                HashSet::new()
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            ban_file,
            banned: Mutex::new(banned),
            failures: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the backing ban file
    pub fn ban_file(&self) -> &Path {
        &self.ban_file
    }

    /// Whether `origin` is on the ban list
    pub fn is_banned(&self, origin: &str) -> bool {
        self.banned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(origin)
    }

    /// Record one failed login from `origin`.
    ///
    /// On the failure that pushes the counter past the tolerance the origin
    /// is promoted onto the persisted ban list and its counter removed.
    /// Returns `true` when this call banned the origin.
    pub fn record_failure(&self, origin: &str) -> Result<bool, MailError> {
        let attempts = {
            let mut failures = self
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let count = failures.entry(origin.to_string()).or_insert(0);
            *count += 1;
            let attempts = *count;
            if attempts > Limits::MAX_LOGIN_FAILURES {
                failures.remove(origin);
            }
            attempts
        };

        if attempts <= Limits::MAX_LOGIN_FAILURES {
            return Ok(false);
        }

        // read-then-append on the ban state, serialized by the set's lock
        let mut banned = self
            .banned
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if banned.insert(origin.to_string()) {
            warn!(origin, "origin banned after repeated login failures");
            let mut file = OpenOptions::new().append(true).open(&self.ban_file)?;
            writeln!(file, "{origin}")?;
        }
        Ok(true)
    }

    /// Record a successful login from `origin`, clearing its counter
    pub fn record_success(&self, origin: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(origin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_in(dir: &TempDir) -> AccessControl {
        AccessControl::open(dir.path().join("blacklist.txt")).unwrap()
    }

    #[test]
    fn test_creates_missing_ban_file() {
        let dir = TempDir::new().unwrap();
        let access = open_in(&dir);
        assert!(access.ban_file().exists());
        assert!(!access.is_banned("10.0.0.1"));
    }

    #[test]
    fn test_ban_on_third_failure() {
        let dir = TempDir::new().unwrap();
        let access = open_in(&dir);

        assert!(!access.record_failure("10.0.0.1").unwrap());
        assert!(!access.record_failure("10.0.0.1").unwrap());
        assert!(!access.is_banned("10.0.0.1"));

        assert!(access.record_failure("10.0.0.1").unwrap());
        assert!(access.is_banned("10.0.0.1"));

        let contents = fs::read_to_string(access.ban_file()).unwrap();
        assert_eq!(contents, "10.0.0.1\n");
    }

    #[test]
    fn test_success_resets_counter() {
        let dir = TempDir::new().unwrap();
        let access = open_in(&dir);

        access.record_failure("10.0.0.1").unwrap();
        access.record_failure("10.0.0.1").unwrap();
        access.record_success("10.0.0.1");

        // counter starts over, so two more failures do not ban
        assert!(!access.record_failure("10.0.0.1").unwrap());
        assert!(!access.record_failure("10.0.0.1").unwrap());
        assert!(!access.is_banned("10.0.0.1"));
    }

    #[test]
    fn test_counters_are_per_origin() {
        let dir = TempDir::new().unwrap();
        let access = open_in(&dir);

        access.record_failure("10.0.0.1").unwrap();
        access.record_failure("10.0.0.1").unwrap();
        assert!(!access.record_failure("10.0.0.2").unwrap());
        assert!(!access.is_banned("10.0.0.2"));
    }

    #[test]
    fn test_bans_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blacklist.txt");

        {
            let access = AccessControl::open(&path).unwrap();
            for _ in 0..3 {
                access.record_failure("10.0.0.9").unwrap();
            }
            assert!(access.is_banned("10.0.0.9"));
        }

        let reopened = AccessControl::open(&path).unwrap();
        assert!(reopened.is_banned("10.0.0.9"));
        // in-memory counters do not survive
        assert!(!reopened.record_failure("10.0.0.8").unwrap());
    }
}
