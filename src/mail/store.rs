//! File-backed mailbox persistence
//!
//! One directory per user under the spool root, one file per message named
//! by a random UUID. Callers are expected to hold the mailbox's lock from
//! the [`LockRegistry`](crate::LockRegistry) around any
//! operation that reads or mutates a mailbox.

use crate::mail::error::MailError;
use crate::mail::message::Message;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Suffix for in-flight message files, excluded from enumeration
const TMP_SUFFIX: &str = ".tmp";

/// Store for per-user mailbox directories
#[derive(Debug)]
pub struct MailboxStore {
    root: PathBuf,
}

impl MailboxStore {
    /// Open the store rooted at `root`, creating the directory if absent
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MailError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The spool root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `user`'s messages
    pub fn mailbox_path(&self, user: &str) -> PathBuf {
        self.root.join(user)
    }

    /// Create `user`'s mailbox if it does not exist yet.
    ///
    /// Creating an existing mailbox is a no-op, not an error.
    pub fn ensure_mailbox(&self, user: &str) -> Result<(), MailError> {
        let path = self.mailbox_path(user);
        if !path.is_dir() {
            fs::create_dir_all(&path)?;
            debug!(user, path = %path.display(), "mailbox created");
        }
        Ok(())
    }

    /// Append a message to `user`'s mailbox and return its identifier.
    ///
    /// The message is written to a temporary file in the mailbox directory
    /// and atomically renamed into place, so a partially written message is
    /// never visible under its final name.
    pub fn append_message(&self, user: &str, message: &Message) -> Result<String, MailError> {
        let dir = self.mailbox_path(user);
        let id = Uuid::new_v4().to_string();

        let mut file = tempfile::Builder::new()
            .suffix(TMP_SUFFIX)
            .tempfile_in(&dir)?;
        file.write_all(message.to_file_string().as_bytes())?;
        file.flush()?;
        file.persist(dir.join(&id)).map_err(|err| err.error)?;

        debug!(user, %id, "message stored");
        Ok(id)
    }

    /// Enumerate `user`'s messages as `(index, subject)` pairs.
    ///
    /// Indices are 1-based and contiguous. An empty mailbox yields an empty
    /// list.
    pub fn list_messages(&self, user: &str) -> Result<Vec<(usize, String)>, MailError> {
        let mut entries = Vec::new();

        for (position, path) in self.message_files(user)?.iter().enumerate() {
            let contents = fs::read_to_string(path)?;
            let subject = match Message::subject_of(&contents) {
                Some(subject) => subject.to_string(),
                None => {
                    warn!(path = %path.display(), "message file has no subject line");
                    String::new()
                }
            };
            entries.push((position + 1, subject));
        }

        Ok(entries)
    }

    /// Read message `index` (1-based) from `user`'s mailbox.
    ///
    /// The index is resolved against the current enumeration, not a cached
    /// listing. Returns the raw stored text.
    pub fn read_message(&self, user: &str, index: usize) -> Result<String, MailError> {
        let path = self.resolve_index(user, index)?;
        Ok(fs::read_to_string(path)?)
    }

    /// Delete message `index` (1-based) from `user`'s mailbox.
    ///
    /// A failed delete leaves the message in place.
    pub fn delete_message(&self, user: &str, index: usize) -> Result<(), MailError> {
        let path = self.resolve_index(user, index)?;
        fs::remove_file(path)?;
        Ok(())
    }

    fn resolve_index(&self, user: &str, index: usize) -> Result<PathBuf, MailError> {
        // message numbers start at 1
        if index == 0 {
            return Err(MailError::NoSuchMessage { index });
        }
        let files = self.message_files(user)?;
        files
            .get(index - 1)
            .cloned()
            .ok_or(MailError::NoSuchMessage { index })
    }

    /// Regular message files in `user`'s mailbox, sorted by filename.
    ///
    /// The sort keeps the enumeration order deterministic between calls;
    /// in-flight `.tmp` files and non-regular entries are skipped.
    fn message_files(&self, user: &str) -> Result<Vec<PathBuf>, MailError> {
        let mut files = Vec::new();

        for entry in fs::read_dir(self.mailbox_path(user))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name.ends_with(TMP_SUFFIX) {
                continue;
            }
            files.push(entry.path());
        }

        files.sort();
        Ok(files)
    }
}
