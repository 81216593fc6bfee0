//! Error types for the mail server

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown command")]
    InvalidCommand,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Incomplete command: {0}")]
    IncompleteCommand(String),

    #[error("Line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Password too long (max {max} characters)")]
    PasswordTooLong { max: usize },

    #[error("Subject too long (max {max} characters)")]
    SubjectTooLong { max: usize },

    #[error("Message body too large (max {max} bytes)")]
    MessageTooLarge { max: usize },

    #[error("Subject must not be empty")]
    EmptySubject,

    #[error("Message body must not be empty")]
    EmptyBody,

    #[error("Bad message number: {0}")]
    BadMessageNumber(String),

    #[error("No message with number {index}")]
    NoSuchMessage { index: usize },

    #[error("Origin {0} is banned")]
    OriginBanned(String),

    #[error("Wrong user credentials")]
    BadCredentials,

    #[error("Malformed message file: {0}")]
    MalformedMessage(String),
}

/// Protocol size limits, matching the caps the interactive client enforces
pub struct Limits;

impl Limits {
    /// Maximum length of a username
    pub const USERNAME_MAX_LENGTH: usize = 8;

    /// Maximum length of a password
    pub const PASSWORD_MAX_LENGTH: usize = 80;

    /// Maximum length of a subject line
    pub const SUBJECT_MAX_LENGTH: usize = 80;

    /// Maximum length of a single protocol line including the newline
    pub const LINE_MAX_LENGTH: usize = 1024;

    /// Maximum total size of a message body
    pub const BODY_MAX_SIZE: usize = 64 * 1024;

    /// Consecutive login failures tolerated before an origin is banned
    pub const MAX_LOGIN_FAILURES: u32 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MailError::LineTooLong {
            max: Limits::LINE_MAX_LENGTH,
        };
        assert_eq!(err.to_string(), "Line too long (max 1024 bytes)");

        let err = MailError::NoSuchMessage { index: 7 };
        assert_eq!(err.to_string(), "No message with number 7");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MailError = io.into();
        assert!(matches!(err, MailError::Io(_)));
    }
}
