//! Message data structures and the on-disk message format

use crate::mail::error::MailError;

const SENDER_PREFIX: &str = "Sender: ";
const SUBJECT_PREFIX: &str = "Subject: ";
const BODY_MARKER: &str = "Message:";

/// A single mail message as stored in a mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Username of the sender
    pub sender: String,

    /// Single-line subject
    pub subject: String,

    /// Message body; one or more lines joined with `\n`
    pub body: String,
}

impl Message {
    /// Create a new message
    pub fn new(sender: String, subject: String, body: String) -> Self {
        Self {
            sender,
            subject,
            body,
        }
    }

    /// Render the message in its on-disk form.
    ///
    /// The layout is a `Sender:` line, a `Subject:` line, a `Message:`
    /// marker and then the body lines. READ sends this text verbatim.
    pub fn to_file_string(&self) -> String {
        format!(
            "{SENDER_PREFIX}{}\n{SUBJECT_PREFIX}{}\n{BODY_MARKER}\n{}\n",
            self.sender, self.subject, self.body
        )
    }

    /// Parse the on-disk form back into a message
    pub fn from_file_string(text: &str) -> Result<Self, MailError> {
        let mut lines = text.lines();

        let sender = lines
            .next()
            .and_then(|line| line.strip_prefix(SENDER_PREFIX))
            .ok_or_else(|| MailError::MalformedMessage("missing sender line".to_string()))?;

        let subject = lines
            .next()
            .and_then(|line| line.strip_prefix(SUBJECT_PREFIX))
            .ok_or_else(|| MailError::MalformedMessage("missing subject line".to_string()))?;

        match lines.next() {
            Some(line) if line.trim_end() == BODY_MARKER => {}
            _ => {
                return Err(MailError::MalformedMessage(
                    "missing body marker".to_string(),
                ));
            }
        }

        let body = lines.collect::<Vec<_>>().join("\n");

        Ok(Self::new(
            sender.to_string(),
            subject.to_string(),
            body,
        ))
    }

    /// Extract just the subject from the on-disk form.
    ///
    /// LIST only needs the second line, so the rest of the file is not
    /// inspected.
    pub fn subject_of(text: &str) -> Option<&str> {
        text.lines().nth(1)?.strip_prefix(SUBJECT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message::new(
            "alice".to_string(),
            "Hello".to_string(),
            "line one\nline two".to_string(),
        )
    }

    #[test]
    fn test_to_file_string() {
        let text = sample().to_file_string();
        assert_eq!(
            text,
            "Sender: alice\nSubject: Hello\nMessage:\nline one\nline two\n"
        );
    }

    #[test]
    fn test_round_trip() {
        let message = sample();
        let parsed = Message::from_file_string(&message.to_file_string()).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_subject_of() {
        let text = sample().to_file_string();
        assert_eq!(Message::subject_of(&text), Some("Hello"));
        assert_eq!(Message::subject_of("garbage"), None);
    }

    #[test]
    fn test_from_file_string_rejects_garbage() {
        assert!(matches!(
            Message::from_file_string("not a message"),
            Err(MailError::MalformedMessage(_))
        ));
        assert!(matches!(
            Message::from_file_string("Sender: alice\nno subject here"),
            Err(MailError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_subject_with_colon_survives() {
        let message = Message::new(
            "bob".to_string(),
            "Re: Subject: nested".to_string(),
            "body".to_string(),
        );
        let parsed = Message::from_file_string(&message.to_file_string()).unwrap();
        assert_eq!(parsed.subject, "Re: Subject: nested");
    }
}
