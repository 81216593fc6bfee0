//! Protocol responses

/// A response sent back to the client after one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Command succeeded
    Ok,
    /// Command failed; the reason is logged server-side, never sent
    Err,
    /// Payload response (LIST summary or READ message text)
    Text(String),
}

impl Response {
    /// Build the LIST payload from `(index, subject)` pairs
    pub fn listing(entries: &[(usize, String)]) -> Self {
        let mut text = format!("Number of emails: {}\n", entries.len());
        for (index, subject) in entries {
            text.push_str(&format!("{index}: {subject}\n"));
        }
        Self::Text(text)
    }

    /// Build the READ payload from the raw stored message text
    pub fn message(text: String) -> Self {
        if text.ends_with('\n') {
            Self::Text(text)
        } else {
            Self::Text(text + "\n")
        }
    }

    /// Render the response for the wire
    pub fn format(&self) -> &str {
        match self {
            Self::Ok => "OK\n",
            Self::Err => "ERR\n",
            Self::Text(text) => text,
        }
    }

    /// Whether this is the bare success response
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Whether this is the error response
    pub fn is_err(&self) -> bool {
        matches!(self, Self::Err)
    }
}
