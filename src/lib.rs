//! # Postbox
//!
//! Postbox is a store-and-forward mail server.
//!
//! Authenticated clients connect over TCP, issue line-oriented commands to
//! send, list, read and delete short text messages addressed to other
//! users, and each user's messages persist as one file per message in a
//! per-user mailbox directory.
//!
//! ## Quick Start
//!
//! ```rust
//! use postbox::{MailConfig, MailServer, StaticCredentials};
//! use std::io::{BufRead, BufReader, Write};
//! use std::net::{TcpListener, TcpStream};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let dir = std::env::temp_dir().join(format!("postbox-doc-{}", std::process::id()));
//! let config = MailConfig {
//!     addr: "127.0.0.1:0".to_string(),
//!     spool_dir: dir.join("spool"),
//!     ban_file: dir.join("blacklist.txt"),
//!     workers: 2,
//! };
//! let auth = Arc::new(StaticCredentials::new().with_user("alice", "secret"));
//! let server = MailServer::new(config, auth).unwrap();
//! let handle = server.shutdown_handle();
//!
//! let listener = TcpListener::bind("127.0.0.1:0").unwrap();
//! let addr = listener.local_addr().unwrap();
//! let serving = thread::spawn(move || server.serve(listener));
//!
//! // Log in over the wire
//! let mut stream = TcpStream::connect(addr).unwrap();
//! let mut reader = BufReader::new(stream.try_clone().unwrap());
//! let mut line = String::new();
//! reader.read_line(&mut line).unwrap(); // greeting
//!
//! write!(stream, "LOGIN\nalice\nsecret\n").unwrap();
//! line.clear();
//! reader.read_line(&mut line).unwrap();
//! assert_eq!(line, "OK\n");
//!
//! write!(stream, "QUIT\n").unwrap();
//! drop(stream);
//!
//! handle.shutdown();
//! serving.join().unwrap().unwrap();
//! ```
//!
//! ## Protocol
//!
//! Commands are newline-delimited and case-sensitive:
//!
//! - `LOGIN` + username line + password line - authenticate the session
//! - `SEND` + receiver + subject + body lines up to a lone `.` - deliver a message
//! - `LIST` - number of messages and their subjects
//! - `READ` + message number - full text of one message
//! - `DEL` + message number - delete one message
//! - `QUIT` - close the connection
//!
//! Responses are `OK`, `ERR`, or a payload (the LIST summary or the stored
//! message text). Commands other than `LOGIN` and `QUIT` require a
//! successful login first.
//!
//! ## Notes
//!
//! - Connections are served by a fixed-size worker pool; a slow client
//!   occupies one worker, never the accept loop.
//! - Operations on one mailbox serialize through a per-mailbox lock;
//!   unrelated mailboxes proceed in parallel.
//! - Three consecutive failed logins ban the origin address; bans persist
//!   in a flat file across restarts.
//! - Messages are stored unencrypted; there is no relaying and no
//!   replication.

mod mail;

pub use mail::{
    AccessControl, Authenticator, Dispatcher, Limits, LockRegistry, MailConfig, MailError,
    MailServer, MailboxStore, Message, Response, Session, SessionHandler, SessionState,
    ShutdownHandle, StaticCredentials,
};
