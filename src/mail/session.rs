//! Session state machine and command handling
//!
//! One session per accepted connection, owned by the worker thread serving
//! it. Commands arrive as newline-delimited lines; a line-reassembly buffer
//! accumulates across short reads, so a command split over several `read`
//! calls is handled the same as one that arrives whole.

use crate::mail::access::AccessControl;
use crate::mail::auth::Authenticator;
use crate::mail::error::{Limits, MailError};
use crate::mail::locks::LockRegistry;
use crate::mail::message::Message;
use crate::mail::response::Response;
use crate::mail::store::MailboxStore;

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

/// Welcome line sent when a session opens
const GREETING: &str = "Welcome to postbox! Please enter your commands...\n";

/// How long a blocked read waits before re-checking the shutdown flag
const READ_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Bytes requested per read while reassembling a line
const READ_CHUNK: usize = 512;

/// Protocol state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, LOGIN not yet accepted
    Unauthenticated,
    /// LOGIN accepted; mailbox commands available
    Authenticated,
    /// QUIT processed or connection gone; terminal
    Terminated,
}

/// Per-connection protocol state
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    username: Option<String>,
    origin: String,
}

impl Session {
    /// Create a fresh session for a connection accepted from `origin`
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            state: SessionState::Unauthenticated,
            username: None,
            origin: origin.into(),
        }
    }

    /// Current protocol state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Address the connection was accepted from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Authenticated username, if LOGIN has succeeded
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Mark the session authenticated as `username`.
    ///
    /// A repeated LOGIN simply overwrites the identity; there is no
    /// explicit logout.
    pub fn login(&mut self, username: String) {
        self.username = Some(username);
        self.state = SessionState::Authenticated;
    }

    /// Move to the terminal state
    pub fn terminate(&mut self) {
        self.state = SessionState::Terminated;
    }
}

/// Usernames double as mailbox directory names, so only short ASCII
/// alphanumeric names are accepted.
fn validate_username(name: &str) -> Result<(), MailError> {
    if name.is_empty()
        || name.len() > Limits::USERNAME_MAX_LENGTH
        || !name.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(MailError::InvalidUsername(name.to_string()));
    }
    Ok(())
}

/// Reassembles newline-delimited lines from a byte stream.
///
/// Bytes are buffered across reads until a newline shows up; the buffer is
/// bounded so a peer that never sends a newline cannot grow it without
/// limit. A read timeout on the underlying stream surfaces here as a poll
/// of the shutdown flag rather than an error.
struct LineReader<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }

    /// Next line without its terminator, `None` on end of stream or
    /// shutdown.
    fn read_line(&mut self, shutdown: &AtomicBool) -> Result<Option<String>, MailError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.buffer.len() > Limits::LINE_MAX_LENGTH {
                return Err(MailError::LineTooLong {
                    max: Limits::LINE_MAX_LENGTH,
                });
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    // trailing data without a newline still counts as a line
                    let mut line = std::mem::take(&mut self.buffer);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    if shutdown.load(Ordering::Relaxed) {
                        return Ok(None);
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Serves sessions over accepted connections.
///
/// One handler is shared by all worker threads; per-connection state lives
/// in the [`Session`] each call to [`SessionHandler::run`] creates.
pub struct SessionHandler {
    store: Arc<MailboxStore>,
    locks: Arc<LockRegistry>,
    access: Arc<AccessControl>,
    auth: Arc<dyn Authenticator>,
    shutdown: Arc<AtomicBool>,
}

impl SessionHandler {
    pub fn new(
        store: Arc<MailboxStore>,
        locks: Arc<LockRegistry>,
        access: Arc<AccessControl>,
        auth: Arc<dyn Authenticator>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            locks,
            access,
            auth,
            shutdown,
        }
    }

    /// Serve one connection to completion.
    ///
    /// Never panics the worker: every session failure ends here, logged,
    /// invisible to the pool.
    pub fn run(&self, stream: TcpStream) {
        let origin = match stream.peer_addr() {
            Ok(addr) => addr.ip().to_string(),
            Err(err) => {
                warn!("could not determine peer address: {err}");
                return;
            }
        };

        debug!(%origin, "session opened");
        if let Err(err) = self.serve(stream, &origin) {
            warn!(%origin, "session ended with error: {err}");
        } else {
            debug!(%origin, "session closed");
        }
    }

    fn serve(&self, mut stream: TcpStream, origin: &str) -> Result<(), MailError> {
        // short timeout so a blocked read re-checks the shutdown flag
        stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;

        let mut session = Session::new(origin);
        let mut reader = LineReader::new(stream.try_clone()?);

        self.send(&mut stream, GREETING)?;

        while session.state() != SessionState::Terminated {
            let line = match reader.read_line(&self.shutdown) {
                Ok(Some(line)) => line,
                // peer closed or shutdown requested
                Ok(None) => break,
                Err(err @ MailError::LineTooLong { .. }) => {
                    // cannot resync a stream without newlines; give up
                    warn!(origin, "{err}");
                    self.send(&mut stream, Response::Err.format())?;
                    break;
                }
                Err(err) => return Err(err),
            };

            if line == "QUIT" {
                // socket teardown is the acknowledgment
                session.terminate();
                break;
            }

            let result = match line.as_str() {
                "LOGIN" => self.handle_login(&mut reader, &mut session),
                "SEND" | "LIST" | "READ" | "DEL" if !session.is_authenticated() => {
                    Err(MailError::NotLoggedIn)
                }
                "SEND" => self.handle_send(&mut reader, &session),
                "LIST" => self.handle_list(&session),
                "READ" => self.handle_read(&mut reader, &session),
                "DEL" => self.handle_del(&mut reader, &session),
                _ => Err(MailError::InvalidCommand),
            };

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    debug!(origin, command = %line, "command failed: {err}");
                    Response::Err
                }
            };
            self.send(&mut stream, response.format())?;
        }

        Ok(())
    }

    /// LOGIN: ban check first, then the credential collaborator, then the
    /// failure counter.
    fn handle_login(
        &self,
        reader: &mut LineReader<TcpStream>,
        session: &mut Session,
    ) -> Result<Response, MailError> {
        let username = self.required_line(reader, "LOGIN needs a username line")?;
        let password = self.required_line(reader, "LOGIN needs a password line")?;

        validate_username(&username)?;
        if password.is_empty() {
            return Err(MailError::IncompleteCommand(
                "LOGIN needs a non-empty password".to_string(),
            ));
        }
        if password.len() > Limits::PASSWORD_MAX_LENGTH {
            return Err(MailError::PasswordTooLong {
                max: Limits::PASSWORD_MAX_LENGTH,
            });
        }

        let origin = session.origin().to_string();
        if self.access.is_banned(&origin) {
            return Err(MailError::OriginBanned(origin));
        }

        if !self.auth.authenticate(&username, &password) {
            self.access.record_failure(&origin)?;
            return Err(MailError::BadCredentials);
        }
        self.access.record_success(&origin);

        {
            let lock = self.locks.acquire(&username);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.store.ensure_mailbox(&username)?;
        }

        info!(user = %username, origin = %session.origin(), "user logged in");
        session.login(username);
        Ok(Response::Ok)
    }

    /// SEND: receiver line, subject line, body lines up to a lone `.`
    fn handle_send(
        &self,
        reader: &mut LineReader<TcpStream>,
        session: &Session,
    ) -> Result<Response, MailError> {
        let receiver = self.required_line(reader, "SEND needs a receiver line")?;
        let subject = self.required_line(reader, "SEND needs a subject line")?;

        let mut body_lines = Vec::new();
        let mut body_size = 0usize;
        let mut oversized = false;
        loop {
            let line = self.required_line(reader, "SEND body not terminated")?;
            if line == "." {
                break;
            }
            body_size += line.len() + 1;
            if body_size > Limits::BODY_MAX_SIZE {
                // keep draining to the terminator so the session stays in sync
                oversized = true;
                continue;
            }
            body_lines.push(line);
        }

        // the whole frame is consumed before any validation, so a rejected
        // SEND leaves the next line of input a command again
        validate_username(&receiver)?;
        if subject.len() > Limits::SUBJECT_MAX_LENGTH {
            return Err(MailError::SubjectTooLong {
                max: Limits::SUBJECT_MAX_LENGTH,
            });
        }
        if oversized {
            return Err(MailError::MessageTooLarge {
                max: Limits::BODY_MAX_SIZE,
            });
        }
        if subject.is_empty() {
            return Err(MailError::EmptySubject);
        }
        if body_lines.is_empty() {
            return Err(MailError::EmptyBody);
        }

        let sender = session.username().ok_or(MailError::NotLoggedIn)?;
        let message = Message::new(sender.to_string(), subject, body_lines.join("\n"));

        let lock = self.locks.acquire(&receiver);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.ensure_mailbox(&receiver)?;
        let id = self.store.append_message(&receiver, &message)?;

        info!(from = %message.sender, to = %receiver, %id, "message delivered");
        Ok(Response::Ok)
    }

    fn handle_list(&self, session: &Session) -> Result<Response, MailError> {
        let user = session.username().ok_or(MailError::NotLoggedIn)?;

        let lock = self.locks.acquire(user);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = self.store.list_messages(user)?;
        Ok(Response::listing(&entries))
    }

    fn handle_read(
        &self,
        reader: &mut LineReader<TcpStream>,
        session: &Session,
    ) -> Result<Response, MailError> {
        let index = self.message_number(reader, "READ needs a message number")?;
        let user = session.username().ok_or(MailError::NotLoggedIn)?;

        let lock = self.locks.acquire(user);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let text = self.store.read_message(user, index)?;
        Ok(Response::message(text))
    }

    fn handle_del(
        &self,
        reader: &mut LineReader<TcpStream>,
        session: &Session,
    ) -> Result<Response, MailError> {
        let index = self.message_number(reader, "DEL needs a message number")?;
        let user = session.username().ok_or(MailError::NotLoggedIn)?;

        let lock = self.locks.acquire(user);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.delete_message(user, index)?;
        Ok(Response::Ok)
    }

    fn required_line(
        &self,
        reader: &mut LineReader<TcpStream>,
        what: &str,
    ) -> Result<String, MailError> {
        reader
            .read_line(&self.shutdown)?
            .ok_or_else(|| MailError::IncompleteCommand(what.to_string()))
    }

    fn message_number(
        &self,
        reader: &mut LineReader<TcpStream>,
        what: &str,
    ) -> Result<usize, MailError> {
        let line = self.required_line(reader, what)?;
        line.trim()
            .parse()
            .map_err(|_| MailError::BadMessageNumber(line))
    }

    fn send(&self, stream: &mut TcpStream, text: &str) -> Result<(), MailError> {
        stream.write_all(text.as_bytes())?;
        stream.flush()?;
        Ok(())
    }
}
