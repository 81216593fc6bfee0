//! Mail server: component wiring, accept loop, graceful shutdown

use crate::mail::access::AccessControl;
use crate::mail::auth::Authenticator;
use crate::mail::dispatch::Dispatcher;
use crate::mail::error::MailError;
use crate::mail::locks::LockRegistry;
use crate::mail::session::SessionHandler;
use crate::mail::store::MailboxStore;

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info};

/// Server configuration
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Address the listening socket binds to
    pub addr: String,
    /// Root directory holding the per-user mailbox directories
    pub spool_dir: PathBuf,
    /// Flat file of banned origin addresses, one per line
    pub ban_file: PathBuf,
    /// Number of worker threads serving connections
    pub workers: usize,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:6543".to_string(),
            spool_dir: PathBuf::from("spool"),
            ban_file: PathBuf::from("blacklist.txt"),
            workers: 4,
        }
    }
}

/// The store-and-forward mail server.
///
/// Accepted connections are queued to a fixed worker pool; each worker
/// serves one session at a time. Shutdown is cooperative: a flag observed
/// by the accept loop and by sessions at their read points, never a signal
/// handler reaching into live sockets.
pub struct MailServer {
    config: MailConfig,
    handler: Arc<SessionHandler>,
    shutdown: Arc<AtomicBool>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl MailServer {
    /// Wire up the server components.
    ///
    /// Creates the spool root and the ban file if they do not exist yet.
    pub fn new(config: MailConfig, auth: Arc<dyn Authenticator>) -> Result<Self, MailError> {
        let store = Arc::new(MailboxStore::open(&config.spool_dir)?);
        let locks = Arc::new(LockRegistry::new());
        let access = Arc::new(AccessControl::open(&config.ban_file)?);
        let shutdown = Arc::new(AtomicBool::new(false));

        let handler = Arc::new(SessionHandler::new(
            store,
            locks,
            access,
            auth,
            Arc::clone(&shutdown),
        ));

        Ok(Self {
            config,
            handler,
            shutdown,
            local_addr: Arc::new(Mutex::new(None)),
        })
    }

    /// Bind the configured address and serve until shutdown (blocking)
    pub fn start(&self) -> Result<(), MailError> {
        let listener = TcpListener::bind(&self.config.addr)?;
        self.serve(listener)
    }

    /// Serve on an existing listener until shutdown (blocking).
    ///
    /// Returns once the accept loop has stopped and every worker has been
    /// joined.
    pub fn serve(&self, listener: TcpListener) -> Result<(), MailError> {
        let addr = listener.local_addr()?;
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(addr);

        info!(%addr, workers = self.config.workers, "mail server listening");

        let handler = Arc::clone(&self.handler);
        let dispatcher = Dispatcher::new(self.config.workers, move |conn| handler.run(conn))?;

        while !self.shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((conn, peer)) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        // the shutdown nudge, or a client racing it
                        break;
                    }
                    info!(%peer, "client connected");
                    if !dispatcher.submit(conn) {
                        break;
                    }
                }
                Err(err) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    error!("accept failed: {err}");
                }
            }
        }

        info!("draining worker pool");
        dispatcher.shutdown();
        info!("mail server stopped");
        Ok(())
    }

    /// Handle for requesting shutdown from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            addr: Arc::clone(&self.local_addr),
        }
    }

    /// Request shutdown of this server
    pub fn shutdown(&self) {
        self.shutdown_handle().shutdown();
    }
}

/// Requests a graceful stop: no new connections, queued work drained,
/// in-flight sessions end after their current command.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }

        // nudge the blocked accept awake with a throwaway connection
        let addr = *self.addr.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut addr) = addr {
            if addr.ip().is_unspecified() {
                addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
            }
            if let Ok(stream) = TcpStream::connect(addr) {
                drop(stream);
            }
        }
    }
}
