//! Fixed-size worker pool over a shared connection queue
//!
//! Decouples "accept" from "serve": the accept loop enqueues connections
//! and returns to `accept` immediately, while a bounded number of workers
//! drain the queue in FIFO order. A slow client therefore occupies one
//! worker, never the accept loop.

use crate::mail::error::MailError;

use std::collections::VecDeque;
use std::net::TcpStream;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

/// Queue plus the shutdown flag, guarded together so "has work or is
/// shutting down" is one atomic observation.
#[derive(Debug, Default)]
struct QueueState {
    connections: VecDeque<TcpStream>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<QueueState>,
    available: Condvar,
}

/// The worker pool
pub struct Dispatcher {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn `size` workers, each running `handler` on the connections it
    /// dequeues.
    pub fn new<F>(size: usize, handler: F) -> Result<Self, MailError>
    where
        F: Fn(TcpStream) + Send + Sync + 'static,
    {
        let inner = Arc::new(Inner::default());
        let handler = Arc::new(handler);

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let inner = Arc::clone(&inner);
            let handler = Arc::clone(&handler);
            let worker = thread::Builder::new()
                .name(format!("mail-worker-{id}"))
                .spawn(move || worker_loop(&inner, &*handler))?;
            workers.push(worker);
        }

        Ok(Self { inner, workers })
    }

    /// Enqueue an accepted connection for the next free worker.
    ///
    /// Returns `false` (and drops the connection) once shutdown has begun.
    pub fn submit(&self, connection: TcpStream) -> bool {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.shutdown {
            return false;
        }
        state.connections.push_back(connection);
        drop(state);
        self.inner.available.notify_one();
        true
    }

    /// Number of worker threads in the pool
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop the pool: no new work is admitted, already-queued connections
    /// are drained, and every worker is joined before this returns.
    pub fn shutdown(self) {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.shutdown = true;
        }
        self.inner.available.notify_all();

        for worker in self.workers {
            if worker.join().is_err() {
                warn!("worker thread panicked");
            }
        }
        debug!("worker pool stopped");
    }
}

fn worker_loop<F>(inner: &Inner, handler: &F)
where
    F: Fn(TcpStream),
{
    loop {
        let connection = {
            let mut state = inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            loop {
                // first accepted, first served
                if let Some(connection) = state.connections.pop_front() {
                    break Some(connection);
                }
                if state.shutdown {
                    break None;
                }
                state = inner
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        match connection {
            Some(connection) => handler(connection),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Connected socket pair for feeding the pool in tests
    fn socket_pair(listener: &TcpListener) -> (TcpStream, TcpStream) {
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        (client, server_side)
    }

    #[test]
    fn test_every_submitted_connection_is_served() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let served = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&served);
        let dispatcher = Dispatcher::new(3, move |_conn| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let mut clients = Vec::new();
        for _ in 0..10 {
            let (client, server_side) = socket_pair(&listener);
            clients.push(client);
            assert!(dispatcher.submit(server_side));
        }

        dispatcher.shutdown();
        assert_eq!(served.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_shutdown_refuses_new_work() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let served = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&served);
        let dispatcher = Dispatcher::new(2, move |_conn| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let (_client, server_side) = socket_pair(&listener);
        assert!(dispatcher.submit(server_side));
        dispatcher.shutdown();
        assert_eq!(served.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_with_idle_workers_returns() {
        let dispatcher = Dispatcher::new(4, |_conn| {}).unwrap();
        // all four workers are blocked on the queue; shutdown must wake
        // and join them
        dispatcher.shutdown();
    }

    #[test]
    fn test_workers_run_in_parallel_up_to_pool_size() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let current = Arc::clone(&in_flight);
        let high = Arc::clone(&peak);
        let dispatcher = Dispatcher::new(2, move |mut conn: TcpStream| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            high.fetch_max(now, Ordering::SeqCst);
            // hold the worker until the client hangs up
            let mut sink = Vec::new();
            let _ = conn.read_to_end(&mut sink);
            current.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

        let mut clients = Vec::new();
        for _ in 0..4 {
            let (client, server_side) = socket_pair(&listener);
            clients.push(client);
            dispatcher.submit(server_side);
        }

        // give both workers time to pick up a connection
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(in_flight.load(Ordering::SeqCst), 2);

        drop(clients);
        dispatcher.shutdown();
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }
}
