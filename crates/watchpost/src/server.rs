use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context as _, Error};
use mio::{net::TcpListener, Interest, Poll, Waker};
use tracing::{event, instrument, Level};

use crate::{
    event_loop::{EventLoop, LISTENER, WAKER},
    Config, Handler,
};

const THREAD_NAME: &str = "http-listener";

/// State shared between a server's handles and its event loop thread.
pub(crate) struct Shared {
    closed: AtomicBool,
    pub(crate) connections: AtomicUsize,
    waker: Waker,
}

impl Shared {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flip the closed flag and wake the loop, only the first call has any effect.
    fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        event!(Level::DEBUG, "closing");

        if let Err(error) = self.waker.wake() {
            event!(Level::ERROR, ?error, "failed to wake event loop");
        }
    }
}

/// A running HTTP listener.
///
/// Requests are served on a dedicated thread until [`close`](Self::close) is called or the
/// server is dropped.
pub struct Server {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<()>>,
}

impl Server {
    /// Bind the listener, initialize `handler`, and start serving.
    ///
    /// Returns once the event loop thread has been started. If anything fails, everything
    /// created so far is released and no thread is left running.
    #[instrument("http-server::open", skip_all)]
    pub fn open<H>(mut config: Config, mut handler: H) -> Result<Self, Error>
    where
        H: Handler,
    {
        config.apply_defaults();
        let addr = config.socket_addr()?;

        // Create the socket
        let mut listener =
            TcpListener::bind(addr).with_context(|| format!("failed to bind {}", addr))?;
        let local_addr = listener.local_addr()?;

        // Register the socket for ready events
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER)?;

        handler
            .init(&config)
            .context("failed to initialize handler")?;

        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            connections: AtomicUsize::new(0),
            waker,
        });

        let event_loop = EventLoop::new(poll, listener, shared.clone(), Box::new(handler));
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || event_loop.run())
            .context("failed to start event loop thread")?;

        event!(Level::INFO, addr = ?local_addr, "listening");

        let this = Self {
            shared,
            local_addr,
            thread: Some(thread),
        };
        Ok(this)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently open client connections.
    pub fn connection_size(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Request shutdown.
    ///
    /// Does not wait for the event loop, use [`join`](Self::join) for that. Calling this more
    /// than once has no further effect.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Handle that can close the server from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            shared: self.shared.clone(),
        }
    }

    /// Wait for the event loop thread to finish.
    ///
    /// Blocks until the server is closed, by [`close`](Self::close) or a [`CloseHandle`].
    pub fn join(&mut self) -> Result<(), Error> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        thread
            .join()
            .map_err(|_| anyhow!("event loop thread panicked"))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                event!(Level::ERROR, "event loop thread panicked");
            }
        }
    }
}

/// Cloneable handle to close a [`Server`] and query it from any thread.
#[derive(Clone)]
pub struct CloseHandle {
    shared: Arc<Shared>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn connection_size(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }
}
