//! Single-loop TCP multiplexer.
//!
//! One loop task owns the dispatcher and every session. Per-connection reader
//! tasks only move bytes: each reads one line, hands it to the loop, waits for
//! the reply and writes it back before reading again. Requests are therefore
//! executed one at a time, and each connection has at most one in flight.

use crate::dispatcher::{Dispatcher, Outcome};
use crate::session::{ConnectionId, SessionRegistry};
use coinledger_core::AssetSource;
use coinledger_protocol::{decode, encode};
use futures_util::FutureExt;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const WELCOME: &str = "Welcome";
pub const INTERNAL_ERROR: &str = "Internal server error";

const REQUEST_QUEUE: usize = 256;

/// Work handed from connection tasks to the loop.
#[derive(Debug)]
enum Request {
    Line {
        id: ConnectionId,
        line: String,
        reply: oneshot::Sender<String>,
    },
    Closed {
        id: ConnectionId,
    },
}

/// Stops a running [`Server`] from any thread or task.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
}

impl ServerHandle {
    /// Ask the loop to exit. Returns immediately; the loop wakes even if no
    /// socket is ready.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.wakeup.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

pub struct Server<S> {
    listener: TcpListener,
    dispatcher: Dispatcher<S>,
    sessions: SessionRegistry,
    running: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
}

impl<S: AssetSource> Server<S> {
    /// Bind the listening socket. Failure here is fatal to the caller.
    pub async fn bind(addr: impl ToSocketAddrs, dispatcher: Dispatcher<S>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatcher,
            sessions: SessionRegistry::new(),
            running: Arc::new(AtomicBool::new(true)),
            wakeup: Arc::new(Notify::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: self.running.clone(),
            wakeup: self.wakeup.clone(),
        }
    }

    /// Serve until [`ServerHandle::stop`] is called. Open connections are
    /// dropped on exit.
    pub async fn run(self) -> io::Result<()> {
        let Server {
            listener,
            mut dispatcher,
            mut sessions,
            running,
            wakeup,
        } = self;

        let (tx, mut rx) = mpsc::channel::<Request>(REQUEST_QUEUE);
        let mut connections = JoinSet::new();
        info!(addr = %listener.local_addr()?, "Server listening");

        while running.load(Ordering::Acquire) {
            tokio::select! {
                _ = wakeup.notified() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = sessions.open(peer);
                        info!(conn = %id, peer = %peer, "Connection opened");
                        connections.spawn(serve_connection(id, stream, tx.clone()));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
                Some(request) = rx.recv() => match request {
                    Request::Line { id, line, reply } => {
                        let response = process(&mut dispatcher, &mut sessions, id, &line).await;
                        // The reader is gone if the peer hung up mid-request.
                        let _ = reply.send(response);
                    }
                    Request::Closed { id } => {
                        if let Some(session) = sessions.close(id) {
                            info!(
                                conn = %id,
                                peer = %session.peer,
                                user = session.username().unwrap_or("-"),
                                "Connection closed"
                            );
                        }
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Connection task panicked");
                        }
                    }
                }
            }
        }

        connections.shutdown().await;
        info!(open = sessions.len(), "Server stopped");
        Ok(())
    }
}

/// One full request cycle: decode, execute, apply session effects, encode.
/// A panic anywhere inside becomes an error reply.
async fn process<S: AssetSource>(
    dispatcher: &mut Dispatcher<S>,
    sessions: &mut SessionRegistry,
    id: ConnectionId,
    line: &str,
) -> String {
    let command = decode(line);
    let identity = sessions.identity(id).map(str::to_owned);

    let outcome = AssertUnwindSafe(dispatcher.execute(identity.as_deref(), &command))
        .catch_unwind()
        .await;

    let text = match outcome {
        Ok(Outcome::Reply(text)) | Ok(Outcome::Exit(text)) => text,
        Ok(Outcome::LoggedIn(username)) => {
            info!(conn = %id, user = %username, "Logged in");
            sessions.authenticate(id, username);
            WELCOME.to_string()
        }
        Ok(Outcome::LoggedOut(text)) => {
            info!(conn = %id, user = identity.as_deref().unwrap_or("-"), "Logged out");
            sessions.clear(id);
            text
        }
        Err(_) => {
            error!(conn = %id, command = %command.name, "Request handler panicked");
            INTERNAL_ERROR.to_string()
        }
    };
    encode(text)
}

async fn serve_connection(id: ConnectionId, stream: TcpStream, requests: mpsc::Sender<Request>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(conn = %id, error = %e, "Read failed");
                break;
            }
        };

        let (reply, response) = oneshot::channel();
        if requests.send(Request::Line { id, line, reply }).await.is_err() {
            return;
        }
        let Ok(response) = response.await else {
            return;
        };

        let mut frame = response.into_bytes();
        frame.push(b'\n');
        if let Err(e) = writer.write_all(&frame).await {
            debug!(conn = %id, error = %e, "Write failed");
            break;
        }
    }

    let _ = requests.send(Request::Closed { id }).await;
}
