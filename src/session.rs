//! Session lifetime: one worker thread owns the socket from the first
//! handshake byte to the last presence update, reporting to the caller over
//! a channel.
//!
//! The handshake phase reads blocking (nothing useful can happen until it
//! settles); the steady state switches the socket to non-blocking and waits
//! on a poll, so closing the session or announcing a new status interrupts
//! promptly via a waker. Updates are delivered in exact wire order.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::{Events, Interest, Poll, Token, Waker};
use serde::Serialize;

use parlor_proto::{self as proto, Status};

use crate::dispatch::{self, RosterSink, SessionState};
use crate::error::{ClientError, Result};
use crate::handshake::{self, Negotiated};
use crate::ticket::{PassportNexus, TicketSource};

const SOCKET: Token = Token(0);
const WAKER: Token = Token(1);

/// Connection parameters. `new` points at the production endpoints.
#[derive(Clone)]
pub struct Config {
    pub email: String,
    pub password: String,
    pub auth_server: String,
}

impl Config {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            auth_server: handshake::AUTH_SERVER.to_string(),
        }
    }
}

/// What the session reports to its owner, in exact wire order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    GroupCreated {
        name: String,
    },
    MemberUpserted {
        email: String,
        name: String,
        groups: Vec<usize>,
    },
    PresenceChanged {
        email: String,
        status: Status,
    },
    Unrecognized {
        raw: String,
    },
    AuthFailure,
    ConnectionError {
        detail: String,
    },
    Closed,
}

enum Command {
    SetStatus(Status),
    Close,
}

/// Handle to a signed-in session. Dropping it closes the session.
#[derive(Debug)]
pub struct Client {
    commands: Sender<Command>,
    waker: Arc<Waker>,
    worker: Option<JoinHandle<()>>,
}

impl Client {
    /// Sign in against the production passport infrastructure. Validation
    /// and authentication failures surface here, synchronously; later
    /// failures arrive as [`Event::ConnectionError`].
    pub fn sign_in(config: Config) -> Result<(Client, Receiver<Event>)> {
        Self::sign_in_with(config, Arc::new(PassportNexus))
    }

    /// Sign in with a caller-provided ticket source.
    pub fn sign_in_with(
        config: Config,
        tickets: Arc<dyn TicketSource>,
    ) -> Result<(Client, Receiver<Event>)> {
        let (event_tx, event_rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let poll = Poll::new().map_err(ClientError::Connection)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER).map_err(ClientError::Connection)?);

        let worker = thread::Builder::new()
            .name("parlor-session".to_string())
            .spawn(move || worker_main(config, tickets, poll, event_tx, cmd_rx, ready_tx))
            .map_err(ClientError::Connection)?;

        // The worker owns the socket end to end; it reports the handshake
        // verdict before entering the steady state.
        match ready_rx.recv() {
            Ok(Ok(())) => Ok((
                Client {
                    commands: cmd_tx,
                    waker,
                    worker: Some(worker),
                },
                event_rx,
            )),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(ClientError::Protocol(
                    "session worker died during sign-in".to_string(),
                ))
            }
        }
    }

    /// Announce a new presence state. Fire-and-forget: the write happens on
    /// the session worker between reads.
    pub fn set_status(&self, status: Status) {
        if self.commands.send(Command::SetStatus(status)).is_ok() {
            let _ = self.waker.wake();
        }
    }

    /// Shut the session down and wait for the worker to finish. Safe from
    /// any thread at any time; the socket is torn down between reads.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Close);
        let _ = self.waker.wake();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Forwards roster mutations into the event channel. A dropped receiver
/// means the owner lost interest; sends are best-effort.
struct ChannelSink {
    tx: Sender<Event>,
}

impl ChannelSink {
    fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl RosterSink for ChannelSink {
    fn on_group_created(&mut self, name: &str) {
        self.send(Event::GroupCreated {
            name: name.to_string(),
        });
    }

    fn on_member_upserted(&mut self, email: &str, name: &str, groups: &[usize]) {
        self.send(Event::MemberUpserted {
            email: email.to_string(),
            name: name.to_string(),
            groups: groups.to_vec(),
        });
    }

    fn on_presence_changed(&mut self, email: &str, status: Status) {
        self.send(Event::PresenceChanged {
            email: email.to_string(),
            status,
        });
    }

    fn on_unrecognized_line(&mut self, raw: &str) {
        log::warn!("unrecognized server line: {}", raw);
        self.send(Event::Unrecognized {
            raw: raw.to_string(),
        });
    }

    fn on_auth_failure(&mut self) {
        self.send(Event::AuthFailure);
    }

    fn on_connection_error(&mut self, detail: &str) {
        self.send(Event::ConnectionError {
            detail: detail.to_string(),
        });
    }
}

fn worker_main(
    config: Config,
    tickets: Arc<dyn TicketSource>,
    mut poll: Poll,
    events: Sender<Event>,
    commands: Receiver<Command>,
    ready: Sender<Result<()>>,
) {
    let negotiated = handshake::negotiate(
        &config.email,
        &config.password,
        &config.auth_server,
        tickets.as_ref(),
    );
    let negotiated = match negotiated {
        Ok(n) => {
            let _ = ready.send(Ok(()));
            n
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut sink = ChannelSink { tx: events.clone() };
    if let Err(e) = steady_state(negotiated, &mut sink, &mut poll, &commands) {
        log::error!("session terminated: {}", e);
        sink.on_connection_error(&e.to_string());
    }
    let _ = events.send(Event::Closed);
}

/// Retries short non-blocking writes. Outbound traffic is a few bytes of
/// presence and digest replies, so briefly spinning here cannot stall the
/// loop for long.
struct WireWriter<'a>(&'a mut mio::net::TcpStream);

impl Write for WireWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        loop {
            match self.0.write(data) {
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::yield_now(),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

fn steady_state(
    negotiated: Negotiated,
    sink: &mut ChannelSink,
    poll: &mut Poll,
    commands: &Receiver<Command>,
) -> Result<()> {
    let Negotiated {
        sock,
        mut frames,
        next_tid,
        ..
    } = negotiated;

    sock.set_read_timeout(None)?;
    sock.set_nonblocking(true)?;
    let mut sock = mio::net::TcpStream::from_std(sock);
    poll.registry()
        .register(&mut sock, SOCKET, Interest::READABLE)?;

    let mut state = SessionState::new(next_tid);
    let mut poll_events = Events::with_capacity(16);
    let mut buf = [0u8; 4096];

    loop {
        match poll.poll(&mut poll_events, Some(Duration::from_millis(100))) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }

        // Commands are drained between reads, with or without a wake, so a
        // close is always honored promptly.
        for command in commands.try_iter() {
            match command {
                Command::SetStatus(status) => {
                    log::info!("announcing status {}", status.as_str());
                    WireWriter(&mut sock)
                        .write_all(proto::chg(state.take_tid(), status.wire_code()).as_bytes())?;
                }
                Command::Close => return Ok(()),
            }
        }

        let readable = poll_events
            .iter()
            .any(|e| e.token() == SOCKET && e.is_readable());
        if !readable {
            continue;
        }

        loop {
            match sock.read(&mut buf) {
                Ok(0) => {
                    return Err(ClientError::Connection(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed the connection",
                    )));
                }
                Ok(n) => {
                    for line in frames.push(&buf[..n]) {
                        log::debug!("<- {}", line);
                        dispatch::dispatch(&line, sink, &mut state, &mut WireWriter(&mut sock))?;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
