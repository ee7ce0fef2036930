//! Multi-step sign-in: version negotiation on the authentication server, a
//! referral to a notification server, zero or more further referrals, then
//! passport ticket authentication.

use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use parlor_proto::{self as proto, LineBuffer, Status};

use crate::error::{ClientError, Result};
use crate::ticket::TicketSource;
use crate::txlog::TransactionLog;

/// Production authentication endpoint.
pub const AUTH_SERVER: &str = "messenger.hotmail.com:1863";

/// Referral chains are server-controlled; past this many notification-server
/// hops the server is considered broken.
const MAX_REFERRALS: usize = 8;

/// Reads block during the handshake; a stalled server fails the sign-in
/// instead of hanging it.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// An authenticated notification-server connection, ready for the steady
/// state. `frames` has carried the socket's partial lines since the first
/// read and must stay with it.
#[derive(Debug)]
pub struct Negotiated {
    pub sock: TcpStream,
    pub frames: LineBuffer,
    pub responses: TransactionLog,
    pub next_tid: u32,
}

/// Pre-flight address check; nothing is connected for a malformed address.
pub fn validate_email(email: &str) -> Result<()> {
    if email.contains('\n') {
        return Err(ClientError::Validation(
            "address contains a newline".to_string(),
        ));
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ClientError::Validation(
            "expected name@domain with exactly one '@'".to_string(),
        )),
    }
}

/// Run the full sign-in. On success the returned socket is live, the initial
/// synchronization and hidden-presence announcements have been sent, and the
/// transaction id count continues from the handshake.
pub fn negotiate(
    email: &str,
    password: &str,
    auth_server: &str,
    tickets: &dyn TicketSource,
) -> Result<Negotiated> {
    validate_email(email)?;

    let mut responses = TransactionLog::new();
    let mut tid: u32 = 1;

    log::info!("dialing authentication server {}", auth_server);
    let mut auth = connect(auth_server)?;
    let mut auth_frames = LineBuffer::new();
    let referral = identify(
        &mut auth,
        &mut auth_frames,
        &mut responses,
        &mut tid,
        proto::AUTH_VERSIONS,
        email,
    )?;
    drop(auth);

    let mut target = proto::referral_target(&referral).ok_or_else(|| {
        ClientError::Protocol(format!("no notification referral in {:?}", referral))
    })?;

    // Each hop is a fresh connection with its own partial-line buffer.
    let mut hops = 0;
    let (mut sock, mut frames, reply) = loop {
        hops += 1;
        if hops > MAX_REFERRALS {
            return Err(ClientError::Protocol(format!(
                "referral chain exceeded {} hops",
                MAX_REFERRALS
            )));
        }

        log::info!("dialing notification server {}:{}", target.0, target.1);
        let mut sock = connect(&format!("{}:{}", target.0, target.1))?;
        let mut frames = LineBuffer::new();
        let reply = identify(
            &mut sock,
            &mut frames,
            &mut responses,
            &mut tid,
            proto::NOTIFY_VERSIONS,
            email,
        )?;

        if proto::verb(&reply) == "XFR" {
            target = proto::referral_target(&reply).ok_or_else(|| {
                ClientError::Protocol(format!("unparseable referral target in {:?}", reply))
            })?;
            continue;
        }
        break (sock, frames, reply);
    };

    let challenge = proto::challenge_token(&reply).ok_or_else(|| {
        ClientError::Protocol(format!("no login challenge in {:?}", reply))
    })?;

    let ticket = tickets.ticket(challenge, password, email)?;

    let usr_tid = next(&mut tid);
    send(&mut sock, &proto::usr_ticket(usr_tid, &ticket))?;
    let verdict = responses.wait_for(&mut sock, &mut frames, usr_tid)?;
    if proto::verb(&verdict) == "911" {
        return Err(ClientError::Authentication);
    }

    log::info!("authenticated as {}", email);

    send(&mut sock, &proto::syn(next(&mut tid), 0))?;
    send(&mut sock, &proto::chg(next(&mut tid), Status::Offline.wire_code()))?;

    Ok(Negotiated {
        sock,
        frames,
        responses,
        next_tid: tid,
    })
}

fn connect(addr: &str) -> Result<TcpStream> {
    let sock = TcpStream::connect(addr)?;
    sock.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    Ok(sock)
}

/// Version negotiation, client report, and initial user identification on a
/// freshly connected server. Returns the response to the `USR` command.
fn identify(
    sock: &mut TcpStream,
    frames: &mut LineBuffer,
    responses: &mut TransactionLog,
    tid: &mut u32,
    versions: &[&str],
    email: &str,
) -> Result<String> {
    send(sock, &proto::ver(next(tid), versions))?;
    send(sock, &proto::cvr(next(tid), email))?;
    let usr_tid = next(tid);
    send(sock, &proto::usr_initiate(usr_tid, email))?;
    responses.wait_for(sock, frames, usr_tid)
}

fn next(tid: &mut u32) -> u32 {
    let t = *tid;
    *tid += 1;
    t
}

fn send(sock: &mut TcpStream, line: &str) -> Result<()> {
    log::debug!("-> {}", line.trim_end());
    sock.write_all(line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read};
    use std::net::{SocketAddr, TcpListener};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    const CHALLENGE: &str = "12345678.987654";

    struct CannedTickets;

    impl TicketSource for CannedTickets {
        fn ticket(&self, challenge: &str, password: &str, email: &str) -> Result<String> {
            assert_eq!(challenge, CHALLENGE);
            assert_eq!(password, "hunter2");
            assert_eq!(email, "test@example.com");
            Ok("t=canned".to_string())
        }
    }

    /// Read the version/report/identify triple, returning the `USR` tid.
    fn read_identify(reader: &mut impl BufRead) -> u32 {
        let mut usr_tid = 0;
        for _ in 0..3 {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line.starts_with("USR ") {
                usr_tid = line.split(' ').nth(1).unwrap().parse().unwrap();
            }
        }
        usr_tid
    }

    fn drain(reader: &mut impl Read) {
        let mut rest = String::new();
        let _ = reader.read_to_string(&mut rest);
    }

    /// Authentication server: refers every caller to `notify_addr`.
    fn spawn_auth_server(notify_addr: SocketAddr) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut writer = stream;
                let tid = read_identify(&mut reader);
                writer
                    .write_all(format!("XFR {} NS {} 0 0\n", tid, notify_addr).as_bytes())
                    .unwrap();
                drain(&mut reader);
            }
        });
        addr
    }

    /// Notification server: answers the first `redirects` connections with a
    /// referral back to itself, then runs the challenge flow. Returns the
    /// address and a counter of accepted connections.
    fn spawn_notify_server(redirects: usize, fail_auth: bool) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        thread::spawn(move || {
            let mut remaining = redirects;
            for conn in listener.incoming() {
                let stream = match conn {
                    Ok(s) => s,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut writer = stream;
                let tid = read_identify(&mut reader);

                if remaining > 0 {
                    remaining -= 1;
                    writer
                        .write_all(format!("XFR {} NS {} 0 0\n", tid, addr).as_bytes())
                        .unwrap();
                    drain(&mut reader);
                    continue;
                }

                writer
                    .write_all(format!("USR {} TWN S {}\n", tid, CHALLENGE).as_bytes())
                    .unwrap();

                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                assert!(line.contains("TWN S t=canned"), "unexpected: {:?}", line);
                let tid: u32 = line.split(' ').nth(1).unwrap().parse().unwrap();

                if fail_auth {
                    writer
                        .write_all(format!("911 {} Authentication failed\n", tid).as_bytes())
                        .unwrap();
                } else {
                    writer
                        .write_all(
                            format!("USR {} OK test@example.com Test%20User 1 0\n", tid).as_bytes(),
                        )
                        .unwrap();
                }
                drain(&mut reader);
            }
        });

        (addr, connections)
    }

    #[test]
    fn well_formed_addresses_pass_validation() {
        assert!(validate_email("user@example.com").is_ok());
    }

    #[test]
    fn malformed_addresses_fail_before_any_connection() {
        assert!(matches!(
            validate_email("user\n@example.com"),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            validate_email("user-example.com"),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            validate_email("a@b@c.com"),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            validate_email("@example.com"),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            validate_email("user@"),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn referral_chain_is_followed_in_order() {
        let (notify_addr, connections) = spawn_notify_server(2, false);
        let auth_addr = spawn_auth_server(notify_addr);

        let negotiated = negotiate(
            "test@example.com",
            "hunter2",
            &auth_addr.to_string(),
            &CannedTickets,
        )
        .unwrap();

        // Two referrals plus the final hop.
        assert_eq!(connections.load(Ordering::SeqCst), 3);
        // Auth hop used tids 1-3, each notify hop 3 more, then the ticket
        // identification and the two announcements.
        assert_eq!(negotiated.next_tid, 16);
    }

    #[test]
    fn rejected_ticket_is_an_authentication_error() {
        let (notify_addr, _connections) = spawn_notify_server(0, true);
        let auth_addr = spawn_auth_server(notify_addr);

        let err = negotiate(
            "test@example.com",
            "hunter2",
            &auth_addr.to_string(),
            &CannedTickets,
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::Authentication));
    }

    #[test]
    fn unbounded_referral_chains_are_cut_off() {
        let (notify_addr, connections) = spawn_notify_server(64, false);
        let auth_addr = spawn_auth_server(notify_addr);

        let err = negotiate(
            "test@example.com",
            "hunter2",
            &auth_addr.to_string(),
            &CannedTickets,
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(connections.load(Ordering::SeqCst), MAX_REFERRALS);
    }
}
