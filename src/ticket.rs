//! Passport ticket exchange: converts (challenge, password, email) into the
//! opaque bearer ticket the notification server expects.
//!
//! The exchange speaks just enough HTTP for the deployed passport servers:
//! fixed GET requests, and substring extraction of the redirect target and
//! ticket from the response bodies.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ClientError, Result, TicketError};

/// Hostname of the passport nexus that announces the login server.
const NEXUS_HOST: &str = "nexus.passport.com";
const NEXUS_PORT: u16 = 443;

const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Where tickets come from. The session negotiator needs this one call, so
/// tests can substitute a canned source for the passport infrastructure.
pub trait TicketSource: Send + Sync {
    fn ticket(&self, challenge: &str, password: &str, email: &str) -> Result<String>;
}

/// The production source: two TLS hops against the passport infrastructure.
pub struct PassportNexus;

impl TicketSource for PassportNexus {
    fn ticket(&self, challenge: &str, password: &str, email: &str) -> Result<String> {
        get_ticket(challenge, password, email)
    }
}

fn get_ticket(challenge: &str, password: &str, email: &str) -> Result<String> {
    log::info!("requesting login redirect from {}", NEXUS_HOST);
    let mut nexus = tls_connect(NEXUS_HOST, NEXUS_PORT)?;
    nexus.write_all(b"GET /rdr/pprdr.asp HTTP/1.0\n\n")?;
    let redirect = read_response(&mut nexus)?;

    let (login_host, login_path) = extract_login_target(&redirect)?;
    log::info!("requesting ticket from {}", login_host);

    let mut login = tls_connect(&login_host, 443)?;
    let request = format!(
        "GET /{} HTTP/1.1\nAuthorization: Passport1.4 \
         OrgVerb=GET,OrgURL=http%3A%2F%2Fmessenger%2Emsn%2Ecom,\
         sign-in={},pwd={},{}\nHOST: {}\n\n",
        login_path, email, password, challenge, login_host
    );
    login.write_all(request.as_bytes())?;
    let reply = read_response(&mut login)?;

    let status = reply.split("\r\n").next().unwrap_or("");
    if status != "HTTP/1.1 200 OK" {
        return Err(TicketError::Denied(status.to_string()).into());
    }

    Ok(extract_ticket(&reply)?)
}

fn tls_connect(host: &str, port: u16) -> Result<rustls::StreamOwned<rustls::ClientConnection, TcpStream>> {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|e| ClientError::Connection(io::Error::other(e)))?;
    let conn = rustls::ClientConnection::new(Arc::new(config), name)
        .map_err(|e| ClientError::Connection(io::Error::other(e)))?;

    let sock = TcpStream::connect((host, port))?;
    sock.set_read_timeout(Some(IO_TIMEOUT))?;
    sock.set_write_timeout(Some(IO_TIMEOUT))?;
    Ok(rustls::StreamOwned::new(conn, sock))
}

/// Read a whole HTTP response. The passport servers close the connection
/// when they are done; a close without TLS close_notify still ends the
/// response rather than failing it.
fn read_response(stream: &mut impl Read) -> Result<String> {
    let mut body = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
                    && !body.is_empty() =>
            {
                break
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Pull the login `host/path` named after the `DALogin=` marker, which the
/// nexus terminates with a comma.
fn extract_login_target(body: &str) -> std::result::Result<(String, String), TicketError> {
    let start = body
        .find("DALogin=")
        .ok_or(TicketError::RedirectNotFound)?
        + "DALogin=".len();
    let rest = &body[start..];
    let target = &rest[..rest.find(',').unwrap_or(rest.len())];
    let (host, path) = target.split_once('/').ok_or(TicketError::RedirectNotFound)?;
    if host.is_empty() {
        return Err(TicketError::RedirectNotFound);
    }
    Ok((host.to_string(), path.to_string()))
}

/// The ticket sits between `from-PP='` and the next `'`.
fn extract_ticket(body: &str) -> std::result::Result<String, TicketError> {
    let start = body
        .find("from-PP='")
        .ok_or(TicketError::TicketNotFound)?
        + "from-PP='".len();
    let rest = &body[start..];
    let end = rest.find('\'').ok_or(TicketError::TicketNotFound)?;
    Ok(rest[..end].to_string())
}
