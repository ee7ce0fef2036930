//! Error taxonomy for sign-in and the steady-state session.

use std::io;

use thiserror::Error;

/// Failures of the two-hop passport ticket exchange.
///
/// Socket and TLS problems during the exchange surface as
/// [`ClientError::Connection`] instead; these variants cover responses that
/// arrived but did not say what they were supposed to.
#[derive(Debug, Error)]
pub enum TicketError {
    /// The nexus response did not name a login server (`DALogin=` marker
    /// absent or empty).
    #[error("login redirect not found in nexus response")]
    RedirectNotFound,

    /// The login server answered with a status other than `200 OK`.
    #[error("login server refused the ticket request: {0:?}")]
    Denied(String),

    /// The login response carried no `from-PP='...'` ticket.
    #[error("no ticket found in login response")]
    TicketNotFound,
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// The email address failed pre-flight validation; no connection was
    /// attempted.
    #[error("invalid email address: {0}")]
    Validation(String),

    /// Socket or TLS failure at any hop.
    #[error("connection failed: {0}")]
    Connection(#[from] io::Error),

    #[error(transparent)]
    Ticket(#[from] TicketError),

    /// The notification server rejected the ticket (`911`).
    #[error("invalid email or password")]
    Authentication,

    /// The server broke the rules of the dialect.
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
