//! Client for an MSN-family presence protocol: passport ticket sign-in,
//! notification-server session negotiation, and roster/presence updates
//! delivered over a channel.

pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod roster;
pub mod session;
pub mod ticket;
pub mod txlog;

pub use error::{ClientError, Result, TicketError};
pub use session::{Client, Config, Event};
