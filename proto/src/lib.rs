//! Wire protocol for the notification-server dialect spoken by parlor.
//!
//! Commands are single newline-terminated lines of space-delimited tokens.
//! Client-originated commands carry a per-session transaction id as the
//! second token; most server responses echo it back in the same position.

pub mod frame;
pub mod status;

pub use frame::LineBuffer;
pub use status::Status;

/// Protocol versions offered on the authentication hop.
pub const AUTH_VERSIONS: &[&str] = &["MSNP8", "MSNP9"];

/// Protocol versions offered on the notification hop.
pub const NOTIFY_VERSIONS: &[&str] = &["MSNP8"];

/// Fixed client identification reported by `CVR`.
pub const CLIENT_INFO: &str = "0x0409 win 4.10 i386 MSNMSGR 6.2.0208 MSMSGS";

/// Shared secret folded into `CHL` challenge digests.
pub const CHALLENGE_SECRET: &str = "Q1P7W2E4J9R8U3S5";

/// Client id presented in `QRY` digest replies.
pub const QRY_CLIENT_ID: &str = "msmsgs@msnmsgr.com";

/// Version negotiation: `VER <tid> <versions...> CVR0`.
pub fn ver(tid: u32, versions: &[&str]) -> String {
    format!("VER {} {} CVR0\n", tid, versions.join(" "))
}

/// Client version report: `CVR <tid> <client info> <email>`.
pub fn cvr(tid: u32, email: &str) -> String {
    format!("CVR {} {} {}\n", tid, CLIENT_INFO, email)
}

/// First user identification, asking the server for a login challenge.
pub fn usr_initiate(tid: u32, email: &str) -> String {
    format!("USR {} TWN I {}\n", tid, email)
}

/// Second user identification, presenting the passport ticket.
pub fn usr_ticket(tid: u32, ticket: &str) -> String {
    format!("USR {} TWN S {}\n", tid, ticket)
}

/// Roster synchronization request.
pub fn syn(tid: u32, sync: u32) -> String {
    format!("SYN {} {}\n", tid, sync)
}

/// Presence announcement. `code` is an outbound status code
/// (see [`Status::wire_code`]).
pub fn chg(tid: u32, code: &str) -> String {
    format!("CHG {} {} 0\n", tid, code)
}

/// Challenge digest reply: a `QRY` header line followed by the hex digest
/// payload, which is not newline-terminated.
pub fn qry(tid: u32, digest_hex: &str) -> String {
    format!(
        "QRY {} {} {}\n{}",
        tid,
        QRY_CLIENT_ID,
        digest_hex.len(),
        digest_hex
    )
}

/// First token of a line; empty for an empty line.
pub fn verb(line: &str) -> &str {
    line.split(' ').next().unwrap_or("")
}

/// The transaction id carried as a line's second token, if it parses.
pub fn response_tid(line: &str) -> Option<u32> {
    line.split(' ').nth(1)?.parse().ok()
}

/// Referral target (`host:port`) named at token 3, used by `XFR` responses
/// and by the authentication server's `USR` referral.
pub fn referral_target(line: &str) -> Option<(String, u16)> {
    let field = line.split(' ').nth(3)?;
    let (host, port) = field.split_once(':')?;
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}

/// Login challenge carried at token 4 of a `USR ... TWN S <challenge>`
/// response.
pub fn challenge_token(line: &str) -> Option<&str> {
    line.split(' ').nth(4).filter(|t| !t.is_empty())
}

/// Display names travel with spaces escaped as `%20`.
pub fn decode_name(token: &str) -> String {
    token.replace("%20", " ")
}
