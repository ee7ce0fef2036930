//! Translation of inbound server lines into roster mutations.

use std::io::Write;

use md5::{Digest, Md5};
use parlor_proto::{self as proto, Status};

use crate::error::Result;

/// Boundary to the buddy-list owner. The dispatcher reports what the server
/// said; storage, lookup and ordering live on the other side.
pub trait RosterSink {
    fn on_group_created(&mut self, name: &str);
    fn on_member_upserted(&mut self, email: &str, name: &str, groups: &[usize]);
    fn on_presence_changed(&mut self, email: &str, status: Status);
    fn on_unrecognized_line(&mut self, raw: &str);
    fn on_auth_failure(&mut self);
    fn on_connection_error(&mut self, detail: &str);
}

/// Per-session counters the dispatcher reads and advances.
#[derive(Debug)]
pub struct SessionState {
    pub next_tid: u32,
    pub sync: u32,
}

impl SessionState {
    pub fn new(next_tid: u32) -> Self {
        Self { next_tid, sync: 0 }
    }

    pub fn take_tid(&mut self) -> u32 {
        let tid = self.next_tid;
        self.next_tid += 1;
        tid
    }
}

/// Apply one complete line. Mutations go to `sink`; the only write back onto
/// the wire is the digest reply a `CHL` demands. Lines that do not parse are
/// reported, never fatal.
pub fn dispatch<W: Write>(
    line: &str,
    sink: &mut dyn RosterSink,
    state: &mut SessionState,
    wire: &mut W,
) -> Result<()> {
    let tokens: Vec<&str> = line.split(' ').collect();
    match tokens.first().copied().unwrap_or("") {
        "LSG" => match tokens.get(2) {
            Some(name) => sink.on_group_created(&proto::decode_name(name)),
            None => sink.on_unrecognized_line(line),
        },

        "LST" => match (tokens.get(1), tokens.get(2)) {
            (Some(email), Some(name)) => {
                // Group indices on the wire are offset past the default
                // group at 0; no list means the default group.
                let mut groups: Vec<usize> = tokens
                    .get(4)
                    .map(|list| {
                        list.split(',')
                            .filter_map(|g| g.parse::<usize>().ok())
                            .map(|g| g + 1)
                            .collect()
                    })
                    .unwrap_or_default();
                if groups.is_empty() {
                    groups.push(0);
                }
                sink.on_member_upserted(email, &proto::decode_name(name), &groups);
            }
            _ => sink.on_unrecognized_line(line),
        },

        "SYN" => match tokens.get(2).and_then(|t| t.parse().ok()) {
            Some(sync) => state.sync = sync,
            None => sink.on_unrecognized_line(line),
        },

        "CHL" => match tokens.get(2) {
            Some(seed) => {
                let mut hasher = Md5::new();
                hasher.update(seed.as_bytes());
                hasher.update(proto::CHALLENGE_SECRET.as_bytes());
                let digest = hex::encode(hasher.finalize());
                wire.write_all(proto::qry(state.take_tid(), &digest).as_bytes())?;
            }
            None => sink.on_unrecognized_line(line),
        },

        "NLN" | "ILN" => match (tokens.get(2), tokens.get(3)) {
            (Some(code), Some(email)) => match Status::from_code(code) {
                Some(status) => sink.on_presence_changed(email, status),
                // A code outside the known set is reported, not guessed.
                None => sink.on_unrecognized_line(line),
            },
            _ => sink.on_unrecognized_line(line),
        },

        "FLN" => match tokens.get(1) {
            Some(email) => sink.on_presence_changed(email, Status::Offline),
            None => sink.on_unrecognized_line(line),
        },

        // A mid-session 911 means the server revoked the authentication.
        "911" => sink.on_auth_failure(),

        _ => sink.on_unrecognized_line(line),
    }
    Ok(())
}
