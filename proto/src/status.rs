//! Presence states and their wire codes.

use serde::Serialize;

/// Presence state of a roster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Offline,
    Online,
    Away,
    Busy,
}

impl Status {
    /// Map an inbound presence code from an `NLN`/`ILN` line. Codes outside
    /// the known set return `None`; the caller reports them rather than
    /// guessing.
    pub fn from_code(code: &str) -> Option<Status> {
        match code {
            "NLN" => Some(Status::Online),
            "AWY" | "BRB" | "IDL" => Some(Status::Away),
            "BSY" | "PHN" | "LUN" => Some(Status::Busy),
            _ => None,
        }
    }

    /// Parse the user-facing status name.
    pub fn from_name(name: &str) -> Option<Status> {
        match name {
            "offline" => Some(Status::Offline),
            "online" => Some(Status::Online),
            "away" => Some(Status::Away),
            "busy" => Some(Status::Busy),
            _ => None,
        }
    }

    /// The code announced by an outbound `CHG`.
    pub fn wire_code(self) -> &'static str {
        match self {
            Status::Online => "NLN",
            Status::Offline => "HDN",
            Status::Away => "AWY",
            Status::Busy => "BSY",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Offline => "offline",
            Status::Online => "online",
            Status::Away => "away",
            Status::Busy => "busy",
        }
    }

    /// Buddy-list sort rank: online first, offline last.
    pub fn rank(self) -> u8 {
        match self {
            Status::Online => 0,
            Status::Away => 1,
            Status::Busy => 2,
            Status::Offline => 3,
        }
    }
}
