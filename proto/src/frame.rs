//! Reassembly of newline-terminated command lines from raw socket reads.

/// Accumulates bytes from a stream socket and yields complete lines.
///
/// The transport gives no framing guarantees, so a command may arrive split
/// across reads; the trailing fragment is carried until its terminating
/// newline shows up. A line is never yielded twice and never with missing or
/// duplicated bytes, however the read boundaries fall.
#[derive(Debug, Default)]
pub struct LineBuffer {
    carry: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk read from the socket. Carriage returns are stripped.
    /// Returns every line whose terminating newline has now been seen, in
    /// wire order; empty lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(chunk).replace('\r', "");
        self.carry.push_str(&text);
        if self.carry.is_empty() {
            return Vec::new();
        }

        let complete = self.carry.ends_with('\n');
        let mut lines: Vec<String> = self.carry.split('\n').map(str::to_string).collect();
        if complete {
            self.carry.clear();
        } else {
            self.carry = lines.pop().unwrap_or_default();
        }
        lines.retain(|l| !l.is_empty());
        lines
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> &str {
        &self.carry
    }
}
