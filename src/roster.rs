//! A plain buddy-list model: named groups of members ordered by presence.
//!
//! The session core only talks to it through [`RosterSink`]; an embedding
//! UI can substitute its own storage and keep the core unchanged.

use serde::Serialize;

use parlor_proto::Status;

use crate::dispatch::RosterSink;

#[derive(Debug, Clone, Serialize)]
pub struct Member {
    pub email: String,
    pub name: String,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub name: String,
    members: Vec<Member>,
}

impl Group {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Vec::new(),
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn find(&self, email: &str) -> Option<usize> {
        self.members.iter().position(|m| m.email == email)
    }

    fn upsert(&mut self, member: Member) {
        match self.find(&member.email) {
            Some(i) => self.members[i] = member,
            None => self.members.push(member),
        }
        self.sort();
    }

    /// Online first, offline last; ties alphabetical by display name.
    fn sort(&mut self) {
        self.members.sort_by(|a, b| {
            a.status
                .rank()
                .cmp(&b.status.rank())
                .then_with(|| a.name.cmp(&b.name))
        });
    }
}

/// Groups indexed the way the wire indexes them: the default group at 0,
/// server-announced groups following in announcement order.
#[derive(Debug, Clone, Serialize)]
pub struct Roster {
    groups: Vec<Group>,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    pub fn new() -> Self {
        Self {
            groups: vec![Group::new("Other")],
        }
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Status of the member with `email`, scanning all groups.
    pub fn status_of(&self, email: &str) -> Option<Status> {
        self.groups
            .iter()
            .find_map(|g| g.find(email).map(|i| g.members[i].status))
    }
}

impl RosterSink for Roster {
    fn on_group_created(&mut self, name: &str) {
        self.groups.push(Group::new(name));
    }

    fn on_member_upserted(&mut self, email: &str, name: &str, groups: &[usize]) {
        for &index in groups {
            match self.groups.get_mut(index) {
                Some(group) => group.upsert(Member {
                    email: email.to_string(),
                    name: name.to_string(),
                    status: Status::Offline,
                }),
                None => log::warn!("list entry {} names unknown group {}", email, index),
            }
        }
    }

    fn on_presence_changed(&mut self, email: &str, status: Status) {
        for group in &mut self.groups {
            if let Some(i) = group.find(email) {
                group.members[i].status = status;
                group.sort();
            }
        }
    }

    fn on_unrecognized_line(&mut self, raw: &str) {
        log::warn!("unrecognized server line: {}", raw);
    }

    fn on_auth_failure(&mut self) {}

    fn on_connection_error(&mut self, detail: &str) {
        log::error!("connection lost: {}", detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(email: &str, name: &str, status: Status) -> Member {
        Member {
            email: email.to_string(),
            name: name.to_string(),
            status,
        }
    }

    #[test]
    fn members_sort_by_presence_then_name() {
        let mut group = Group::new("Friends");
        group.upsert(member("c@x.com", "Carol", Status::Offline));
        group.upsert(member("a@x.com", "Alice", Status::Busy));
        group.upsert(member("b@x.com", "Bob", Status::Online));
        group.upsert(member("d@x.com", "Dave", Status::Away));

        let order: Vec<&str> = group.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(order, vec!["Bob", "Dave", "Alice", "Carol"]);
    }

    #[test]
    fn presence_change_resorts_the_containing_group() {
        let mut roster = Roster::new();
        roster.on_group_created("Friends");
        roster.on_member_upserted("a@x.com", "Alice", &[1]);
        roster.on_member_upserted("b@x.com", "Bob", &[1]);

        roster.on_presence_changed("b@x.com", Status::Online);
        let friends = &roster.groups()[1];
        assert_eq!(friends.members()[0].name, "Bob");
        assert_eq!(friends.members()[0].status, Status::Online);
        assert_eq!(friends.members()[1].status, Status::Offline);
    }

    #[test]
    fn upsert_replaces_an_existing_entry() {
        let mut roster = Roster::new();
        roster.on_member_upserted("a@x.com", "Alice", &[0]);
        roster.on_member_upserted("a@x.com", "Allie", &[0]);

        let other = &roster.groups()[0];
        assert_eq!(other.members().len(), 1);
        assert_eq!(other.members()[0].name, "Allie");
    }

    #[test]
    fn membership_in_several_groups_tracks_presence_everywhere() {
        let mut roster = Roster::new();
        roster.on_group_created("Work");
        roster.on_group_created("Home");
        roster.on_member_upserted("a@x.com", "Alice", &[1, 2]);

        roster.on_presence_changed("a@x.com", Status::Away);
        assert_eq!(roster.groups()[1].members()[0].status, Status::Away);
        assert_eq!(roster.groups()[2].members()[0].status, Status::Away);
        assert!(roster.groups()[0].members().is_empty());
    }

    #[test]
    fn unknown_group_indices_are_ignored() {
        let mut roster = Roster::new();
        roster.on_member_upserted("a@x.com", "Alice", &[7]);
        assert_eq!(roster.status_of("a@x.com"), None);
    }
}
