// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Presence Tracker
//!
//! Maintains who-is-viewing-what from realtime presence signals. The
//! cache is updated only by join/leave/update events; outbound mutations
//! are routed through the realtime channel by the orchestrator.

use std::collections::HashMap;

use super::message::{ActiveResource, PresencePeer, PresenceStatus};

/// A presence event routed from the realtime channel.
#[derive(Debug, Clone)]
pub enum PresenceSignal {
    Joined(PresencePeer),
    Left { actor_id: String },
    Updated(PresencePeer),
}

/// Cache of peers keyed by actor id.
#[derive(Default)]
pub struct PresenceTracker {
    users: HashMap<String, PresencePeer>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        PresenceTracker {
            users: HashMap::new(),
        }
    }

    /// Applies a presence signal to the cache.
    pub fn apply(&mut self, signal: PresenceSignal) {
        match signal {
            PresenceSignal::Joined(peer) | PresenceSignal::Updated(peer) => {
                self.users.insert(peer.actor_id.clone(), peer);
            }
            PresenceSignal::Left { actor_id } => {
                self.users.remove(&actor_id);
            }
        }
    }

    /// Users currently viewing a resource.
    pub fn users_viewing(&self, resource: &ActiveResource) -> Vec<&PresencePeer> {
        self.users
            .values()
            .filter(|peer| peer.active_resource.as_ref() == Some(resource))
            .collect()
    }

    /// All peers that are not offline.
    pub fn all_online(&self) -> Vec<&PresencePeer> {
        self.users
            .values()
            .filter(|peer| peer.status != PresenceStatus::Offline)
            .collect()
    }

    /// Looks up a single peer.
    pub fn get(&self, actor_id: &str) -> Option<&PresencePeer> {
        self.users.get(actor_id)
    }

    /// Number of tracked peers.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Drops every tracked peer (on disconnect).
    pub fn clear(&mut self) {
        self.users.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(actor: &str, status: PresenceStatus, resource: Option<(&str, &str)>) -> PresencePeer {
        PresencePeer {
            actor_id: actor.to_string(),
            status,
            active_resource: resource.map(|(t, i)| ActiveResource {
                resource_type: t.to_string(),
                resource_id: i.to_string(),
            }),
            display_name: None,
        }
    }

    #[test]
    fn test_join_update_leave() {
        let mut tracker = PresenceTracker::new();

        tracker.apply(PresenceSignal::Joined(peer(
            "a1",
            PresenceStatus::Online,
            None,
        )));
        assert_eq!(tracker.len(), 1);

        tracker.apply(PresenceSignal::Updated(peer(
            "a1",
            PresenceStatus::Busy,
            Some(("patient", "P1")),
        )));
        assert_eq!(tracker.get("a1").unwrap().status, PresenceStatus::Busy);

        tracker.apply(PresenceSignal::Left {
            actor_id: "a1".into(),
        });
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_users_viewing() {
        let mut tracker = PresenceTracker::new();
        tracker.apply(PresenceSignal::Joined(peer(
            "a1",
            PresenceStatus::Online,
            Some(("patient", "P1")),
        )));
        tracker.apply(PresenceSignal::Joined(peer(
            "a2",
            PresenceStatus::Online,
            Some(("patient", "P2")),
        )));

        let resource = ActiveResource {
            resource_type: "patient".into(),
            resource_id: "P1".into(),
        };
        let viewing = tracker.users_viewing(&resource);
        assert_eq!(viewing.len(), 1);
        assert_eq!(viewing[0].actor_id, "a1");
    }

    #[test]
    fn test_all_online_excludes_offline() {
        let mut tracker = PresenceTracker::new();
        tracker.apply(PresenceSignal::Joined(peer("a1", PresenceStatus::Online, None)));
        tracker.apply(PresenceSignal::Joined(peer("a2", PresenceStatus::Offline, None)));
        tracker.apply(PresenceSignal::Joined(peer("a3", PresenceStatus::Away, None)));

        assert_eq!(tracker.all_online().len(), 2);
    }
}
