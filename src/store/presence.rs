//! Presence within one room: joins, heartbeats, renames and staleness
//! eviction. Users are per-room entities; the same id in another room is a
//! different user.

use rand::seq::IndexedRandom;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::clock::TtlPolicy;
use crate::events::Event;
use crate::store::room::{Room, User};

const MAX_NAME_LEN: usize = 20;

const ADJECTIVES: &[&str] = &[
    "Happy", "Sunny", "Bright", "Swift", "Cool", "Smart", "Lucky", "Bold", "Calm", "Free",
];
const NOUNS: &[&str] = &[
    "Panda", "Tiger", "Eagle", "Dolphin", "Fox", "Bear", "Wolf", "Cat", "Dog", "Lion",
];

pub fn generate_user_id() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn generate_user_name() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Quiet");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Guest");
    format!("{adjective}{noun}")
}

/// Trimmed, length-capped display name; `None` when effectively empty.
pub fn clean_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NAME_LEN).collect())
}

#[derive(Clone, Debug)]
pub struct JoinOutcome {
    pub user_id: String,
    pub user_name: String,
    pub existing: bool,
}

impl Room {
    /// Idempotent upsert: a known id refreshes its heartbeat (and possibly
    /// renames) instead of creating a duplicate. `user_joined` fires only for
    /// genuinely new users.
    pub fn join(
        &mut self,
        user_id: Option<&str>,
        user_name: Option<&str>,
        now: OffsetDateTime,
    ) -> (JoinOutcome, Vec<Event>) {
        let wanted_name = user_name.and_then(clean_name);

        if let Some(id) = user_id {
            // rename of an unknown id is a no-op, so this is safe to try first
            let renamed = wanted_name.clone().and_then(|name| self.rename(id, &name));
            if let Some(user) = self.user_mut(id) {
                user.last_heartbeat = now;
                let outcome = JoinOutcome {
                    user_id: user.id.clone(),
                    user_name: user.name.clone(),
                    existing: true,
                };
                return (outcome, renamed.into_iter().collect());
            }
        }

        let user = User {
            id: generate_user_id(),
            name: wanted_name.unwrap_or_else(generate_user_name),
            joined_at: now,
            last_heartbeat: now,
        };
        let outcome = JoinOutcome {
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            existing: false,
        };
        let event = Event::UserJoined {
            user_id: user.id.clone(),
            user_name: user.name.clone(),
        };
        self.users.push(user);
        self.empty_since = None;
        (outcome, vec![event])
    }

    /// Silent no-op for unknown ids; heartbeats race with eviction.
    pub fn heartbeat(&mut self, user_id: &str, now: OffsetDateTime) -> bool {
        match self.user_mut(user_id) {
            Some(user) => {
                user.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    pub fn rename(&mut self, user_id: &str, new_name: &str) -> Option<Event> {
        let user = self.user_mut(user_id)?;
        if user.name == new_name {
            return None;
        }
        let old_name = std::mem::replace(&mut user.name, new_name.to_owned());
        Some(Event::UserRenamed {
            user_id: user.id.clone(),
            old_name,
            new_name: user.name.clone(),
        })
    }

    pub fn sweep_stale(&mut self, policy: &TtlPolicy, now: OffsetDateTime) -> Vec<User> {
        let mut evicted = Vec::new();
        self.users.retain(|user| {
            if policy.is_stale(user.last_heartbeat, now) {
                evicted.push(user.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Active users in join order, for a stable UI listing.
    pub fn list_active(&self, policy: &TtlPolicy, now: OffsetDateTime) -> Vec<&User> {
        self.users
            .iter()
            .filter(|user| !policy.is_stale(user.last_heartbeat, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::datetime;

    fn room() -> Room {
        Room::new("R7K2", datetime!(2026-01-01 12:00 UTC))
    }

    #[test]
    fn join_twice_with_same_id_is_idempotent() {
        let mut room = room();
        let now = datetime!(2026-01-01 12:00 UTC);

        let (first, events) = room.join(None, None, now);
        assert!(!first.existing);
        assert_eq!(events.len(), 1);

        let (second, events) = room.join(Some(&first.user_id), None, now + Duration::seconds(5));
        assert!(second.existing);
        assert_eq!(second.user_id, first.user_id);
        assert_eq!(second.user_name, first.user_name);
        assert!(events.is_empty());
        assert_eq!(room.users.len(), 1);
    }

    #[test]
    fn rejoin_with_new_name_renames_instead_of_duplicating() {
        let mut room = room();
        let now = datetime!(2026-01-01 12:00 UTC);

        let (joined, _) = room.join(None, Some("Ada"), now);
        let (rejoined, events) = room.join(Some(&joined.user_id), Some("Grace"), now);

        assert!(rejoined.existing);
        assert_eq!(rejoined.user_name, "Grace");
        assert_eq!(room.users.len(), 1);
        assert!(matches!(
            events.as_slice(),
            [Event::UserRenamed { old_name, new_name, .. }]
                if old_name == "Ada" && new_name == "Grace"
        ));
    }

    #[test]
    fn unknown_id_is_not_resurrected() {
        let mut room = room();
        let now = datetime!(2026-01-01 12:00 UTC);

        let (outcome, _) = room.join(Some("gone"), None, now);
        assert!(!outcome.existing);
        assert_ne!(outcome.user_id, "gone");
    }

    #[test]
    fn heartbeat_of_unknown_user_is_a_noop() {
        let mut room = room();
        assert!(!room.heartbeat("nobody", datetime!(2026-01-01 12:00 UTC)));
    }

    #[test]
    fn stale_users_are_evicted_at_the_timeout_boundary() {
        let mut room = room();
        let policy = TtlPolicy::default();
        let t0 = datetime!(2026-01-01 12:00 UTC);
        let (joined, _) = room.join(None, None, t0);

        assert!(room.sweep_stale(&policy, t0 + Duration::seconds(59)).is_empty());
        let evicted = room.sweep_stale(&policy, t0 + Duration::seconds(61));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, joined.user_id);
        assert!(room.users.is_empty());
    }

    #[test]
    fn active_listing_keeps_join_order_and_skips_stale() {
        let mut room = room();
        let policy = TtlPolicy::default();
        let t0 = datetime!(2026-01-01 12:00 UTC);

        let (a, _) = room.join(None, Some("A"), t0);
        let (b, _) = room.join(None, Some("B"), t0 + Duration::seconds(1));
        room.heartbeat(&b.user_id, t0 + Duration::seconds(90));

        let active = room.list_active(&policy, t0 + Duration::seconds(100));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.user_id);

        room.heartbeat(&a.user_id, t0 + Duration::seconds(100));
        let active = room.list_active(&policy, t0 + Duration::seconds(100));
        let ids: Vec<_> = active.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec![a.user_id.as_str(), b.user_id.as_str()]);
    }

    #[test]
    fn names_are_trimmed_and_capped() {
        assert_eq!(clean_name("  Ada  "), Some("Ada".to_owned()));
        assert_eq!(clean_name("   "), None);
        assert_eq!(clean_name(&"x".repeat(40)).unwrap().chars().count(), 20);
    }
}
