use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Mutex,
};

use crate::profiles::PlayerStatsProfile;

/// Known friends, their last-decoded stats, and the poll queue feeding the
/// friend refresh loop. All three containers form one consistency domain
/// behind a single lock; callers never observe a partial update.
#[derive(Debug, Default)]
pub struct FriendRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    /// uuid to last-known stats, append/update-only until reset.
    friends: HashMap<String, PlayerStatsProfile>,
    /// uuids currently online, recomputed per decoded stats record.
    online: HashSet<String>,
    /// usernames awaiting a stats refresh.
    queue: VecDeque<String>,
}

impl FriendRegistry {
    /// The one externally-usable mutation path, fed by chat-derived friend
    /// discovery and manual additions.
    pub fn add_friend(&self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.lock().queue.push_back(name.to_owned());
    }

    /// Refills the queue with every online friend not already queued, then
    /// pops the next username to refresh. Returns `None` on an empty queue.
    pub fn poll_next(&self) -> Option<String> {
        let mut inner = self.lock();
        let missing: Vec<String> = inner
            .online
            .iter()
            .filter_map(|uuid| inner.friends.get(uuid))
            .map(|profile| profile.username.clone())
            .filter(|username| !inner.queue.contains(username))
            .collect();
        for username in missing {
            inner.queue.push_back(username);
        }
        inner.queue.pop_front()
    }

    /// Puts a username back at the tail after a failed refresh so it is
    /// retried, never silently dropped.
    pub fn requeue(&self, name: String) {
        self.lock().queue.push_back(name);
    }

    /// Commits one decoded stats record: updates the friend map and flips
    /// online membership by the decoded flag.
    pub fn apply_stats(&self, profile: PlayerStatsProfile) {
        let mut inner = self.lock();
        if profile.online {
            inner.online.insert(profile.uuid.clone());
        } else {
            inner.online.remove(&profile.uuid);
        }
        inner.friends.insert(profile.uuid.clone(), profile);
    }

    pub fn friend_stats(&self) -> Vec<PlayerStatsProfile> {
        self.lock().friends.values().cloned().collect()
    }

    pub fn is_online(&self, uuid: &str) -> bool {
        self.lock().online.contains(uuid)
    }

    pub fn online_count(&self) -> usize {
        self.lock().online.len()
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn queue_contains(&self, name: &str) -> bool {
        self.lock().queue.iter().any(|queued| queued.as_str() == name)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.friends.clear();
        inner.online.clear();
        inner.queue.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().expect("friend registry lock poisoned")
    }
}

/// Extracts friend usernames from the in-game friend list chat line
/// (`<player>'s friends (N): Alice, Bob`). Any other chat line yields
/// nothing. Embedded spaces inside names are stripped the way the game
/// renders them.
pub fn parse_friend_list_message(message: &str) -> Vec<String> {
    let Some(marker) = message.find("'s friends (") else {
        return Vec::new();
    };
    let Some(colon) = message[marker..].find(':') else {
        return Vec::new();
    };
    message[marker + colon + 1..]
        .split(", ")
        .map(|name| name.replace(' ', ""))
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_friend_list_message, FriendRegistry};
    use crate::profiles::{decode_player_stats, PlayerStatsProfile};
    use serde_json::json;

    fn profile(username: &str, uuid: &str, online: bool) -> PlayerStatsProfile {
        let payload = json!({
            "code": 200,
            "data": [{
                "username": username,
                "uuid": uuid,
                "meta": { "location": { "online": online } }
            }]
        });
        let bytes = serde_json::to_vec(&payload).expect("payload should serialize");
        decode_player_stats(&bytes).expect("stats should decode")
    }

    #[test]
    fn add_friend_appends_in_fifo_order() {
        let registry = FriendRegistry::default();
        registry.add_friend("Alice");
        registry.add_friend("  Bob ");
        registry.add_friend("");
        assert_eq!(registry.poll_next().as_deref(), Some("Alice"));
        assert_eq!(registry.poll_next().as_deref(), Some("Bob"));
        assert_eq!(registry.poll_next(), None);
    }

    #[test]
    fn online_friends_are_each_polled_once_before_repeats() {
        let registry = FriendRegistry::default();
        registry.apply_stats(profile("Alice", "uuida", true));
        registry.apply_stats(profile("Bob", "uuidb", true));
        registry.apply_stats(profile("Carol", "uuidc", true));

        let mut polled = vec![
            registry.poll_next().expect("first poll should yield"),
            registry.poll_next().expect("second poll should yield"),
            registry.poll_next().expect("third poll should yield"),
        ];
        polled.sort();
        assert_eq!(polled, vec!["Alice", "Bob", "Carol"]);
    }

    #[test]
    fn replenish_skips_names_already_queued() {
        let registry = FriendRegistry::default();
        registry.apply_stats(profile("Alice", "uuida", true));
        registry.add_friend("Alice");
        assert_eq!(registry.poll_next().as_deref(), Some("Alice"));
        // The queued copy satisfied the online entry; nothing was duplicated.
        assert_eq!(registry.queue_len(), 0);
    }

    #[test]
    fn requeue_appends_at_the_tail() {
        let registry = FriendRegistry::default();
        registry.add_friend("Alice");
        registry.add_friend("Bob");
        let first = registry.poll_next().expect("poll should yield");
        registry.requeue(first);
        assert_eq!(registry.poll_next().as_deref(), Some("Bob"));
        assert_eq!(registry.poll_next().as_deref(), Some("Alice"));
    }

    #[test]
    fn apply_stats_flips_online_membership() {
        let registry = FriendRegistry::default();
        registry.apply_stats(profile("Alice", "uuida", true));
        assert!(registry.is_online("uuida"));
        assert_eq!(registry.online_count(), 1);

        registry.apply_stats(profile("Alice", "uuida", false));
        assert!(!registry.is_online("uuida"));
        assert_eq!(registry.friend_stats().len(), 1, "offline friends stay known");
    }

    #[test]
    fn clear_resets_every_container() {
        let registry = FriendRegistry::default();
        registry.apply_stats(profile("Alice", "uuida", true));
        registry.add_friend("Bob");
        registry.clear();
        assert_eq!(registry.friend_stats().len(), 0);
        assert_eq!(registry.online_count(), 0);
        assert_eq!(registry.queue_len(), 0);
    }

    #[test]
    fn parses_the_friend_list_chat_line() {
        let names =
            parse_friend_list_message("Steve's friends (3): Alice, Bob Builder, Carol");
        assert_eq!(names, vec!["Alice", "BobBuilder", "Carol"]);
    }

    #[test]
    fn unrelated_chat_lines_parse_to_nothing() {
        assert!(parse_friend_list_message("Steve joined the server").is_empty());
        assert!(parse_friend_list_message("").is_empty());
    }
}
