use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outbound change notifications. Consumers re-read the shared containers on
/// the core; the events themselves carry no state beyond the timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    DirectoryResolved { at: DateTime<Utc> },
    TerritoryListUpdated { at: DateTime<Utc> },
    FriendStatsUpdated { at: DateTime<Utc> },
    ItemCatalogLoaded { at: DateTime<Utc> },
    ItemGuessesLoaded { at: DateTime<Utc> },
}

impl SyncEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::DirectoryResolved { .. } => "directory_resolved",
            SyncEvent::TerritoryListUpdated { .. } => "territory_list_updated",
            SyncEvent::FriendStatsUpdated { .. } => "friend_stats_updated",
            SyncEvent::ItemCatalogLoaded { .. } => "item_catalog_loaded",
            SyncEvent::ItemGuessesLoaded { .. } => "item_guesses_loaded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SyncEvent;
    use chrono::Utc;

    #[test]
    fn events_round_trip_through_json() {
        let event = SyncEvent::TerritoryListUpdated { at: Utc::now() };
        let text = serde_json::to_string(&event).expect("event should serialize");
        assert!(text.contains("\"territory_list_updated\""));
        let parsed: SyncEvent = serde_json::from_str(&text).expect("event should parse");
        assert_eq!(parsed.kind(), "territory_list_updated");
    }
}
