use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::fetch::DecodeError;

const API_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const TERRITORY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ownership and defense snapshot for one named territory.
#[derive(Debug, Clone, PartialEq)]
pub struct TerritoryProfile {
    pub name: String,
    pub guild: String,
    pub guild_prefix: String,
    pub acquired: DateTime<Utc>,
    pub attacker: Option<String>,
    pub level: u32,
    pub connections: Vec<String>,
}

/// Last-known stats for one player, decoded from the per-user stats endpoint.
/// Optional upstream fields decode to defaults; only username and uuid are
/// structurally required.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatsProfile {
    pub username: String,
    /// Stable identifier with dashes stripped.
    pub uuid: String,
    pub rank: PlayerRank,
    pub first_join: DateTime<Utc>,
    pub last_join: DateTime<Utc>,
    pub online: bool,
    pub server: Option<String>,
    pub playtime: u32,
    pub display_tag: bool,
    pub tag: PlayerTag,
    pub veteran: bool,
    pub guild_name: String,
    pub guild_rank: GuildRank,
    pub blocks_walked: u64,
    pub items_identified: u32,
    pub mobs_killed: u32,
    pub total_combat_level: u32,
    pub total_profession_level: u32,
    pub total_level: u32,
    pub pvp_kills: u32,
    pub pvp_deaths: u32,
    pub logins: u32,
    pub deaths: u32,
    pub discoveries: u32,
    pub events_won: u32,
    pub rankings: PlayerRankings,
}

/// Leaderboard positions. Zero means unranked; every field tolerates a null
/// or entirely missing source sub-object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerRankings {
    pub guild: u32,
    pub pvp: u32,
    pub combat_level: u32,
    pub woodcutting_level: u32,
    pub mining_level: u32,
    pub fishing_level: u32,
    pub farming_level: u32,
    pub alchemism_level: u32,
    pub armouring_level: u32,
    pub cooking_level: u32,
    pub jeweling_level: u32,
    pub scribing_level: u32,
    pub tailoring_level: u32,
    pub weaponsmithing_level: u32,
    pub woodworking_level: u32,
    pub profession_level: u32,
    pub overall_level: u32,
    pub overall_all: u32,
    pub combat: u32,
    pub profession: u32,
}

// Game staff rank, not an in-game progression rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlayerRank {
    #[default]
    Player,
    Moderator,
    Administrator,
    Music,
    GameMaster,
    Item,
    Builder,
    Hybrid,
    Cmd,
    Media,
}

impl PlayerRank {
    pub fn from_api(value: &str) -> Self {
        match value {
            "Moderator" => PlayerRank::Moderator,
            "Administrator" => PlayerRank::Administrator,
            "Music" => PlayerRank::Music,
            "Game Master" => PlayerRank::GameMaster,
            "Item" => PlayerRank::Item,
            "Builder" => PlayerRank::Builder,
            "Hybrid" => PlayerRank::Hybrid,
            "CMD" => PlayerRank::Cmd,
            "Media" => PlayerRank::Media,
            _ => PlayerRank::Player,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlayerTag {
    #[default]
    None,
    Vip,
    VipPlus,
    Hero,
    Champion,
}

impl PlayerTag {
    pub fn from_api(value: &str) -> Self {
        match value {
            "VIP" => PlayerTag::Vip,
            "VIP+" => PlayerTag::VipPlus,
            "HERO" => PlayerTag::Hero,
            "CHAMPION" => PlayerTag::Champion,
            _ => PlayerTag::None,
        }
    }

    pub fn is_vip(self) -> bool {
        !matches!(self, PlayerTag::None)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GuildRank {
    Owner,
    Chief,
    Strategist,
    Captain,
    Recruiter,
    Recruit,
    #[default]
    None,
}

impl GuildRank {
    pub fn from_api(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "OWNER" => GuildRank::Owner,
            "CHIEF" => GuildRank::Chief,
            "STRATEGIST" => GuildRank::Strategist,
            "CAPTAIN" => GuildRank::Captain,
            "RECRUITER" => GuildRank::Recruiter,
            "RECRUIT" => GuildRank::Recruit,
            _ => GuildRank::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ItemTier {
    #[default]
    Normal,
    Unique,
    Rare,
    Legendary,
    Fabled,
    Mythic,
    Set,
}

impl ItemTier {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "NORMAL" => Some(ItemTier::Normal),
            "UNIQUE" => Some(ItemTier::Unique),
            "RARE" => Some(ItemTier::Rare),
            "LEGENDARY" => Some(ItemTier::Legendary),
            "FABLED" => Some(ItemTier::Fabled),
            "MYTHIC" => Some(ItemTier::Mythic),
            "SET" => Some(ItemTier::Set),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemProfile {
    pub display_name: String,
    pub tier: ItemTier,
    pub item_type: String,
    pub level: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MajorIdentification {
    pub name: String,
    pub description: String,
}

/// The item-list payload: items keyed by display name plus the auxiliary
/// lookup tables shipped alongside them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemCatalog {
    pub items: HashMap<String, ItemProfile>,
    pub translated_references: HashMap<String, String>,
    pub internal_identifications: HashMap<String, String>,
    pub major_ids: HashMap<String, MajorIdentification>,
    pub material_types: HashMap<String, Vec<String>>,
}

/// Possible unidentified-item names per tier for one level-range bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemGuessProfile {
    pub possible_items: HashMap<ItemTier, Vec<String>>,
}

pub fn decode_territory_list(
    bytes: &[u8],
) -> Result<HashMap<String, TerritoryProfile>, DecodeError> {
    let root: Value = serde_json::from_slice(bytes)?;
    let territories = root
        .get("territories")
        .and_then(Value::as_object)
        .ok_or(DecodeError::MissingField("territories"))?;
    let mut out = HashMap::with_capacity(territories.len());
    for (name, entry) in territories {
        if !entry.is_object() {
            warn!(territory = %name, "skipping malformed territory entry");
            continue;
        }
        out.insert(name.clone(), decode_territory(name, entry));
    }
    Ok(out)
}

fn decode_territory(name: &str, entry: &Value) -> TerritoryProfile {
    let acquired = match json_str(entry.get("acquired"))
        .map(|raw| NaiveDateTime::parse_from_str(raw, TERRITORY_DATE_FORMAT))
    {
        Some(Ok(naive)) => naive.and_utc(),
        Some(Err(err)) => {
            warn!(?err, territory = name, "unable to parse territory acquisition time");
            DateTime::UNIX_EPOCH
        }
        None => DateTime::UNIX_EPOCH,
    };
    TerritoryProfile {
        name: name.to_owned(),
        guild: json_str(entry.get("guild")).unwrap_or_default().to_owned(),
        guild_prefix: json_str(entry.get("guildPrefix"))
            .unwrap_or_default()
            .to_owned(),
        acquired,
        attacker: json_str(entry.get("attacker")).map(ToOwned::to_owned),
        level: json_u32(entry.get("level")),
        connections: string_list(entry.get("connections")),
    }
}

pub fn decode_player_stats(bytes: &[u8]) -> Result<PlayerStatsProfile, DecodeError> {
    let root: Value = serde_json::from_slice(bytes)?;
    let code = json_i64(root.get("code")).unwrap_or(0);
    if code != 200 {
        return Err(DecodeError::Invalid(format!(
            "stats envelope returned code {code}"
        )));
    }
    let profile = root
        .get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .ok_or(DecodeError::MissingField("data"))?;

    let username = json_str(profile.get("username"))
        .ok_or(DecodeError::MissingField("username"))?
        .to_owned();
    let uuid = json_str(profile.get("uuid"))
        .ok_or(DecodeError::MissingField("uuid"))?
        .replace('-', "");

    let meta = profile.get("meta");
    let location = meta.and_then(|m| m.get("location"));
    let tag = meta.and_then(|m| m.get("tag"));

    let guild = profile.get("guild");
    let guild_name = json_str(guild.and_then(|g| g.get("name")))
        .unwrap_or_default()
        .to_owned();
    let guild_rank = if guild_name.is_empty() {
        GuildRank::None
    } else {
        GuildRank::from_api(json_str(guild.and_then(|g| g.get("rank"))).unwrap_or_default())
    };

    let global = profile.get("global");
    let totals = global.and_then(|g| g.get("totalLevel"));
    let pvp = global.and_then(|g| g.get("pvp"));

    let ranking = profile.get("ranking");
    let player_ranking = ranking.and_then(|r| r.get("player"));
    let solo = player_ranking.and_then(|p| p.get("solo"));
    let overall = player_ranking.and_then(|p| p.get("overall"));

    Ok(PlayerStatsProfile {
        username,
        uuid,
        rank: PlayerRank::from_api(json_str(profile.get("rank")).unwrap_or_default()),
        first_join: parse_api_date(meta.and_then(|m| m.get("firstJoin")), "firstJoin"),
        last_join: parse_api_date(meta.and_then(|m| m.get("lastJoin")), "lastJoin"),
        online: json_bool(location.and_then(|l| l.get("online"))),
        server: json_str(location.and_then(|l| l.get("server"))).map(ToOwned::to_owned),
        playtime: json_u32(meta.and_then(|m| m.get("playtime"))),
        display_tag: json_bool(tag.and_then(|t| t.get("display"))),
        tag: PlayerTag::from_api(json_str(tag.and_then(|t| t.get("value"))).unwrap_or_default()),
        veteran: json_bool(meta.and_then(|m| m.get("veteran"))),
        guild_name,
        guild_rank,
        blocks_walked: json_u64(global.and_then(|g| g.get("blocksWalked"))),
        items_identified: json_u32(global.and_then(|g| g.get("itemsIdentified"))),
        mobs_killed: json_u32(global.and_then(|g| g.get("mobsKilled"))),
        total_combat_level: json_u32(totals.and_then(|t| t.get("combat"))),
        total_profession_level: json_u32(totals.and_then(|t| t.get("profession"))),
        total_level: json_u32(totals.and_then(|t| t.get("combined"))),
        pvp_kills: json_u32(pvp.and_then(|p| p.get("kills"))),
        pvp_deaths: json_u32(pvp.and_then(|p| p.get("deaths"))),
        logins: json_u32(global.and_then(|g| g.get("logins"))),
        deaths: json_u32(global.and_then(|g| g.get("deaths"))),
        discoveries: json_u32(global.and_then(|g| g.get("discoveries"))),
        events_won: json_u32(global.and_then(|g| g.get("eventsWon"))),
        rankings: PlayerRankings {
            guild: json_u32(ranking.and_then(|r| r.get("guild"))),
            pvp: json_u32(ranking.and_then(|r| r.get("pvp"))),
            combat_level: json_u32(solo.and_then(|s| s.get("combat"))),
            woodcutting_level: json_u32(solo.and_then(|s| s.get("woodcutting"))),
            mining_level: json_u32(solo.and_then(|s| s.get("mining"))),
            fishing_level: json_u32(solo.and_then(|s| s.get("fishing"))),
            farming_level: json_u32(solo.and_then(|s| s.get("farming"))),
            alchemism_level: json_u32(solo.and_then(|s| s.get("alchemism"))),
            armouring_level: json_u32(solo.and_then(|s| s.get("armouring"))),
            cooking_level: json_u32(solo.and_then(|s| s.get("cooking"))),
            jeweling_level: json_u32(solo.and_then(|s| s.get("jeweling"))),
            scribing_level: json_u32(solo.and_then(|s| s.get("scribing"))),
            tailoring_level: json_u32(solo.and_then(|s| s.get("tailoring"))),
            weaponsmithing_level: json_u32(solo.and_then(|s| s.get("weaponsmithing"))),
            woodworking_level: json_u32(solo.and_then(|s| s.get("woodworking"))),
            profession_level: json_u32(solo.and_then(|s| s.get("profession"))),
            overall_level: json_u32(solo.and_then(|s| s.get("overall"))),
            overall_all: json_u32(overall.and_then(|o| o.get("all"))),
            combat: json_u32(overall.and_then(|o| o.get("combat"))),
            profession: json_u32(overall.and_then(|o| o.get("profession"))),
        },
    })
}

pub fn decode_item_list(bytes: &[u8]) -> Result<ItemCatalog, DecodeError> {
    let root: Value = serde_json::from_slice(bytes)?;
    let items = root
        .get("items")
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingField("items"))?;
    let mut map = HashMap::with_capacity(items.len());
    for entry in items {
        let Some(display_name) =
            json_str(entry.get("displayName")).or_else(|| json_str(entry.get("name")))
        else {
            warn!("skipping item entry without a display name");
            continue;
        };
        map.insert(
            display_name.to_owned(),
            ItemProfile {
                display_name: display_name.to_owned(),
                tier: json_str(entry.get("tier"))
                    .and_then(ItemTier::parse)
                    .unwrap_or_default(),
                item_type: json_str(entry.get("type")).unwrap_or_default().to_owned(),
                level: json_u32(entry.get("level")),
            },
        );
    }
    Ok(ItemCatalog {
        items: map,
        translated_references: string_table(root.get("translatedReferences")),
        internal_identifications: string_table(root.get("internalIdentifications")),
        major_ids: decode_major_ids(root.get("majorIdentifications")),
        material_types: decode_material_types(root.get("materialTypes")),
    })
}

fn decode_major_ids(value: Option<&Value>) -> HashMap<String, MajorIdentification> {
    let Some(entries) = value.and_then(Value::as_object) else {
        return HashMap::new();
    };
    entries
        .iter()
        .map(|(id, entry)| {
            (
                id.clone(),
                MajorIdentification {
                    name: json_str(entry.get("name")).unwrap_or_default().to_owned(),
                    description: json_str(entry.get("description"))
                        .unwrap_or_default()
                        .to_owned(),
                },
            )
        })
        .collect()
}

fn decode_material_types(value: Option<&Value>) -> HashMap<String, Vec<String>> {
    let Some(entries) = value.and_then(Value::as_object) else {
        return HashMap::new();
    };
    entries
        .iter()
        .map(|(kind, names)| (kind.clone(), string_list(Some(names))))
        .collect()
}

pub fn decode_item_guesses(bytes: &[u8]) -> Result<HashMap<String, ItemGuessProfile>, DecodeError> {
    let root: Value = serde_json::from_slice(bytes)?;
    let entries = root.as_object().ok_or_else(|| {
        DecodeError::Invalid("item guesses payload is not an object".to_owned())
    })?;
    let mut out = HashMap::new();
    for (range, tiers) in entries {
        let Some(tiers) = tiers.as_object() else {
            continue;
        };
        let mut possible_items = HashMap::new();
        for (tier_name, names) in tiers {
            let Some(tier) = ItemTier::parse(tier_name) else {
                continue;
            };
            let names = guess_names(names);
            if !names.is_empty() {
                possible_items.insert(tier, names);
            }
        }
        if !possible_items.is_empty() {
            out.insert(range.clone(), ItemGuessProfile { possible_items });
        }
    }
    Ok(out)
}

// Guess lists appear both as json arrays and as comma-joined strings.
fn guess_names(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
        Value::String(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

/// Server name to online player names. A payload carrying a `message` field
/// is the API's "nothing to report" shape and decodes to the empty map.
pub fn decode_online_players(bytes: &[u8]) -> Result<HashMap<String, Vec<String>>, DecodeError> {
    let root: Value = serde_json::from_slice(bytes)?;
    let entries = root.as_object().ok_or_else(|| {
        DecodeError::Invalid("online players payload is not an object".to_owned())
    })?;
    if entries.contains_key("message") {
        return Ok(HashMap::new());
    }
    let mut out = HashMap::new();
    for (server, players) in entries {
        if server == "request" {
            continue;
        }
        let Some(players) = players.as_array() else {
            continue;
        };
        out.insert(
            server.clone(),
            players
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect(),
        );
    }
    Ok(out)
}

fn parse_api_date(value: Option<&Value>, field: &str) -> DateTime<Utc> {
    let Some(raw) = value.and_then(Value::as_str) else {
        return DateTime::UNIX_EPOCH;
    };
    match NaiveDateTime::parse_from_str(raw, API_DATE_FORMAT) {
        Ok(naive) => naive.and_utc(),
        Err(err) => {
            warn!(?err, field, raw, "unable to parse join date from the stats payload");
            DateTime::UNIX_EPOCH
        }
    }
}

fn json_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

fn json_i64(value: Option<&Value>) -> Option<i64> {
    value.and_then(|v| {
        if let Some(n) = v.as_i64() {
            return Some(n);
        }
        v.as_str().and_then(|raw| raw.trim().parse::<i64>().ok())
    })
}

fn json_u32(value: Option<&Value>) -> u32 {
    json_i64(value)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn json_u64(value: Option<&Value>) -> u64 {
    json_i64(value)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

fn json_bool(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn string_table(value: Option<&Value>) -> HashMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(key, val)| val.as_str().map(|s| (key.clone(), s.to_owned())))
                .collect()
        })
        .unwrap_or_default()
}
