use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::HistoryRecord;
use crate::participants::{FakePlayer, ParticipantKind, RoundKey, StaticOpponent};
use crate::rng::Rng;
use crate::types::{LeaderboardEntry, LeaderboardResponse};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredIdentity {
    name: String,
    #[serde(default)]
    matches: u64,
    #[serde(default)]
    wins: u64,
    #[serde(rename = "bestPlacement", alias = "best_placement", default)]
    best_placement: Option<u32>,
    #[serde(rename = "updatedAtMs", alias = "updated_at_ms", default)]
    updated_at_ms: u64,
    /// Keyed `"{stage}-{round}"`.
    #[serde(default)]
    snapshots: BTreeMap<String, StaticOpponent>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct HistoryStoreFile {
    version: u8,
    identities: HashMap<String, StoredIdentity>,
}

#[derive(Clone, Debug, Deserialize)]
struct HistoryStoreFileRaw {
    version: u8,
    identities: HashMap<String, serde_json::Value>,
}

/// Per-identity match history: the round snapshots bots are rebuilt from,
/// plus win counts for the leaderboard.
pub struct HistoryStore {
    file_path: PathBuf,
    identities: HashMap<String, StoredIdentity>,
}

impl HistoryStore {
    pub fn new(file_path: PathBuf) -> Self {
        let identities = load_identities(&file_path);
        Self {
            file_path,
            identities,
        }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn record(&mut self, record: &HistoryRecord) {
        let now_ms = now_ms();
        match record {
            HistoryRecord::Snapshots {
                identity,
                placement,
                snapshots,
            } => {
                let Some(current) = self.entry(identity, now_ms) else {
                    return;
                };
                for (key, snapshot) in snapshots {
                    current
                        .snapshots
                        .insert(snapshot_key(*key), snapshot.clone());
                }
                if let Some(placement) = placement {
                    current.best_placement = Some(
                        current
                            .best_placement
                            .map_or(*placement, |best| best.min(*placement)),
                    );
                }
                current.updated_at_ms = now_ms;
            }
            HistoryRecord::Finished { placements, .. } => {
                for entry in placements {
                    if entry.kind != ParticipantKind::Human {
                        continue;
                    }
                    let Some(current) = self.entry(&entry.name, now_ms) else {
                        continue;
                    };
                    current.matches += 1;
                    if entry.placement == 1 {
                        current.wins += 1;
                    }
                    current.best_placement = Some(
                        current
                            .best_placement
                            .map_or(entry.placement, |best| best.min(entry.placement)),
                    );
                    current.updated_at_ms = now_ms;
                }
            }
        }
        self.save();
    }

    /// Up to `count` replayable identities, none of them in `exclude`.
    pub fn sample_bots(&self, count: usize, exclude: &[String], rng: &mut Rng) -> Vec<FakePlayer> {
        let excluded: Vec<String> = exclude.iter().map(|name| identity_key(name)).collect();
        let mut keys: Vec<&String> = self
            .identities
            .iter()
            .filter(|(key, stored)| !excluded.contains(key) && !stored.snapshots.is_empty())
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        rng.shuffle(&mut keys);

        keys.into_iter()
            .filter_map(|key| {
                let stored = &self.identities[key];
                let snapshots: BTreeMap<RoundKey, StaticOpponent> = stored
                    .snapshots
                    .iter()
                    .filter_map(|(raw, snapshot)| {
                        parse_snapshot_key(raw).map(|round| (round, snapshot.clone()))
                    })
                    .collect();
                (!snapshots.is_empty()).then(|| FakePlayer::new(stored.name.clone(), snapshots))
            })
            .take(count)
            .collect()
    }

    pub fn build_leaderboard(&self, requested_limit: Option<usize>) -> LeaderboardResponse {
        LeaderboardResponse {
            generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            entries: self.get_top(requested_limit),
        }
    }

    fn get_top(&self, requested_limit: Option<usize>) -> Vec<LeaderboardEntry> {
        let normalized_limit = requested_limit.unwrap_or(10).clamp(1, 100);
        let mut entries: Vec<LeaderboardEntry> = self
            .identities
            .values()
            .filter(|entry| entry.matches > 0)
            .map(|entry| LeaderboardEntry {
                name: entry.name.clone(),
                matches: entry.matches,
                wins: entry.wins.min(entry.matches),
                win_rate: entry.wins as f64 / entry.matches as f64,
                best_placement: entry.best_placement,
                updated_at_ms: entry.updated_at_ms,
            })
            .collect();

        entries.sort_by(|a, b| {
            cmp_desc_f64(a.win_rate, b.win_rate)
                .then_with(|| b.wins.cmp(&a.wins))
                .then_with(|| {
                    a.best_placement
                        .unwrap_or(u32::MAX)
                        .cmp(&b.best_placement.unwrap_or(u32::MAX))
                })
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        entries.truncate(normalized_limit);
        entries
    }

    fn entry(&mut self, name: &str, now_ms: u64) -> Option<&mut StoredIdentity> {
        let key = identity_key(name);
        if key.is_empty() {
            return None;
        }
        let current = self
            .identities
            .entry(key)
            .or_insert_with(|| StoredIdentity {
                name: name.trim().to_string(),
                matches: 0,
                wins: 0,
                best_placement: None,
                updated_at_ms: now_ms,
                snapshots: BTreeMap::new(),
            });
        current.name = name.trim().to_string();
        Some(current)
    }

    fn save(&self) {
        if let Some(parent) = self.file_path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), %error, "failed to create history dir");
                return;
            }
        }

        let payload = HistoryStoreFile {
            version: 1,
            identities: self.identities.clone(),
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => {
                if let Err(error) = fs::write(&self.file_path, text) {
                    warn!(path = %self.file_path.display(), %error, "failed to write history");
                }
            }
            Err(error) => {
                warn!(path = %self.file_path.display(), %error, "failed to serialize history");
            }
        }
    }
}

fn snapshot_key((stage, round): RoundKey) -> String {
    format!("{stage}-{round}")
}

fn parse_snapshot_key(raw: &str) -> Option<RoundKey> {
    let (stage, round) = raw.split_once('-')?;
    Some((stage.trim().parse().ok()?, round.trim().parse().ok()?))
}

fn cmp_desc_f64(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn load_identities(path: &Path) -> HashMap<String, StoredIdentity> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read history");
            }
            return HashMap::new();
        }
    };
    let parsed = match serde_json::from_str::<HistoryStoreFileRaw>(&text) {
        Ok(value) if value.version == 1 => value,
        Ok(value) => {
            warn!(path = %path.display(), version = value.version, "unsupported history version");
            return HashMap::new();
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse history");
            return HashMap::new();
        }
    };

    let mut sanitized = HashMap::<String, StoredIdentity>::new();
    for (raw_key, raw_value) in parsed.identities {
        let value: StoredIdentity = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(
                    identity = %raw_key,
                    path = %path.display(),
                    %error,
                    "skipping malformed identity"
                );
                continue;
            }
        };
        let Some(normalized) = sanitize_stored_identity(value) else {
            continue;
        };
        let key = identity_key(&normalized.name);

        match sanitized.get_mut(&key) {
            Some(current) => {
                current.matches += normalized.matches;
                current.wins += normalized.wins;
                current.best_placement = match (current.best_placement, normalized.best_placement) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                if normalized.updated_at_ms >= current.updated_at_ms {
                    current.name = normalized.name;
                    current.updated_at_ms = normalized.updated_at_ms;
                    current.snapshots.extend(normalized.snapshots);
                } else {
                    for (round, snapshot) in normalized.snapshots {
                        current.snapshots.entry(round).or_insert(snapshot);
                    }
                }
            }
            None => {
                sanitized.insert(key, normalized);
            }
        }
    }

    sanitized
}

fn sanitize_stored_identity(mut value: StoredIdentity) -> Option<StoredIdentity> {
    value.name = value.name.trim().to_string();
    if value.name.is_empty() {
        return None;
    }
    value.wins = value.wins.min(value.matches);
    value.best_placement = value.best_placement.filter(|placement| *placement > 0);
    value
        .snapshots
        .retain(|key, _| parse_snapshot_key(key).is_some());
    Some(value)
}

fn identity_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{BasicLand, Card, CardKind};
    use crate::participants::MatchId;
    use crate::types::PlacementEntry;

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            now_ms().saturating_add(rand::random::<u32>() as u64)
        );
        std::env::temp_dir().join(unique).join("history.json")
    }

    fn snapshot(name: &str) -> StaticOpponent {
        StaticOpponent {
            name: name.to_string(),
            hand: vec![Card {
                id: 1,
                name: "Grizzly Bears".to_string(),
                kind: CardKind::Normal,
                elo: 1200.0,
                upgrade_target: None,
            }],
            sideboard: Vec::new(),
            command_zone: Vec::new(),
            basics: vec![BasicLand::Forest; 3],
            upgrades: Vec::new(),
            treasures: 1,
            poison: 2,
        }
    }

    fn snapshots_record(identity: &str, placement: Option<u32>) -> HistoryRecord {
        HistoryRecord::Snapshots {
            identity: identity.to_string(),
            placement,
            snapshots: BTreeMap::from([((1, 1), snapshot(identity)), ((1, 2), snapshot(identity))]),
        }
    }

    fn finished(rows: &[(&str, ParticipantKind, u32)]) -> HistoryRecord {
        HistoryRecord::Finished {
            match_id: MatchId::new("m1"),
            placements: rows
                .iter()
                .map(|(name, kind, placement)| PlacementEntry {
                    name: name.to_string(),
                    kind: *kind,
                    placement: *placement,
                })
                .collect(),
        }
    }

    #[test]
    fn records_survive_a_reload() {
        let path = temp_file("history-store-reload");
        let mut store = HistoryStore::new(path.clone());
        store.record(&snapshots_record("Alice", Some(2)));
        store.record(&finished(&[
            ("Bob", ParticipantKind::Human, 1),
            ("Alice", ParticipantKind::Human, 2),
            ("Bot Carol", ParticipantKind::Bot, 3),
        ]));

        let reloaded = HistoryStore::new(path.clone());
        assert_eq!(reloaded.len(), 2);
        let board = reloaded.build_leaderboard(Some(10));
        assert_eq!(board.entries[0].name, "Bob");
        assert_eq!(board.entries[0].wins, 1);
        let alice = board
            .entries
            .iter()
            .find(|entry| entry.name == "Alice")
            .expect("alice exists");
        assert_eq!(alice.matches, 1);
        assert_eq!(alice.best_placement, Some(2));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn sample_bots_skips_excluded_and_snapshotless_identities() {
        let path = temp_file("history-store-sample");
        let mut store = HistoryStore::new(path.clone());
        store.record(&snapshots_record("Alice", Some(3)));
        store.record(&snapshots_record("Dana", Some(2)));
        store.record(&finished(&[("Bob", ParticipantKind::Human, 1)]));

        let mut rng = Rng::new(4);
        let bots = store.sample_bots(5, &["ALICE".to_string()], &mut rng);
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].identity, "Dana");
        assert_eq!(bots[0].snapshots.len(), 2);
        assert!(bots[0].snapshots.contains_key(&(1, 2)));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn load_merges_case_insensitive_identities_and_skips_broken_ones() {
        let path = temp_file("history-store-load");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        let raw = r#"{
  "version": 1,
  "identities": {
    "ALICE": { "name": "Alice", "matches": 2, "wins": 1, "updatedAtMs": 10 },
    "alice_legacy": { "name": " alice ", "matches": 1, "wins": 4, "updatedAtMs": 20 },
    "broken": { "name": "Broken", "matches": -1 },
    "blank": { "name": "   ", "matches": 3 }
  }
}"#;
        fs::write(&path, raw).expect("write file");

        let store = HistoryStore::new(path.clone());
        assert_eq!(store.len(), 1);
        let board = store.build_leaderboard(Some(10));
        assert_eq!(board.entries[0].name, "alice");
        assert_eq!(board.entries[0].matches, 3);
        assert_eq!(board.entries[0].wins, 2);

        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn unsupported_version_degrades_to_empty() {
        let path = temp_file("history-store-version");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        fs::write(&path, r#"{"version": 9, "identities": {}}"#).expect("write file");
        assert!(HistoryStore::new(path.clone()).is_empty());
        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn leaderboard_limit_is_clamped() {
        let path = temp_file("history-store-limit");
        let mut store = HistoryStore::new(path.clone());
        store.record(&finished(&[
            ("P1", ParticipantKind::Human, 1),
            ("P2", ParticipantKind::Human, 2),
            ("P3", ParticipantKind::Human, 3),
        ]));
        assert_eq!(store.build_leaderboard(Some(1)).entries.len(), 1);
        assert_eq!(store.build_leaderboard(Some(0)).entries.len(), 1);
        assert_eq!(store.build_leaderboard(Some(999)).entries.len(), 3);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn snapshot_keys_parse_stage_and_round() {
        assert_eq!(parse_snapshot_key("2-3"), Some((2, 3)));
        assert_eq!(parse_snapshot_key("x-3"), None);
        assert_eq!(parse_snapshot_key("23"), None);
        assert_eq!(snapshot_key((4, 1)), "4-1");
    }
}
