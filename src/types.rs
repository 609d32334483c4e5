use std::collections::BTreeMap;

use serde::Serialize;

use crate::cards::{BasicLand, Card, CardId};
use crate::participants::{ParticipantKind, Phase};
use crate::zones::CardState;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfView {
    pub name: String,
    pub phase: Phase,
    pub stage: u32,
    pub round: u32,
    pub poison: u32,
    pub treasures: u32,
    pub vanquishers: u32,
    pub hand: Vec<Card>,
    pub sideboard: Vec<Card>,
    pub upgrades: Vec<Card>,
    pub command_zone: Vec<Card>,
    pub chosen_basics: Vec<BasicLand>,
    pub build_ready: bool,
    pub in_sudden_death: bool,
    pub placement: Option<u32>,
    pub last_opponent: Option<String>,
    pub upgrade_offers: Vec<Card>,
    pub pending_upgrade_pick: Option<Card>,
    pub recently_revealed: Vec<Card>,
    pub pack: Option<Vec<Card>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPlayerView {
    pub name: String,
    pub phase: Phase,
    pub stage: u32,
    pub round: u32,
    pub poison: u32,
    pub treasures: u32,
    pub hand_count: usize,
    pub sideboard_count: usize,
    pub upgrade_count: usize,
    pub build_ready: bool,
    pub placement: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotView {
    pub name: String,
    pub poison: u32,
    pub eliminated: bool,
    pub placement: Option<u32>,
}

/// One side's zones as a particular viewer may see them. Hidden zones of the
/// opposing side carry only their counts.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZonesView {
    pub battlefield: Vec<Card>,
    pub graveyard: Vec<Card>,
    pub exile: Vec<Card>,
    pub upgrades: Vec<Card>,
    pub command_zone: Vec<Card>,
    pub hand: Option<Vec<Card>>,
    pub hand_count: usize,
    pub sideboard: Option<Vec<Card>>,
    pub sideboard_count: usize,
    pub library: Option<Vec<Card>>,
    pub library_count: usize,
    pub life: i32,
    pub card_states: BTreeMap<CardId, CardState>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleView {
    pub opponent: String,
    pub opponent_kind: ParticipantKind,
    pub coin_flip_winner: String,
    pub sudden_death: bool,
    pub mine: ZonesView,
    pub theirs: ZonesView,
    pub my_claim: Option<String>,
    pub opponent_claimed: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub match_id: String,
    pub me: SelfView,
    pub players: Vec<PublicPlayerView>,
    pub bots: Vec<BotView>,
    pub ghost: Option<String>,
    pub battle: Option<BattleView>,
    pub pool_size: usize,
    pub battler_elo: f32,
    pub ended: bool,
    pub winner: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementEntry {
    pub name: String,
    pub kind: ParticipantKind,
    pub placement: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub match_id: String,
    pub winner: Option<String>,
    pub placements: Vec<PlacementEntry>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyMemberView {
    pub name: String,
    pub ready: bool,
    pub connected: bool,
    pub is_host: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyView {
    pub match_id: String,
    pub host: Option<String>,
    pub members: Vec<LobbyMemberView>,
    pub can_start: bool,
    pub running: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub name: String,
    pub matches: u64,
    pub wins: u64,
    pub win_rate: f64,
    pub best_placement: Option<u32>,
    pub updated_at_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub generated_at_iso: String,
    pub entries: Vec<LeaderboardEntry>,
}

/// Everything the server pushes down a socket.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Welcome {
        #[serde(rename = "matchId")]
        match_id: String,
        name: String,
    },
    LobbyState(LobbyView),
    GameState(Box<GameStateView>),
    GameOver(GameSummary),
    Error {
        message: String,
    },
    Pong {
        t: f64,
    },
}
