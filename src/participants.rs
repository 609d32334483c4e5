use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cards::{BasicLand, Card, CardId};
use crate::error::{GameError, GameResult};

/// Opaque id of one match. Players carry it instead of a pointer back to the
/// game; the game is resolved through the match registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Draft,
    Build,
    Battle,
    Reward,
    AwaitingElimination,
    Eliminated,
    Winner,
    GameOver,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Build => "build",
            Self::Battle => "battle",
            Self::Reward => "reward",
            Self::AwaitingElimination => "awaiting_elimination",
            Self::Eliminated => "eliminated",
            Self::Winner => "winner",
            Self::GameOver => "game_over",
        }
    }

    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Draft, Build)
                | (Build, Battle)
                | (Battle, Reward)
                | (Battle, AwaitingElimination)
                | (Reward, Draft)
                | (AwaitingElimination, Eliminated)
                | (AwaitingElimination, Build)
                | (Eliminated, GameOver)
                | (Draft | Build | Battle | Reward | AwaitingElimination, Winner)
        )
    }

    /// Not knocked out. The winner stays live after the match ends.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Eliminated | Self::GameOver)
    }
}

/// Frozen replay-only view of a participant at one point in a match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticOpponent {
    pub name: String,
    pub hand: Vec<Card>,
    pub sideboard: Vec<Card>,
    pub command_zone: Vec<Card>,
    pub basics: Vec<BasicLand>,
    pub upgrades: Vec<Card>,
    pub treasures: u32,
    pub poison: u32,
}

impl StaticOpponent {
    pub fn applied_upgrade_count(&self) -> usize {
        self.upgrades
            .iter()
            .filter(|upgrade| upgrade.upgrade_target.is_some())
            .count()
    }
}

pub type RoundKey = (u32, u32);

#[derive(Clone, Debug)]
pub struct Player {
    pub name: String,
    pub match_id: MatchId,
    phase: Phase,
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
    pub last_opponent: Option<String>,
    pub placement: Option<u32>,
    pub upgrade_offers: Vec<Card>,
    pub pending_upgrade_pick: Option<Card>,
    pub pre_battle_hand: Vec<CardId>,
    pub pre_battle_basics: Vec<BasicLand>,
    pub recently_revealed: Vec<Card>,
    pub history: BTreeMap<RoundKey, StaticOpponent>,
}

impl Player {
    pub fn new(name: impl Into<String>, match_id: MatchId) -> Self {
        Self {
            name: name.into(),
            match_id,
            phase: Phase::Draft,
            stage: 1,
            round: 1,
            poison: 0,
            treasures: 0,
            vanquishers: 0,
            hand: Vec::new(),
            sideboard: Vec::new(),
            upgrades: Vec::new(),
            command_zone: Vec::new(),
            chosen_basics: Vec::new(),
            build_ready: false,
            in_sudden_death: false,
            last_opponent: None,
            placement: None,
            upgrade_offers: Vec::new(),
            pending_upgrade_pick: None,
            pre_battle_hand: Vec::new(),
            pre_battle_basics: Vec::new(),
            recently_revealed: Vec::new(),
            history: BTreeMap::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase.is_live()
    }

    pub fn require_phase(&self, expected: Phase) -> GameResult<()> {
        if self.phase != expected {
            return Err(GameError::invalid_phase(expected, self.phase));
        }
        Ok(())
    }

    pub fn set_phase(&mut self, next: Phase) -> GameResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(GameError::invariant(format!(
                "{} cannot move from {} to {}",
                self.name,
                self.phase.as_str(),
                next.as_str()
            )));
        }
        self.phase = next;
        Ok(())
    }

    pub fn round_key(&self) -> RoundKey {
        (self.stage, self.round)
    }

    pub fn applied_upgrade_count(&self) -> usize {
        self.upgrades
            .iter()
            .filter(|upgrade| upgrade.upgrade_target.is_some())
            .count()
    }

    pub fn owns_card(&self, id: CardId) -> bool {
        self.hand.iter().any(|card| card.id == id)
            || self.sideboard.iter().any(|card| card.id == id)
    }

    /// Puts the last submitted hand and basics back, unreadied. Cards that
    /// left the sideboard since then are skipped.
    pub fn restore_pre_battle_build(&mut self) {
        for id in &self.pre_battle_hand {
            if let Some(position) = self.sideboard.iter().position(|card| card.id == *id) {
                let card = self.sideboard.remove(position);
                self.hand.push(card);
            }
        }
        self.chosen_basics = self.pre_battle_basics.clone();
        self.build_ready = false;
    }

    pub fn snapshot(&self) -> StaticOpponent {
        StaticOpponent {
            name: self.name.clone(),
            hand: self.hand.clone(),
            sideboard: self.sideboard.clone(),
            command_zone: self.command_zone.clone(),
            basics: self.chosen_basics.clone(),
            upgrades: self.upgrades.clone(),
            treasures: self.treasures,
            poison: self.poison,
        }
    }
}

/// Simulated participant replaying a historical player's recorded rounds.
#[derive(Clone, Debug)]
pub struct FakePlayer {
    pub name: String,
    /// Identity of the historical player in the history store.
    pub identity: String,
    pub poison: u32,
    pub eliminated: bool,
    pub in_sudden_death: bool,
    pub placement: Option<u32>,
    pub snapshots: BTreeMap<RoundKey, StaticOpponent>,
}

impl FakePlayer {
    pub fn new(identity: impl Into<String>, snapshots: BTreeMap<RoundKey, StaticOpponent>) -> Self {
        let identity = identity.into();
        Self {
            name: format!("Bot {identity}"),
            identity,
            poison: 0,
            eliminated: false,
            in_sudden_death: false,
            placement: None,
            snapshots,
        }
    }

    /// Snapshot for `key`, or the latest one recorded before it.
    pub fn snapshot_for(&self, key: RoundKey) -> Option<&StaticOpponent> {
        self.snapshots
            .range(..=key)
            .next_back()
            .map(|(_, snapshot)| snapshot)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    Human,
    Bot,
    Ghost,
}

/// Shared read surface over the three kinds of participant that can fight.
#[derive(Clone, Copy, Debug)]
pub enum ParticipantRef<'a> {
    Human(&'a Player),
    Bot(&'a FakePlayer),
    Ghost(&'a StaticOpponent),
}

impl<'a> ParticipantRef<'a> {
    pub fn kind(&self) -> ParticipantKind {
        match self {
            Self::Human(_) => ParticipantKind::Human,
            Self::Bot(_) => ParticipantKind::Bot,
            Self::Ghost(_) => ParticipantKind::Ghost,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            Self::Human(player) => &player.name,
            Self::Bot(bot) => &bot.name,
            Self::Ghost(ghost) => &ghost.name,
        }
    }

    pub fn poison(&self) -> u32 {
        match self {
            Self::Human(player) => player.poison,
            Self::Bot(bot) => bot.poison,
            Self::Ghost(ghost) => ghost.poison,
        }
    }

    /// A ghost is by definition already out of the match.
    pub fn is_eliminated(&self) -> bool {
        match self {
            Self::Human(player) => !player.is_live(),
            Self::Bot(bot) => bot.eliminated,
            Self::Ghost(_) => true,
        }
    }
}
