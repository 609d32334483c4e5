use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cards::{BasicLand, Card, CardId, CardIdAllocator};
use crate::error::{GameError, GameResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneName {
    Battlefield,
    Graveyard,
    Exile,
    Hand,
    Sideboard,
    Upgrades,
    CommandZone,
    Library,
}

impl ZoneName {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "battlefield" => Some(Self::Battlefield),
            "graveyard" => Some(Self::Graveyard),
            "exile" => Some(Self::Exile),
            "hand" => Some(Self::Hand),
            "sideboard" => Some(Self::Sideboard),
            "upgrades" => Some(Self::Upgrades),
            "command_zone" => Some(Self::CommandZone),
            "library" => Some(Self::Library),
            _ => None,
        }
    }

    /// Zones whose contents the opponent only sees as a count.
    pub fn is_hidden(self) -> bool {
        matches!(self, Self::Hand | Self::Sideboard | Self::Library)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardState {
    pub tapped: bool,
    pub flipped: bool,
    pub counters: i32,
}

/// Everything one side of a battle can touch, plus what it brought in.
#[derive(Clone, Debug, Default)]
pub struct Zones {
    pub battlefield: Vec<Card>,
    pub graveyard: Vec<Card>,
    pub exile: Vec<Card>,
    pub hand: Vec<Card>,
    pub sideboard: Vec<Card>,
    pub upgrades: Vec<Card>,
    pub command_zone: Vec<Card>,
    pub library: Vec<Card>,
    pub life: i32,
    pub card_states: BTreeMap<CardId, CardState>,
    /// Ids of the hand and sideboard cards brought into the battle.
    pub submitted_cards: HashSet<CardId>,
    pub submitted_treasures: u32,
}

/// Input to [`Zones::assemble`]; borrowed from a live player or a snapshot.
pub struct ZoneSource<'a> {
    pub hand: &'a [Card],
    pub sideboard: &'a [Card],
    pub upgrades: &'a [Card],
    pub command_zone: &'a [Card],
    pub basics: &'a [BasicLand],
    pub treasures: u32,
}

/// What a player keeps once a battle is over.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FoldedCollection {
    pub sideboard: Vec<Card>,
    pub upgrades: Vec<Card>,
    pub command_zone: Vec<Card>,
    pub treasures: u32,
}

impl Zones {
    pub fn assemble(source: ZoneSource<'_>, life: i32, ids: &mut CardIdAllocator) -> Self {
        let mut battlefield: Vec<Card> = source
            .basics
            .iter()
            .map(|land| ids.basic_land(*land))
            .collect();
        for _ in 0..source.treasures {
            battlefield.push(ids.treasure_token());
        }

        let submitted_cards = source
            .hand
            .iter()
            .chain(source.sideboard.iter())
            .map(|card| card.id)
            .collect();

        Self {
            battlefield,
            hand: source.hand.to_vec(),
            sideboard: source.sideboard.to_vec(),
            upgrades: source.upgrades.to_vec(),
            command_zone: source.command_zone.to_vec(),
            life,
            submitted_cards,
            submitted_treasures: source.treasures,
            ..Self::default()
        }
    }

    pub fn zone(&self, name: ZoneName) -> &Vec<Card> {
        match name {
            ZoneName::Battlefield => &self.battlefield,
            ZoneName::Graveyard => &self.graveyard,
            ZoneName::Exile => &self.exile,
            ZoneName::Hand => &self.hand,
            ZoneName::Sideboard => &self.sideboard,
            ZoneName::Upgrades => &self.upgrades,
            ZoneName::CommandZone => &self.command_zone,
            ZoneName::Library => &self.library,
        }
    }

    fn zone_mut(&mut self, name: ZoneName) -> &mut Vec<Card> {
        match name {
            ZoneName::Battlefield => &mut self.battlefield,
            ZoneName::Graveyard => &mut self.graveyard,
            ZoneName::Exile => &mut self.exile,
            ZoneName::Hand => &mut self.hand,
            ZoneName::Sideboard => &mut self.sideboard,
            ZoneName::Upgrades => &mut self.upgrades,
            ZoneName::CommandZone => &mut self.command_zone,
            ZoneName::Library => &mut self.library,
        }
    }

    pub fn contains(&self, id: CardId) -> bool {
        self.all_cards().any(|card| card.id == id)
    }

    pub fn all_cards(&self) -> impl Iterator<Item = &Card> {
        self.battlefield
            .iter()
            .chain(self.graveyard.iter())
            .chain(self.exile.iter())
            .chain(self.hand.iter())
            .chain(self.sideboard.iter())
            .chain(self.upgrades.iter())
            .chain(self.command_zone.iter())
            .chain(self.library.iter())
    }

    pub fn move_card(&mut self, id: CardId, from: ZoneName, to: ZoneName) -> GameResult<()> {
        let Some(idx) = self.zone(from).iter().position(|card| card.id == id) else {
            return Err(GameError::reference(format!(
                "card {id} is not in {from:?}"
            )));
        };
        if from == to {
            return Ok(());
        }
        let card = self.zone_mut(from).remove(idx);
        self.zone_mut(to).push(card);
        Ok(())
    }

    pub fn set_card_state(&mut self, id: CardId, state: CardState) -> GameResult<()> {
        if !self.contains(id) {
            return Err(GameError::reference(format!("card {id} is not in play")));
        }
        self.card_states.insert(id, state);
        Ok(())
    }

    pub fn treasure_count(&self) -> u32 {
        self.battlefield.iter().filter(|card| card.is_token()).count() as u32
    }

    /// Cards that were public during the fight, for the post-battle reveal.
    pub fn revealed_cards(&self) -> Vec<Card> {
        self.battlefield
            .iter()
            .chain(self.graveyard.iter())
            .chain(self.exile.iter())
            .filter(|card| card.is_collectible() && !card.is_upgrade())
            .cloned()
            .collect()
    }

    /// Folds the battle back into persistent collections. Every submitted card
    /// lands in the sideboard regardless of where it ended up; conjured lands
    /// and tokens are dropped; treasure is recounted from the battlefield.
    pub fn fold(&self, max_treasures: u32) -> FoldedCollection {
        let mut sideboard = Vec::new();
        let mut upgrades = Vec::new();
        let mut command_zone = Vec::new();

        for card in self.all_cards() {
            if !card.is_collectible() {
                continue;
            }
            if card.is_upgrade() {
                upgrades.push(card.clone());
            } else if self.submitted_cards.contains(&card.id) {
                sideboard.push(card.clone());
            } else {
                // only command zone cards enter without being submitted
                command_zone.push(card.clone());
            }
        }

        FoldedCollection {
            sideboard,
            upgrades,
            command_zone,
            treasures: self.treasure_count().min(max_treasures),
        }
    }
}
