use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::rng::Rng;

pub type CardId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasicLand {
    Plains,
    Island,
    Swamp,
    Mountain,
    Forest,
    Wastes,
}

impl BasicLand {
    pub const ALL: [BasicLand; 6] = [
        Self::Plains,
        Self::Island,
        Self::Swamp,
        Self::Mountain,
        Self::Forest,
        Self::Wastes,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|land| land.display_name().eq_ignore_ascii_case(value))
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Plains => "Plains",
            Self::Island => "Island",
            Self::Swamp => "Swamp",
            Self::Mountain => "Mountain",
            Self::Forest => "Forest",
            Self::Wastes => "Wastes",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Normal,
    Basic(BasicLand),
    Treasure,
    Upgrade,
    Vanguard,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub kind: CardKind,
    #[serde(default)]
    pub elo: f32,
    /// Set on an upgrade once it has been applied to a card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_target: Option<CardId>,
}

impl Card {
    pub fn is_basic(&self) -> bool {
        matches!(self.kind, CardKind::Basic(_))
    }

    pub fn is_token(&self) -> bool {
        matches!(self.kind, CardKind::Treasure)
    }

    pub fn is_upgrade(&self) -> bool {
        self.kind == CardKind::Upgrade
    }

    pub fn is_vanguard(&self) -> bool {
        self.kind == CardKind::Vanguard
    }

    /// Cards that belong to a player's persistent collection, as opposed to
    /// lands and tokens conjured for a single battle.
    pub fn is_collectible(&self) -> bool {
        !self.is_basic() && !self.is_token()
    }
}

#[derive(Clone, Debug, Default)]
pub struct CardIdAllocator {
    next: CardId,
}

impl CardIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> CardId {
        let id = self.next.max(1);
        self.next = id + 1;
        id
    }

    pub fn basic_land(&mut self, land: BasicLand) -> Card {
        Card {
            id: self.next_id(),
            name: land.display_name().to_string(),
            kind: CardKind::Basic(land),
            elo: 0.0,
            upgrade_target: None,
        }
    }

    pub fn treasure_token(&mut self) -> Card {
        Card {
            id: self.next_id(),
            name: "Treasure".to_string(),
            kind: CardKind::Treasure,
            elo: 0.0,
            upgrade_target: None,
        }
    }

    /// Fresh copy of `template` with a new id and no applied target.
    pub fn copy_of(&mut self, template: &Card) -> Card {
        Card {
            id: self.next_id(),
            upgrade_target: None,
            ..template.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: CardKind,
    #[serde(default = "default_elo")]
    pub elo: f32,
}

fn default_kind() -> CardKind {
    CardKind::Normal
}

fn default_elo() -> f32 {
    1200.0
}

pub fn load_catalog(path: &Path) -> io::Result<Vec<CatalogEntry>> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
}

pub fn demo_catalog(card_count: usize) -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> = (0..card_count)
        .map(|idx| CatalogEntry {
            name: format!("Cube Card {:03}", idx + 1),
            kind: CardKind::Normal,
            elo: 1000.0 + ((idx * 37) % 400) as f32,
        })
        .collect();
    for name in [
        "Keen Edge",
        "Hardened Scales",
        "Swift Boots",
        "Arcane Focus",
        "Blood Pact",
        "Verdant Growth",
    ] {
        entries.push(CatalogEntry {
            name: name.to_string(),
            kind: CardKind::Upgrade,
            elo: 0.0,
        });
    }
    for name in ["Warlord", "Archmage", "Druid", "Reaper"] {
        entries.push(CatalogEntry {
            name: name.to_string(),
            kind: CardKind::Vanguard,
            elo: 0.0,
        });
    }
    entries
}

/// Shared undrafted pool for one match.
#[derive(Clone, Debug)]
pub struct Battler {
    cards: Vec<Card>,
    upgrades: Vec<Card>,
    vanguards: Vec<Card>,
    elo: f32,
}

impl Battler {
    pub fn from_catalog(entries: &[CatalogEntry], ids: &mut CardIdAllocator) -> Self {
        let mut cards = Vec::new();
        let mut upgrades = Vec::new();
        let mut vanguards = Vec::new();
        for entry in entries {
            let card = Card {
                id: ids.next_id(),
                name: entry.name.clone(),
                kind: entry.kind,
                elo: entry.elo,
                upgrade_target: None,
            };
            match entry.kind {
                CardKind::Upgrade => upgrades.push(card),
                CardKind::Vanguard => vanguards.push(card),
                CardKind::Normal => cards.push(card),
                // lands and tokens are conjured per battle, never pooled
                CardKind::Basic(_) | CardKind::Treasure => {}
            }
        }
        Self::new(cards, upgrades, vanguards)
    }

    pub fn new(cards: Vec<Card>, upgrades: Vec<Card>, vanguards: Vec<Card>) -> Self {
        let elo = if cards.is_empty() {
            0.0
        } else {
            cards.iter().map(|card| card.elo).sum::<f32>() / cards.len() as f32
        };
        Self {
            cards,
            upgrades,
            vanguards,
            elo,
        }
    }

    /// Quality score fixed at construction.
    pub fn elo(&self) -> f32 {
        self.elo
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn upgrades(&self) -> &[Card] {
        &self.upgrades
    }

    pub fn take_all(&mut self) -> Vec<Card> {
        std::mem::take(&mut self.cards)
    }

    pub fn return_cards(&mut self, cards: impl IntoIterator<Item = Card>) {
        self.cards.extend(cards);
    }

    pub fn remove(&mut self, id: CardId) -> Option<Card> {
        let idx = self.cards.iter().position(|card| card.id == id)?;
        Some(self.cards.swap_remove(idx))
    }

    pub fn draw_random(&mut self, rng: &mut Rng) -> Option<Card> {
        if self.cards.is_empty() {
            return None;
        }
        let idx = rng.pick_index(self.cards.len());
        Some(self.cards.swap_remove(idx))
    }

    pub fn draw_vanguard(&mut self, rng: &mut Rng) -> Option<Card> {
        if self.vanguards.is_empty() {
            return None;
        }
        let idx = rng.pick_index(self.vanguards.len());
        Some(self.vanguards.swap_remove(idx))
    }

    /// Distinct upgrade templates, at most `count`, in random order.
    pub fn sample_upgrades(&self, count: usize, rng: &mut Rng) -> Vec<Card> {
        let mut pool = self.upgrades.clone();
        rng.shuffle(&mut pool);
        pool.truncate(count);
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, elo: f32) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            kind: CardKind::Normal,
            elo,
        }
    }

    #[test]
    fn elo_is_fixed_at_construction() {
        let mut ids = CardIdAllocator::new();
        let mut battler =
            Battler::from_catalog(&[entry("a", 1000.0), entry("b", 1400.0)], &mut ids);
        assert_eq!(battler.elo(), 1200.0);

        let drained = battler.take_all();
        assert_eq!(drained.len(), 2);
        assert!(battler.is_empty());
        assert_eq!(battler.elo(), 1200.0);
    }

    #[test]
    fn empty_catalog_has_zero_elo() {
        let mut ids = CardIdAllocator::new();
        let battler = Battler::from_catalog(&[], &mut ids);
        assert_eq!(battler.elo(), 0.0);
        assert!(battler.is_empty());
    }

    #[test]
    fn catalog_splits_sub_pools() {
        let mut ids = CardIdAllocator::new();
        let battler = Battler::from_catalog(&demo_catalog(20), &mut ids);
        assert_eq!(battler.len(), 20);
        assert_eq!(battler.upgrades().len(), 6);
        assert!(battler.upgrades().iter().all(Card::is_upgrade));
    }

    #[test]
    fn allocator_never_reuses_ids() {
        let mut ids = CardIdAllocator::new();
        let land = ids.basic_land(BasicLand::Island);
        let token = ids.treasure_token();
        let copy = ids.copy_of(&token);
        assert!(land.id != token.id && token.id != copy.id);
        assert!(land.is_basic() && !land.is_collectible());
        assert!(token.is_token());
    }

    #[test]
    fn basic_land_parse_is_case_insensitive() {
        assert_eq!(BasicLand::parse(" PLAINS "), Some(BasicLand::Plains));
        assert_eq!(BasicLand::parse("Snow-Covered Island"), None);
    }

    #[test]
    fn catalog_entry_defaults_to_normal_card() {
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(r#"[{"name":"Bolt"},{"name":"Edge","kind":"upgrade"}]"#)
                .expect("parse");
        assert_eq!(entries[0].kind, CardKind::Normal);
        assert_eq!(entries[0].elo, 1200.0);
        assert_eq!(entries[1].kind, CardKind::Upgrade);
    }
}
