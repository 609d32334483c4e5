use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::cards::{Battler, Card, CardId, CardIdAllocator, CatalogEntry};
use crate::config::GameConfig;
use crate::constants::MAX_PLAYERS_PER_MATCH;
use crate::error::{GameError, GameResult};
use crate::participants::{
    FakePlayer, MatchId, ParticipantKind, ParticipantRef, Phase, Player, RoundKey,
    StaticOpponent,
};
use crate::protocol::{GameAction, ResultClaim};
use crate::rng::Rng;
use crate::types::{
    BattleView, BotView, GameStateView, GameSummary, PlacementEntry, PublicPlayerView, SelfView,
    ZonesView,
};
use crate::zones::{CardState, ZoneName, ZoneSource, Zones};

mod battle_system;
mod bot_system;
mod build_system;
mod draft_system;
mod elimination_system;
mod matchmaking;
mod reward_system;
mod utils;

pub use self::battle_system::{ghost_side_name, Battle, BattleSide};
pub use self::draft_system::DraftState;
pub use self::matchmaking::Opponent;
pub use self::reward_system::poison_damage;
pub use self::utils::weighted_random_opponent;

use self::reward_system::Outcome;
use self::utils::{now_ms, take_card};

/// Something the persistence collaborator should store. Drained by the
/// server after every action.
#[derive(Clone, Debug, PartialEq)]
pub enum HistoryRecord {
    /// Every per-round snapshot of one human, emitted on elimination and for
    /// the winner at game end.
    Snapshots {
        identity: String,
        placement: Option<u32>,
        snapshots: BTreeMap<RoundKey, StaticOpponent>,
    },
    Finished {
        match_id: MatchId,
        placements: Vec<PlacementEntry>,
    },
}

/// One match: the single root of mutable state. Everything below mutates it
/// through `&mut self`, so one action always runs to completion before the
/// next one is looked at.
#[derive(Clone, Debug)]
pub struct Game {
    pub match_id: MatchId,
    pub config: GameConfig,
    pub started_at_ms: u64,
    pub seed: u32,

    players: Vec<Player>,
    bots: Vec<FakePlayer>,
    battler: Battler,
    draft: Option<DraftState>,
    battles: Vec<Battle>,
    ghost: Option<StaticOpponent>,
    rng: Rng,
    ids: CardIdAllocator,
    next_battle_id: u64,
    history_outbox: Vec<HistoryRecord>,
    ended: bool,
    winner: Option<String>,
}

impl Game {
    pub fn new(
        match_id: MatchId,
        names: Vec<String>,
        bots: Vec<FakePlayer>,
        catalog: &[CatalogEntry],
        config: GameConfig,
        seed: u32,
    ) -> GameResult<Self> {
        config.validate()?;
        if names.is_empty() {
            return Err(GameError::invariant("a match needs at least one player"));
        }
        if names.len() > MAX_PLAYERS_PER_MATCH {
            return Err(GameError::invariant(format!(
                "a match holds at most {MAX_PLAYERS_PER_MATCH} players"
            )));
        }
        if names.len() + bots.len() < 2 {
            return Err(GameError::invariant(
                "a match needs at least two participants",
            ));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(GameError::invariant(format!("duplicate player name {name}")));
            }
        }

        let mut rng = Rng::new(seed);
        let mut ids = CardIdAllocator::new();
        let mut battler = Battler::from_catalog(catalog, &mut ids);

        let mut players = Vec::with_capacity(names.len());
        for name in names {
            let mut player = Player::new(name, match_id.clone());
            player.treasures = config.starting_treasures.min(config.max_treasures);
            for _ in 0..config.starting_cards {
                let Some(card) = battler.draw_random(&mut rng) else {
                    break;
                };
                player.sideboard.push(card);
            }
            if config.use_vanguards {
                if let Some(vanguard) = battler.draw_vanguard(&mut rng) {
                    player.command_zone.push(vanguard);
                }
            }
            players.push(player);
        }

        let mut bots = bots;
        for bot in &mut bots {
            bot_system::reissue_snapshot_ids(bot, &mut ids);
        }

        let mut game = Self {
            match_id,
            config,
            started_at_ms: now_ms(),
            seed,
            players,
            bots,
            battler,
            draft: None,
            battles: Vec::new(),
            ghost: None,
            rng,
            ids,
            next_battle_id: 1,
            history_outbox: Vec::new(),
            ended: false,
            winner: None,
        };
        for idx in 0..game.players.len() {
            game.deal_into_draft(idx)?;
        }
        info!(
            match_id = %game.match_id,
            players = game.players.len(),
            bots = game.bots.len(),
            pool = game.battler.len(),
            seed,
            "match started"
        );
        Ok(game)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.name == name)
    }

    pub fn bots(&self) -> &[FakePlayer] {
        &self.bots
    }

    pub fn ghost(&self) -> Option<&StaticOpponent> {
        self.ghost.as_ref()
    }

    pub fn battles(&self) -> &[Battle] {
        &self.battles
    }

    pub fn battle_for(&self, name: &str) -> Option<&Battle> {
        self.battles.iter().find(|battle| battle.involves(name))
    }

    pub fn draft(&self) -> Option<&DraftState> {
        self.draft.as_ref()
    }

    pub fn held_pack(&self, name: &str) -> Option<&[Card]> {
        self.draft.as_ref().and_then(|draft| draft.held_pack(name))
    }

    pub fn battler(&self) -> &Battler {
        &self.battler
    }

    /// Every human and bot seat, then the ghost if one is frozen.
    pub fn participants(&self) -> impl Iterator<Item = ParticipantRef<'_>> {
        self.players
            .iter()
            .map(ParticipantRef::Human)
            .chain(self.bots.iter().map(ParticipantRef::Bot))
            .chain(self.ghost.iter().map(ParticipantRef::Ghost))
    }

    /// Live humans plus bots that are still in.
    pub fn live_count(&self) -> usize {
        self.participants()
            .filter(|participant| !participant.is_eliminated())
            .count()
    }

    pub fn drain_history(&mut self) -> Vec<HistoryRecord> {
        std::mem::take(&mut self.history_outbox)
    }

    /// Runs one client action for `name`. The phase check happens before
    /// anything is touched.
    pub fn apply_action(&mut self, name: &str, action: GameAction) -> GameResult<()> {
        if self.ended {
            return Err(GameError::invariant("the match is over"));
        }
        let idx = self.player_index(name)?;
        self.players[idx].require_phase(action.required_phase())?;
        debug!(match_id = %self.match_id, player = name, action = action.name(), "apply action");

        match action {
            GameAction::DraftSwap {
                pack_card,
                own_card,
                destination,
            } => self.draft_swap(idx, pack_card, own_card, destination),
            GameAction::DraftRoll => self.draft_roll(idx),
            GameAction::DraftDone => self.draft_done(idx),
            GameAction::BuildMove { card, from, to } => self.build_move(idx, card, from, to),
            GameAction::BuildSwap {
                hand_card,
                sideboard_card,
            } => self.build_swap(idx, hand_card, sideboard_card),
            GameAction::BuildReady { basics } => self.build_ready(idx, &basics),
            GameAction::BuildUnready => self.build_unready(idx),
            GameAction::BuildApplyUpgrade { upgrade, target } => {
                self.apply_upgrade(idx, upgrade, target)
            }
            GameAction::BuildSetCompanion { card } => self.set_companion(idx, card),
            GameAction::BuildRemoveCompanion => self.remove_companion(idx),
            GameAction::BattleMove { card, from, to } => self.battle_move(idx, card, from, to),
            GameAction::BattleSubmitResult { claim } => self.submit_result(idx, claim),
            GameAction::BattleUpdateCardState {
                card,
                tapped,
                flipped,
                counters,
            } => self.update_card_state(idx, card, tapped, flipped, counters),
            GameAction::BattleUpdateLife { life } => self.update_life(idx, life),
            GameAction::RewardPickUpgrade { upgrade } => self.reward_pick_upgrade(idx, upgrade),
            GameAction::RewardApplyUpgrade { upgrade, target } => {
                self.apply_upgrade(idx, upgrade, target)
            }
            GameAction::RewardDone => self.reward_done(idx),
        }
    }

    pub fn build_state_view(&self, viewer: &str) -> GameResult<GameStateView> {
        let idx = self.player_index(viewer)?;
        let me = &self.players[idx];

        let self_view = SelfView {
            name: me.name.clone(),
            phase: me.phase(),
            stage: me.stage,
            round: me.round,
            poison: me.poison,
            treasures: me.treasures,
            vanquishers: me.vanquishers,
            hand: me.hand.clone(),
            sideboard: me.sideboard.clone(),
            upgrades: me.upgrades.clone(),
            command_zone: me.command_zone.clone(),
            chosen_basics: me.chosen_basics.clone(),
            build_ready: me.build_ready,
            in_sudden_death: me.in_sudden_death,
            placement: me.placement,
            last_opponent: me.last_opponent.clone(),
            upgrade_offers: me.upgrade_offers.clone(),
            pending_upgrade_pick: me.pending_upgrade_pick.clone(),
            recently_revealed: me.recently_revealed.clone(),
            pack: self.held_pack(viewer).map(<[Card]>::to_vec),
        };

        let players = self
            .players
            .iter()
            .map(|player| PublicPlayerView {
                name: player.name.clone(),
                phase: player.phase(),
                stage: player.stage,
                round: player.round,
                poison: player.poison,
                treasures: player.treasures,
                hand_count: player.hand.len(),
                sideboard_count: player.sideboard.len(),
                upgrade_count: player.upgrades.len(),
                build_ready: player.build_ready,
                placement: player.placement,
            })
            .collect();

        let bots = self
            .bots
            .iter()
            .map(|bot| BotView {
                name: bot.name.clone(),
                poison: bot.poison,
                eliminated: bot.eliminated,
                placement: bot.placement,
            })
            .collect();

        let battle = self.battle_for(viewer).and_then(|battle| {
            let mine_idx = battle.side_index(viewer)?;
            let mine = &battle.sides[mine_idx];
            let theirs = &battle.sides[1 - mine_idx];
            Some(BattleView {
                opponent: theirs.name.clone(),
                opponent_kind: theirs.kind,
                coin_flip_winner: battle.coin_flip_winner.clone(),
                sudden_death: battle.sudden_death,
                mine: zones_view(&mine.zones, true),
                theirs: zones_view(&theirs.zones, false),
                my_claim: battle
                    .results
                    .get(viewer)
                    .map(|claim| claim.as_wire().to_string()),
                opponent_claimed: theirs.kind == ParticipantKind::Human
                    && battle.results.contains_key(&theirs.name),
            })
        });

        Ok(GameStateView {
            match_id: self.match_id.to_string(),
            me: self_view,
            players,
            bots,
            ghost: self.ghost.as_ref().map(|ghost| ghost.name.clone()),
            battle,
            pool_size: self.battler.len(),
            battler_elo: self.battler.elo(),
            ended: self.ended,
            winner: self.winner.clone(),
        })
    }

    pub fn summary(&self) -> GameSummary {
        GameSummary {
            match_id: self.match_id.to_string(),
            winner: self.winner.clone(),
            placements: self.placements(),
        }
    }

    fn placements(&self) -> Vec<PlacementEntry> {
        let mut placements: Vec<PlacementEntry> = self
            .players
            .iter()
            .filter_map(|player| {
                Some(PlacementEntry {
                    name: player.name.clone(),
                    kind: ParticipantKind::Human,
                    placement: player.placement?,
                })
            })
            .chain(self.bots.iter().filter_map(|bot| {
                Some(PlacementEntry {
                    name: bot.name.clone(),
                    kind: ParticipantKind::Bot,
                    placement: bot.placement?,
                })
            }))
            .collect();
        placements.sort_by(|a, b| a.placement.cmp(&b.placement).then_with(|| a.name.cmp(&b.name)));
        placements
    }

    fn player_index(&self, name: &str) -> GameResult<usize> {
        self.players
            .iter()
            .position(|player| player.name == name)
            .ok_or_else(|| GameError::reference(format!("no player named {name}")))
    }

    fn bot_index(&self, name: &str) -> Option<usize> {
        self.bots.iter().position(|bot| bot.name == name)
    }
}

fn zones_view(zones: &Zones, reveal_hidden: bool) -> ZonesView {
    let visible = |name: ZoneName| {
        (reveal_hidden || !name.is_hidden()).then(|| zones.zone(name).clone())
    };
    ZonesView {
        battlefield: zones.battlefield.clone(),
        graveyard: zones.graveyard.clone(),
        exile: zones.exile.clone(),
        upgrades: zones.upgrades.clone(),
        command_zone: zones.command_zone.clone(),
        hand: visible(ZoneName::Hand),
        hand_count: zones.hand.len(),
        sideboard: visible(ZoneName::Sideboard),
        sideboard_count: zones.sideboard.len(),
        library: visible(ZoneName::Library),
        library_count: zones.library.len(),
        life: zones.life,
        card_states: zones.card_states.clone(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::cards::{demo_catalog, BasicLand, CardKind};

    pub fn names(count: usize) -> Vec<String> {
        (0..count).map(|idx| format!("p{}", idx + 1)).collect()
    }

    pub fn new_game(players: usize, config: GameConfig, seed: u32) -> Game {
        Game::new(
            MatchId::new("test-match"),
            names(players),
            Vec::new(),
            &demo_catalog(120),
            config,
            seed,
        )
        .expect("game should start")
    }

    pub fn bot(identity: &str, poison: u32) -> FakePlayer {
        let mut snapshots = BTreeMap::new();
        snapshots.insert(
            (1, 1),
            StaticOpponent {
                name: identity.to_string(),
                hand: (0..5)
                    .map(|idx| Card {
                        id: 9_000 + idx,
                        name: format!("Old Card {idx}"),
                        kind: CardKind::Normal,
                        elo: 1200.0,
                        upgrade_target: None,
                    })
                    .collect(),
                sideboard: Vec::new(),
                command_zone: Vec::new(),
                basics: vec![BasicLand::Swamp; 3],
                upgrades: Vec::new(),
                treasures: 1,
                poison: 0,
            },
        );
        let mut bot = FakePlayer::new(identity, snapshots);
        bot.poison = poison;
        bot
    }

    /// Drives `name` from draft through a ready build with the first cards
    /// of their sideboard.
    pub fn ready_up(game: &mut Game, name: &str) {
        game.apply_action(name, GameAction::DraftDone)
            .expect("draft done");
        finish_build(game, name);
    }

    /// Tops the hand up from the sideboard and readies with Plains.
    pub fn finish_build(game: &mut Game, name: &str) {
        let hand_size = game.config.hand_size;
        let player = game.player(name).expect("player exists");
        let missing = hand_size.saturating_sub(player.hand.len());
        let to_move: Vec<CardId> = player
            .sideboard
            .iter()
            .take(missing)
            .map(|card| card.id)
            .collect();
        for card in to_move {
            game.apply_action(
                name,
                GameAction::BuildMove {
                    card,
                    from: ZoneName::Sideboard,
                    to: ZoneName::Hand,
                },
            )
            .expect("move to hand");
        }
        let basics = vec!["Plains".to_string(); game.config.num_basics];
        game.apply_action(name, GameAction::BuildReady { basics })
            .expect("ready");
    }

    pub fn submit(game: &mut Game, name: &str, winner: &str) {
        game.apply_action(
            name,
            GameAction::BattleSubmitResult {
                claim: ResultClaim::parse(winner),
            },
        )
        .expect("submit result");
    }

    pub fn player_mut<'a>(game: &'a mut Game, name: &str) -> &'a mut Player {
        let idx = game.player_index(name).expect("player exists");
        &mut game.players[idx]
    }

    pub fn force_phase(player: &mut Player, phase: Phase) {
        while player.phase() != phase {
            let next = match player.phase() {
                Phase::Draft => Phase::Build,
                Phase::Build => Phase::Battle,
                Phase::Battle => Phase::Reward,
                Phase::Reward => Phase::Draft,
                other => panic!("cannot walk from {other:?}"),
            };
            player.set_phase(next).expect("walk phase");
        }
    }
}
