use super::*;
use crate::cards::BasicLand;

impl Game {
    pub(super) fn build_move(
        &mut self,
        idx: usize,
        card: CardId,
        from: ZoneName,
        to: ZoneName,
    ) -> GameResult<()> {
        let player = &mut self.players[idx];
        let (source, target) = match (from, to) {
            (ZoneName::Hand, ZoneName::Sideboard) => (&mut player.hand, &mut player.sideboard),
            (ZoneName::Sideboard, ZoneName::Hand) => (&mut player.sideboard, &mut player.hand),
            (ZoneName::Hand, ZoneName::Hand) | (ZoneName::Sideboard, ZoneName::Sideboard) => {
                let zone = if from == ZoneName::Hand {
                    &player.hand
                } else {
                    &player.sideboard
                };
                if !zone.iter().any(|owned| owned.id == card) {
                    return Err(GameError::reference(format!(
                        "card {card} is not in {from:?}"
                    )));
                }
                return Ok(());
            }
            _ => {
                return Err(GameError::invariant(
                    "cards only move between hand and sideboard while building",
                ))
            }
        };
        let Some(moved) = take_card(source, card) else {
            return Err(GameError::reference(format!(
                "card {card} is not in {from:?}"
            )));
        };
        target.push(moved);
        player.build_ready = false;
        Ok(())
    }

    pub(super) fn build_swap(
        &mut self,
        idx: usize,
        hand_card: CardId,
        sideboard_card: CardId,
    ) -> GameResult<()> {
        let player = &mut self.players[idx];
        let Some(hand_idx) = player.hand.iter().position(|card| card.id == hand_card) else {
            return Err(GameError::reference(format!(
                "card {hand_card} is not in hand"
            )));
        };
        let Some(side_idx) = player
            .sideboard
            .iter()
            .position(|card| card.id == sideboard_card)
        else {
            return Err(GameError::reference(format!(
                "card {sideboard_card} is not in the sideboard"
            )));
        };
        std::mem::swap(&mut player.hand[hand_idx], &mut player.sideboard[side_idx]);
        player.build_ready = false;
        Ok(())
    }

    pub(super) fn build_ready(&mut self, idx: usize, basics: &[String]) -> GameResult<()> {
        let hand_size = self.config.hand_size;
        let num_basics = self.config.num_basics;
        let player = &mut self.players[idx];

        if player.hand.len() != hand_size {
            return Err(GameError::invariant(format!(
                "hand must hold exactly {hand_size} cards, it holds {}",
                player.hand.len()
            )));
        }
        if basics.len() != num_basics {
            return Err(GameError::invariant(format!(
                "choose exactly {num_basics} basic lands"
            )));
        }
        let mut chosen = Vec::with_capacity(basics.len());
        for raw in basics {
            let Some(land) = BasicLand::parse(raw) else {
                return Err(GameError::reference(format!("{raw} is not a basic land")));
            };
            chosen.push(land);
        }

        player.chosen_basics = chosen;
        player.build_ready = true;
        debug!(match_id = %self.match_id, player = %player.name, "build ready");
        self.maybe_start_pairing()
    }

    pub(super) fn build_unready(&mut self, idx: usize) -> GameResult<()> {
        let player = &mut self.players[idx];
        player.build_ready = false;
        player.chosen_basics.clear();
        Ok(())
    }

    /// Links an owned, unapplied upgrade to a card in hand or sideboard. Used
    /// from both build and reward.
    pub(super) fn apply_upgrade(
        &mut self,
        idx: usize,
        upgrade: CardId,
        target: CardId,
    ) -> GameResult<()> {
        let player = &mut self.players[idx];
        if !player.owns_card(target) {
            return Err(GameError::reference(format!(
                "card {target} is not in hand or sideboard"
            )));
        }
        let Some(owned) = player.upgrades.iter_mut().find(|card| card.id == upgrade) else {
            return Err(GameError::reference(format!(
                "upgrade {upgrade} is not owned"
            )));
        };
        if owned.upgrade_target.is_some() {
            return Err(GameError::invariant(format!(
                "upgrade {upgrade} is already applied"
            )));
        }
        owned.upgrade_target = Some(target);
        player.build_ready = false;
        Ok(())
    }

    pub(super) fn set_companion(&mut self, idx: usize, card: CardId) -> GameResult<()> {
        let player = &mut self.players[idx];
        if player.command_zone.iter().any(|owned| !owned.is_vanguard()) {
            return Err(GameError::invariant("a companion is already set"));
        }
        let Some(companion) = take_card(&mut player.sideboard, card) else {
            return Err(GameError::reference(format!(
                "card {card} is not in the sideboard"
            )));
        };
        player.command_zone.push(companion);
        player.build_ready = false;
        Ok(())
    }

    pub(super) fn remove_companion(&mut self, idx: usize) -> GameResult<()> {
        let player = &mut self.players[idx];
        let Some(position) = player
            .command_zone
            .iter()
            .position(|owned| !owned.is_vanguard())
        else {
            return Err(GameError::reference("no companion is set"));
        };
        let companion = player.command_zone.remove(position);
        player.sideboard.push(companion);
        player.build_ready = false;
        Ok(())
    }

    /// Every live player is in build at the same round, ready, and nobody is
    /// still fighting.
    pub fn all_ready(&self) -> bool {
        if !self.battles.is_empty() {
            return false;
        }
        let mut live = self.players.iter().filter(|player| player.is_live());
        let Some(first) = live.next() else {
            return false;
        };
        let key = first.round_key();
        std::iter::once(first)
            .chain(live)
            .all(|player| {
                player.phase() == Phase::Build && player.build_ready && player.round_key() == key
            })
    }

    /// Normal pairing waits while a sudden-death bout is pending.
    pub(super) fn maybe_start_pairing(&mut self) -> GameResult<()> {
        if self.ended {
            return Ok(());
        }
        if self.sudden_death_pending() {
            return self.maybe_start_sudden_death_bout();
        }
        if !self.all_ready() {
            return Ok(());
        }
        self.start_pairing()
    }
}
