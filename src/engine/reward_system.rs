use super::*;
use crate::constants::hand_size_damage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Outcome {
    Won,
    Lost,
    Draw,
    /// Nobody was available to fight.
    Bye,
}

/// Poison a side deals when it wins: one plus its applied upgrades, or the
/// hand-size Fibonacci value when upgrades are off.
pub fn poison_damage(config: &GameConfig, applied_upgrades: usize, hand_size: usize) -> u32 {
    if config.use_upgrades {
        1 + applied_upgrades as u32
    } else {
        hand_size_damage(hand_size)
    }
}

impl Game {
    /// Moves a player out of battle into reward and grants what the outcome
    /// earns. Poison has already been applied by then.
    pub(super) fn enter_reward(&mut self, idx: usize, outcome: Outcome) -> GameResult<()> {
        self.players[idx].set_phase(Phase::Reward)?;
        let closes_stage = self.config.closes_stage(self.players[idx].round);

        if matches!(outcome, Outcome::Won | Outcome::Draw) {
            let max_treasures = self.config.max_treasures;
            let player = &mut self.players[idx];
            player.treasures = (player.treasures + 1).min(max_treasures);
            if closes_stage {
                player.vanquishers += 1;
            } else {
                match self.draw_reward_card() {
                    Some(card) => self.players[idx].sideboard.push(card),
                    None => {
                        debug!(
                            match_id = %self.match_id,
                            player = %self.players[idx].name,
                            "pool empty, no reward card"
                        )
                    }
                }
            }
        }

        let offers = if self.config.use_upgrades && closes_stage {
            self.battler
                .sample_upgrades(self.config.upgrade_choices, &mut self.rng)
        } else {
            Vec::new()
        };
        let player = &mut self.players[idx];
        player.upgrade_offers = offers;
        player.pending_upgrade_pick = None;
        Ok(())
    }

    /// One random card from the pool, or from an undealt pack when a draft
    /// segment is holding the pool.
    fn draw_reward_card(&mut self) -> Option<Card> {
        if let Some(card) = self.battler.draw_random(&mut self.rng) {
            return Some(card);
        }
        self.draft.as_mut()?.take_random_undealt(&mut self.rng)
    }

    pub(super) fn reward_pick_upgrade(&mut self, idx: usize, upgrade: CardId) -> GameResult<()> {
        let player = &mut self.players[idx];
        let Some(offer) = player
            .upgrade_offers
            .iter()
            .find(|offer| offer.id == upgrade)
        else {
            return Err(GameError::reference(format!(
                "upgrade {upgrade} was not offered"
            )));
        };
        player.pending_upgrade_pick = Some(offer.clone());
        Ok(())
    }

    pub(super) fn reward_done(&mut self, idx: usize) -> GameResult<()> {
        let closes_stage = self.config.closes_stage(self.players[idx].round);
        let player = &self.players[idx];
        if closes_stage
            && self.config.use_upgrades
            && !player.upgrade_offers.is_empty()
            && player.pending_upgrade_pick.is_none()
        {
            return Err(GameError::invariant(
                "pick an upgrade before leaving the reward phase",
            ));
        }

        let picked = if closes_stage {
            self.players[idx]
                .pending_upgrade_pick
                .take()
                .map(|template| self.ids.copy_of(&template))
        } else {
            None
        };

        let player = &mut self.players[idx];
        if let Some(upgrade) = picked {
            player.upgrades.push(upgrade);
        }
        player.upgrade_offers.clear();
        player.pending_upgrade_pick = None;
        if closes_stage {
            player.stage += 1;
            player.round = 1;
        } else {
            player.round += 1;
        }
        player.set_phase(Phase::Draft)?;
        debug!(
            match_id = %self.match_id,
            player = %player.name,
            stage = player.stage,
            round = player.round,
            "round advanced"
        );
        self.deal_into_draft(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn config_with_stage_of(rounds: u32) -> GameConfig {
        GameConfig {
            rounds_per_stage: rounds,
            ..GameConfig::default()
        }
    }

    fn finish_round(game: &mut Game, winner: &str, loser: &str) {
        ready_up(game, winner);
        ready_up(game, loser);
        submit(game, winner, winner);
        submit(game, loser, winner);
    }

    #[test]
    fn damage_formula_matches_both_modes() {
        let fib = GameConfig {
            use_upgrades: false,
            ..GameConfig::default()
        };
        assert_eq!(poison_damage(&fib, 4, 5), 3);
        assert_eq!(poison_damage(&GameConfig::default(), 2, 5), 3);
        assert_eq!(poison_damage(&GameConfig::default(), 0, 5), 1);
    }

    #[test]
    fn winner_gets_treasure_and_a_card() {
        let mut game = new_game(2, config_with_stage_of(3), 6);
        finish_round(&mut game, "p1", "p2");
        let winner = game.player("p1").expect("p1");
        assert_eq!(winner.phase(), Phase::Reward);
        assert_eq!(winner.treasures, 2);
        assert_eq!(winner.sideboard.len(), 11);
        assert_eq!(winner.vanquishers, 0);
        let loser = game.player("p2").expect("p2");
        assert_eq!(loser.treasures, 1);
        assert_eq!(loser.sideboard.len(), 10);
    }

    #[test]
    fn reward_done_advances_the_round_and_redeals() {
        let mut game = new_game(2, config_with_stage_of(3), 6);
        finish_round(&mut game, "p1", "p2");
        game.apply_action("p1", GameAction::RewardDone)
            .expect("done");
        let player = game.player("p1").expect("p1");
        assert_eq!(player.phase(), Phase::Draft);
        assert_eq!(player.round_key(), (1, 2));
        assert!(game.held_pack("p1").is_some());
    }

    #[test]
    fn closing_a_stage_grants_a_vanquisher_and_requires_an_upgrade() {
        let mut game = new_game(2, config_with_stage_of(1), 6);
        finish_round(&mut game, "p1", "p2");
        let winner = game.player("p1").expect("p1");
        assert_eq!(winner.vanquishers, 1);
        assert_eq!(winner.sideboard.len(), 10);
        assert_eq!(winner.upgrade_offers.len(), 3);

        let error = game
            .apply_action("p1", GameAction::RewardDone)
            .expect_err("must pick");
        assert!(matches!(error, GameError::InvariantViolation(_)));

        let offered = game.player("p1").expect("p1").upgrade_offers[1].clone();
        game.apply_action("p1", GameAction::RewardPickUpgrade { upgrade: offered.id })
            .expect("pick");
        game.apply_action("p1", GameAction::RewardDone)
            .expect("done");

        let player = game.player("p1").expect("p1");
        assert_eq!(player.round_key(), (2, 1));
        assert_eq!(player.upgrades.len(), 1);
        assert_eq!(player.upgrades[0].name, offered.name);
        assert_ne!(player.upgrades[0].id, offered.id);
        assert!(player.upgrade_offers.is_empty());
    }

    #[test]
    fn picking_an_unoffered_upgrade_fails() {
        let mut game = new_game(2, config_with_stage_of(1), 6);
        finish_round(&mut game, "p1", "p2");
        assert!(matches!(
            game.apply_action("p2", GameAction::RewardPickUpgrade { upgrade: 1 }),
            Err(GameError::InvalidReference(_))
        ));
    }

    #[test]
    fn stage_close_without_upgrades_needs_no_pick() {
        let config = GameConfig {
            use_upgrades: false,
            ..config_with_stage_of(1)
        };
        let mut game = new_game(2, config, 6);
        finish_round(&mut game, "p1", "p2");
        assert!(game.player("p1").expect("p1").upgrade_offers.is_empty());
        game.apply_action("p1", GameAction::RewardDone)
            .expect("done");
        assert_eq!(game.player("p1").expect("p1").round_key(), (2, 1));
    }

    #[test]
    fn empty_pool_grants_no_card_without_failing() {
        let mut game = new_game(2, config_with_stage_of(3), 6);
        ready_up(&mut game, "p1");
        ready_up(&mut game, "p2");
        game.battler.take_all();
        submit(&mut game, "p1", "p1");
        submit(&mut game, "p2", "p1");
        let winner = game.player("p1").expect("p1");
        assert_eq!(winner.phase(), Phase::Reward);
        assert_eq!(winner.sideboard.len(), 10);
        assert_eq!(winner.treasures, 2);
    }
}
