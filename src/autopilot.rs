//! Scripted seat driver for headless matches. Picks one legal action at a
//! time from the public game state, the way a lazy but honest player would.

use tracing::debug;

use crate::cards::{BasicLand, Card};
use crate::engine::Game;
use crate::error::{GameError, GameResult};
use crate::participants::Phase;
use crate::protocol::{GameAction, ResultClaim};
use crate::zones::ZoneName;

/// Next action for `name`, or `None` when they have to wait on someone else.
pub fn next_action(game: &Game, name: &str) -> Option<GameAction> {
    let player = game.player(name)?;
    match player.phase() {
        Phase::Draft => Some(draft_action(game, name, &player.sideboard)),
        Phase::Build => build_action(game, name),
        Phase::Battle => {
            let battle = game.battle_for(name)?;
            if battle.results.contains_key(name) {
                return None;
            }
            // Both seats agree on the coin-flip winner.
            Some(GameAction::BattleSubmitResult {
                claim: ResultClaim::Winner(battle.coin_flip_winner.clone()),
            })
        }
        Phase::Reward => {
            if player.pending_upgrade_pick.is_none() {
                if let Some(offer) = player.upgrade_offers.first() {
                    return Some(GameAction::RewardPickUpgrade { upgrade: offer.id });
                }
            }
            Some(GameAction::RewardDone)
        }
        Phase::AwaitingElimination | Phase::Eliminated | Phase::Winner | Phase::GameOver => None,
    }
}

fn draft_action(game: &Game, name: &str, sideboard: &[Card]) -> GameAction {
    let best_in_pack = game
        .held_pack(name)
        .and_then(|pack| {
            pack.iter()
                .filter(|card| !card.is_upgrade())
                .max_by(|a, b| a.elo.total_cmp(&b.elo))
        });
    let worst_owned = sideboard.iter().min_by(|a, b| a.elo.total_cmp(&b.elo));
    match (best_in_pack, worst_owned) {
        (Some(pick), Some(drop)) if pick.elo > drop.elo => GameAction::DraftSwap {
            pack_card: pick.id,
            own_card: drop.id,
            destination: ZoneName::Sideboard,
        },
        _ => GameAction::DraftDone,
    }
}

fn build_action(game: &Game, name: &str) -> Option<GameAction> {
    let player = game.player(name)?;
    let hand_size = game.config.hand_size;

    if player.hand.len() < hand_size {
        let best = player
            .sideboard
            .iter()
            .max_by(|a, b| a.elo.total_cmp(&b.elo))?;
        return Some(GameAction::BuildMove {
            card: best.id,
            from: ZoneName::Sideboard,
            to: ZoneName::Hand,
        });
    }
    if player.hand.len() > hand_size {
        let worst = player
            .hand
            .iter()
            .min_by(|a, b| a.elo.total_cmp(&b.elo))?;
        return Some(GameAction::BuildMove {
            card: worst.id,
            from: ZoneName::Hand,
            to: ZoneName::Sideboard,
        });
    }
    if player.build_ready {
        return None;
    }
    if let (Some(upgrade), Some(target)) = (
        player
            .upgrades
            .iter()
            .find(|upgrade| upgrade.upgrade_target.is_none()),
        player.hand.first(),
    ) {
        return Some(GameAction::BuildApplyUpgrade {
            upgrade: upgrade.id,
            target: target.id,
        });
    }
    Some(GameAction::BuildReady {
        basics: vec![BasicLand::Wastes.display_name().to_string(); game.config.num_basics],
    })
}

/// Drives every seat until the match ends. Returns the number of actions
/// applied. A full pass in which nobody can act is reported as fatal.
pub fn run_to_completion(game: &mut Game, max_actions: usize) -> GameResult<usize> {
    let names: Vec<String> = game
        .players()
        .iter()
        .map(|player| player.name.clone())
        .collect();
    let mut applied = 0usize;

    while !game.is_ended() {
        let mut progressed = false;
        for name in &names {
            while let Some(action) = next_action(game, name) {
                debug!(
                    match_id = %game.match_id,
                    player = %name,
                    action = action.name(),
                    "autopilot"
                );
                game.apply_action(name, action)?;
                applied += 1;
                progressed = true;
                if applied >= max_actions {
                    return Err(GameError::Fatal(format!(
                        "match did not finish within {max_actions} actions"
                    )));
                }
                if game.is_ended() {
                    return Ok(applied);
                }
            }
        }
        if !progressed {
            return Err(GameError::Fatal("no seat can act".to_string()));
        }
    }
    Ok(applied)
}
