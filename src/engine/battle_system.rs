use super::*;

#[derive(Clone, Debug)]
pub struct BattleSide {
    pub name: String,
    pub kind: ParticipantKind,
    pub zones: Zones,
    /// Poison this side deals if it wins, fixed when the battle starts.
    pub damage: u32,
}

#[derive(Clone, Debug)]
pub struct Battle {
    pub id: u64,
    pub sides: [BattleSide; 2],
    pub coin_flip_winner: String,
    pub results: BTreeMap<String, ResultClaim>,
    pub sudden_death: bool,
    pub key: RoundKey,
}

impl Battle {
    pub fn side_index(&self, name: &str) -> Option<usize> {
        self.sides.iter().position(|side| side.name == name)
    }

    pub fn involves(&self, name: &str) -> bool {
        self.side_index(name).is_some()
    }

    /// Both sides have a claim on file and the claims match.
    pub fn results_agreed(&self) -> Option<&ResultClaim> {
        let first = self.results.get(&self.sides[0].name)?;
        let second = self.results.get(&self.sides[1].name)?;
        (first == second).then_some(first)
    }
}

/// The ghost fights under its own name so the eliminated player it was
/// frozen from is never mistaken for a combatant.
pub fn ghost_side_name(name: &str) -> String {
    format!("{name} (ghost)")
}

impl Game {
    pub(super) fn start_battle(
        &mut self,
        idx: usize,
        opponent: Opponent,
        sudden_death: bool,
    ) -> GameResult<()> {
        let me = &self.players[idx];
        if !sudden_death {
            me.require_phase(Phase::Battle)?;
        }
        if self.in_active_battle(&me.name) {
            return Err(GameError::invariant(format!("{} is already fighting", me.name)));
        }
        let key = me.round_key();

        let (opponent_name, opponent_poison) = match opponent {
            Opponent::Human(other) => {
                if other == idx {
                    return Err(GameError::invariant("a player cannot fight themselves"));
                }
                let Some(them) = self.players.get(other) else {
                    return Err(GameError::reference(format!("no player at seat {other}")));
                };
                if !sudden_death {
                    them.require_phase(Phase::Battle)?;
                }
                (them.name.clone(), them.poison)
            }
            Opponent::Bot(bot_idx) => {
                let Some(bot) = self.bots.get(bot_idx) else {
                    return Err(GameError::reference(format!("no bot at seat {bot_idx}")));
                };
                if bot.eliminated {
                    return Err(GameError::invariant(format!("{} is out", bot.name)));
                }
                if bot_system::bot_snapshot_at(bot, key).is_none() {
                    return Err(GameError::reference(format!(
                        "{} has no recorded rounds",
                        bot.name
                    )));
                }
                (bot.name.clone(), bot.poison)
            }
            Opponent::Ghost => {
                let Some(ghost) = self.ghost.as_ref() else {
                    return Err(GameError::reference("there is no ghost"));
                };
                (ghost_side_name(&ghost.name), ghost.poison)
            }
        };
        if self.in_active_battle(&opponent_name) {
            return Err(GameError::invariant(format!(
                "{opponent_name} is already fighting"
            )));
        }

        let my_side = self.human_side(idx);
        let their_side = match opponent {
            Opponent::Human(other) => self.human_side(other),
            Opponent::Bot(bot_idx) => {
                let snapshot = bot_system::bot_snapshot_at(&self.bots[bot_idx], key)
                    .cloned()
                    .ok_or_else(|| GameError::Fatal("bot snapshot vanished".to_string()))?;
                let bot_name = self.bots[bot_idx].name.clone();
                self.static_side(&bot_name, &snapshot, ParticipantKind::Bot)
            }
            Opponent::Ghost => {
                let ghost = self
                    .ghost
                    .clone()
                    .ok_or_else(|| GameError::Fatal("ghost vanished".to_string()))?;
                self.static_side(&ghost_side_name(&ghost.name), &ghost, ParticipantKind::Ghost)
            }
        };

        let my_poison = self.players[idx].poison;
        let coin_flip_winner = if my_poison > opponent_poison {
            my_side.name.clone()
        } else if opponent_poison > my_poison {
            their_side.name.clone()
        } else if self.rng.coin_flip() {
            my_side.name.clone()
        } else {
            their_side.name.clone()
        };

        self.players[idx].last_opponent = Some(opponent_name.clone());
        if let Opponent::Human(other) = opponent {
            self.players[other].last_opponent = Some(my_side.name.clone());
        }

        let id = self.next_battle_id;
        self.next_battle_id += 1;
        info!(
            match_id = %self.match_id,
            battle = id,
            player = %my_side.name,
            opponent = %opponent_name,
            stage = key.0,
            round = key.1,
            sudden_death,
            "battle started"
        );
        self.battles.push(Battle {
            id,
            sides: [my_side, their_side],
            coin_flip_winner,
            results: BTreeMap::new(),
            sudden_death,
            key,
        });
        Ok(())
    }

    /// Records the player's round snapshot and builds their side of a battle.
    /// A sudden-death bout keeps the snapshot taken for the round's first
    /// battle.
    fn human_side(&mut self, idx: usize) -> BattleSide {
        let life = self.config.starting_life;
        let player = &mut self.players[idx];
        let key = player.round_key();
        if !player.history.contains_key(&key) {
            let snapshot = player.snapshot();
            player.history.insert(key, snapshot);
        }
        player.pre_battle_hand = player.hand.iter().map(|card| card.id).collect();
        player.pre_battle_basics = player.chosen_basics.clone();
        player.build_ready = false;

        let damage = poison_damage(
            &self.config,
            player.applied_upgrade_count(),
            player.hand.len(),
        );
        let zones = Zones::assemble(
            ZoneSource {
                hand: &player.hand,
                sideboard: &player.sideboard,
                upgrades: &player.upgrades,
                command_zone: &player.command_zone,
                basics: &player.chosen_basics,
                treasures: player.treasures,
            },
            life,
            &mut self.ids,
        );
        BattleSide {
            name: player.name.clone(),
            kind: ParticipantKind::Human,
            zones,
            damage,
        }
    }

    fn static_side(
        &mut self,
        name: &str,
        snapshot: &StaticOpponent,
        kind: ParticipantKind,
    ) -> BattleSide {
        let zones = Zones::assemble(
            ZoneSource {
                hand: &snapshot.hand,
                sideboard: &snapshot.sideboard,
                upgrades: &snapshot.upgrades,
                command_zone: &snapshot.command_zone,
                basics: &snapshot.basics,
                treasures: snapshot.treasures,
            },
            self.config.starting_life,
            &mut self.ids,
        );
        BattleSide {
            name: name.to_string(),
            kind,
            zones,
            damage: poison_damage(
                &self.config,
                snapshot.applied_upgrade_count(),
                snapshot.hand.len(),
            ),
        }
    }

    fn battle_side_mut(&mut self, name: &str) -> GameResult<&mut BattleSide> {
        let Some(battle) = self.battles.iter_mut().find(|battle| battle.involves(name)) else {
            return Err(GameError::reference(format!("{name} is not in a battle")));
        };
        let side = battle
            .side_index(name)
            .ok_or_else(|| GameError::Fatal(format!("battle lost side {name}")))?;
        Ok(&mut battle.sides[side])
    }

    pub(super) fn battle_move(
        &mut self,
        idx: usize,
        card: CardId,
        from: ZoneName,
        to: ZoneName,
    ) -> GameResult<()> {
        let name = self.players[idx].name.clone();
        self.battle_side_mut(&name)?.zones.move_card(card, from, to)
    }

    pub(super) fn update_card_state(
        &mut self,
        idx: usize,
        card: CardId,
        tapped: Option<bool>,
        flipped: Option<bool>,
        counters: Option<i32>,
    ) -> GameResult<()> {
        let name = self.players[idx].name.clone();
        let zones = &mut self.battle_side_mut(&name)?.zones;
        let mut state: CardState = zones.card_states.get(&card).copied().unwrap_or_default();
        if let Some(tapped) = tapped {
            state.tapped = tapped;
        }
        if let Some(flipped) = flipped {
            state.flipped = flipped;
        }
        if let Some(counters) = counters {
            state.counters = counters;
        }
        zones.set_card_state(card, state)
    }

    pub(super) fn update_life(&mut self, idx: usize, life: i32) -> GameResult<()> {
        let name = self.players[idx].name.clone();
        self.battle_side_mut(&name)?.zones.life = life;
        Ok(())
    }

    pub(super) fn submit_result(&mut self, idx: usize, claim: ResultClaim) -> GameResult<()> {
        let name = self.players[idx].name.clone();
        let Some(battle) = self.battles.iter_mut().find(|battle| battle.involves(&name)) else {
            return Err(GameError::reference(format!("{name} is not in a battle")));
        };
        match &claim {
            ResultClaim::Winner(winner) if !battle.involves(winner) => {
                return Err(GameError::reference(format!(
                    "{winner} is not part of this battle"
                )));
            }
            ResultClaim::Draw if battle.sudden_death => {
                return Err(GameError::invariant("sudden death cannot end in a draw"));
            }
            _ => {}
        }

        let mine = battle
            .side_index(&name)
            .ok_or_else(|| GameError::Fatal(format!("battle lost side {name}")))?;
        let theirs = &battle.sides[1 - mine];
        if theirs.kind != ParticipantKind::Human {
            battle.results.insert(theirs.name.clone(), claim.clone());
        }
        battle.results.insert(name.clone(), claim);
        debug!(match_id = %self.match_id, battle = battle.id, player = %name, "result submitted");

        if battle.results_agreed().is_some() {
            let id = battle.id;
            self.end_battle(id)?;
        }
        Ok(())
    }

    pub(super) fn end_battle(&mut self, battle_id: u64) -> GameResult<()> {
        let Some(position) = self.battles.iter().position(|battle| battle.id == battle_id) else {
            return Err(GameError::Fatal(format!("battle {battle_id} is not active")));
        };
        let Some(agreed) = self.battles[position].results_agreed().cloned() else {
            return Err(GameError::invariant("results are not agreed yet"));
        };
        let winner_side = match &agreed {
            ResultClaim::Winner(winner) => Some(
                self.battles[position]
                    .side_index(winner)
                    .ok_or_else(|| GameError::Fatal(format!("{winner} left the battle")))?,
            ),
            ResultClaim::Draw => None,
        };
        let battle = self.battles.remove(position);

        for (side_idx, side) in battle.sides.iter().enumerate() {
            let other = &battle.sides[1 - side_idx];
            let poison = match winner_side {
                Some(winner) if winner == side_idx => 0,
                _ => other.damage,
            };
            let outcome = match winner_side {
                Some(winner) if winner == side_idx => Outcome::Won,
                Some(_) => Outcome::Lost,
                None => Outcome::Draw,
            };
            match side.kind {
                ParticipantKind::Human => {
                    self.settle_human_side(side, other, poison, outcome, battle.sudden_death)?
                }
                ParticipantKind::Bot => {
                    if let Some(bot_idx) = self.bot_index(&side.name) {
                        self.apply_bot_poison(bot_idx, poison);
                        if battle.sudden_death && outcome == Outcome::Won {
                            self.bots[bot_idx].in_sudden_death = false;
                        }
                    }
                }
                ParticipantKind::Ghost => {}
            }
        }

        info!(
            match_id = %self.match_id,
            battle = battle.id,
            result = agreed.as_wire(),
            stage = battle.key.0,
            round = battle.key.1,
            "battle ended"
        );

        if self.battles.is_empty() {
            self.resolve_eliminations()?;
        }
        Ok(())
    }

    fn settle_human_side(
        &mut self,
        side: &BattleSide,
        other: &BattleSide,
        poison: u32,
        outcome: Outcome,
        sudden_death: bool,
    ) -> GameResult<()> {
        let idx = self.player_index(&side.name)?;
        let folded = side.zones.fold(self.config.max_treasures);
        let threshold = self.config.poison_to_lose;

        let player = &mut self.players[idx];
        player.hand.clear();
        player.sideboard = folded.sideboard;
        player.upgrades = folded.upgrades;
        player.command_zone = folded.command_zone;
        player.treasures = folded.treasures;
        player.recently_revealed = other.zones.revealed_cards();
        player.poison = player.poison.saturating_add(poison);
        if sudden_death && outcome == Outcome::Won {
            player.in_sudden_death = false;
        }

        if player.poison >= threshold {
            info!(
                match_id = %self.match_id,
                player = %player.name,
                poison = player.poison,
                "awaiting elimination"
            );
            player.set_phase(Phase::AwaitingElimination)
        } else {
            self.enter_reward(idx, outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::cards::{BasicLand, CardKind};

    fn paired(config: GameConfig, seed: u32) -> Game {
        let mut game = new_game(2, config, seed);
        ready_up(&mut game, "p1");
        ready_up(&mut game, "p2");
        assert_eq!(game.battles().len(), 1);
        game
    }

    #[test]
    fn battlefield_starts_with_lands_and_treasure() {
        let mut game = new_game(2, GameConfig::default(), 12);
        ready_up(&mut game, "p1");
        player_mut(&mut game, "p2").treasures = 2;
        game.apply_action("p2", GameAction::DraftDone)
            .expect("draft done");
        let ids: Vec<CardId> = game.player("p2").expect("p2").sideboard[..5]
            .iter()
            .map(|card| card.id)
            .collect();
        for card in ids {
            game.apply_action(
                "p2",
                GameAction::BuildMove {
                    card,
                    from: ZoneName::Sideboard,
                    to: ZoneName::Hand,
                },
            )
            .expect("move");
        }
        game.apply_action(
            "p2",
            GameAction::BuildReady {
                basics: vec!["Island".to_string(); 3],
            },
        )
        .expect("ready");

        let battle = game.battle_for("p2").expect("paired");
        let side = &battle.sides[battle.side_index("p2").expect("side")];
        assert_eq!(side.zones.battlefield.len(), 5);
        assert_eq!(side.zones.treasure_count(), 2);
        assert!(side
            .zones
            .battlefield
            .iter()
            .filter(|card| card.is_basic())
            .all(|card| card.kind == CardKind::Basic(BasicLand::Island)));
        let other = &battle.sides[battle.side_index("p1").expect("side")];
        assert_eq!(other.zones.battlefield.len(), 4);
    }

    #[test]
    fn coin_flip_favours_the_side_with_more_poison() {
        let mut game = new_game(2, GameConfig::default(), 12);
        player_mut(&mut game, "p2").poison = 4;
        ready_up(&mut game, "p1");
        ready_up(&mut game, "p2");
        assert_eq!(game.battle_for("p1").expect("battle").coin_flip_winner, "p2");
    }

    #[test]
    fn two_humans_must_agree() {
        let mut game = paired(GameConfig::default(), 3);
        submit(&mut game, "p1", "p1");
        assert_eq!(game.battles().len(), 1);
        submit(&mut game, "p2", "p2");
        assert_eq!(game.battles().len(), 1);
        submit(&mut game, "p2", "p1");
        assert!(game.battles().is_empty());

        let loser = game.player("p2").expect("p2");
        assert_eq!(loser.poison, 1);
        assert_eq!(loser.phase(), Phase::Reward);
        assert!(loser.hand.is_empty());
        assert_eq!(loser.sideboard.len(), 10);
        let winner = game.player("p1").expect("p1");
        assert_eq!(winner.poison, 0);
        assert_eq!(winner.phase(), Phase::Reward);
    }

    #[test]
    fn draw_applies_each_sides_damage() {
        let config = GameConfig {
            use_upgrades: false,
            ..GameConfig::default()
        };
        let mut game = paired(config, 3);
        submit(&mut game, "p1", "draw");
        submit(&mut game, "p2", "draw");
        for name in ["p1", "p2"] {
            assert_eq!(game.player(name).expect("player").poison, 3);
        }
    }

    #[test]
    fn claims_must_name_a_combatant() {
        let mut game = paired(GameConfig::default(), 3);
        let error = game
            .apply_action(
                "p1",
                GameAction::BattleSubmitResult {
                    claim: ResultClaim::Winner("mallory".to_string()),
                },
            )
            .expect_err("not in battle");
        assert!(matches!(error, GameError::InvalidReference(_)));
    }

    #[test]
    fn moves_and_table_state_stay_on_the_acting_side() {
        let mut game = paired(GameConfig::default(), 3);
        let card = game.player("p1").expect("p1").hand[0].id;
        game.apply_action(
            "p1",
            GameAction::BattleMove {
                card,
                from: ZoneName::Hand,
                to: ZoneName::Battlefield,
            },
        )
        .expect("cast");
        game.apply_action(
            "p1",
            GameAction::BattleUpdateCardState {
                card,
                tapped: Some(true),
                flipped: None,
                counters: Some(2),
            },
        )
        .expect("tap");
        game.apply_action("p1", GameAction::BattleUpdateLife { life: 17 })
            .expect("life");
        assert!(game
            .apply_action(
                "p1",
                GameAction::BattleMove {
                    card,
                    from: ZoneName::Hand,
                    to: ZoneName::Exile,
                },
            )
            .is_err());

        let battle = game.battle_for("p1").expect("battle");
        let side = &battle.sides[battle.side_index("p1").expect("side")];
        assert_eq!(side.zones.life, 17);
        let state = side.zones.card_states.get(&card).expect("state");
        assert!(state.tapped && !state.flipped);
        assert_eq!(state.counters, 2);

        submit(&mut game, "p1", "p2");
        submit(&mut game, "p2", "p2");
        let p1 = game.player("p1").expect("p1");
        assert!(p1.sideboard.iter().any(|owned| owned.id == card));
        let p2 = game.player("p2").expect("p2");
        assert!(p2.recently_revealed.iter().any(|seen| seen.id == card));
    }

    #[test]
    fn treasure_is_capped_when_folding_back() {
        let mut game = new_game(2, GameConfig::default(), 3);
        player_mut(&mut game, "p1").treasures = 10;
        ready_up(&mut game, "p1");
        ready_up(&mut game, "p2");
        submit(&mut game, "p1", "p2");
        submit(&mut game, "p2", "p2");
        assert_eq!(game.player("p1").expect("p1").treasures, 5);
    }

    #[test]
    fn one_submission_is_enough_against_a_bot() {
        let mut game = Game::new(
            MatchId::new("m"),
            names(1),
            vec![bot("hist", 0)],
            &crate::cards::demo_catalog(120),
            GameConfig::default(),
            4,
        )
        .expect("game");
        ready_up(&mut game, "p1");
        let bot_name = game.bots()[0].name.clone();
        assert!(game.battle_for(&bot_name).is_some());
        submit(&mut game, "p1", "p1");
        assert!(game.battles().is_empty());
        assert_eq!(game.bots()[0].poison, 1);
    }

    #[test]
    fn losing_to_lethal_waits_for_elimination() {
        let mut game = new_game(4, GameConfig::default(), 3);
        for name in ["p1", "p2", "p3", "p4"] {
            player_mut(&mut game, name).poison = 9;
            ready_up(&mut game, name);
        }
        let opponent = game
            .battle_for("p1")
            .and_then(|battle| battle.sides.iter().find(|side| side.name != "p1"))
            .map(|side| side.name.clone())
            .expect("paired");
        submit(&mut game, "p1", &opponent);
        submit(&mut game, &opponent, &opponent);
        assert_eq!(
            game.player("p1").expect("p1").phase(),
            Phase::AwaitingElimination
        );
        assert_eq!(game.player(&opponent).expect("opponent").phase(), Phase::Reward);
    }
}
