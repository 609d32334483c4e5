use super::*;

/// A participant that can be knocked out: a human seat or a bot seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Seat {
    Human(usize),
    Bot(usize),
}

impl Game {
    fn seat_poison(&self, seat: Seat) -> u32 {
        match seat {
            Seat::Human(idx) => self.players[idx].poison,
            Seat::Bot(idx) => self.bots[idx].poison,
        }
    }

    fn seat_name(&self, seat: Seat) -> &str {
        match seat {
            Seat::Human(idx) => &self.players[idx].name,
            Seat::Bot(idx) => &self.bots[idx].name,
        }
    }

    fn dying_seats(&self) -> Vec<Seat> {
        let threshold = self.config.poison_to_lose;
        let humans = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, player)| player.is_live() && player.poison >= threshold)
            .map(|(idx, _)| Seat::Human(idx));
        let bots = self
            .bots
            .iter()
            .enumerate()
            .filter(|(_, bot)| !bot.eliminated && bot.poison >= threshold)
            .map(|(idx, _)| Seat::Bot(idx));
        humans.chain(bots).collect()
    }

    /// Runs once every battle of the round window has ended. Knocks out
    /// everyone at or over the threshold, or starts a sudden-death bout when
    /// that would leave fewer than two participants.
    pub(super) fn resolve_eliminations(&mut self) -> GameResult<()> {
        if self.ended || !self.battles.is_empty() {
            return Ok(());
        }
        let mut dying = self.dying_seats();
        if !dying.is_empty() {
            let survivors = self.live_count() - dying.len();
            if survivors < 2 && dying.len() >= 2 {
                return self.start_sudden_death(dying);
            }

            // worst poison takes the worst placement; shuffle breaks ties
            self.rng.shuffle(&mut dying);
            dying.sort_by_key(|seat| std::cmp::Reverse(self.seat_poison(*seat)));
            for seat in dying {
                self.eliminate(seat)?;
            }
        }

        self.check_game_end()?;
        self.maybe_start_pairing()
    }

    fn start_sudden_death(&mut self, mut dying: Vec<Seat>) -> GameResult<()> {
        self.rng.shuffle(&mut dying);
        dying.sort_by_key(|seat| self.seat_poison(*seat));
        let mut rest = dying.split_off(2);
        rest.reverse();
        for seat in rest {
            self.eliminate(seat)?;
        }

        let threshold = self.config.poison_to_lose;
        for seat in &dying {
            match *seat {
                Seat::Human(idx) => {
                    let player = &mut self.players[idx];
                    player.poison = threshold - 1;
                    player.in_sudden_death = true;
                    player.set_phase(Phase::Build)?;
                    player.restore_pre_battle_build();
                }
                Seat::Bot(idx) => {
                    let bot = &mut self.bots[idx];
                    bot.poison = threshold - 1;
                    bot.in_sudden_death = true;
                }
            }
        }
        info!(
            match_id = %self.match_id,
            first = %self.seat_name(dying[0]),
            second = %self.seat_name(dying[1]),
            "sudden death"
        );

        if let (Seat::Bot(a), Seat::Bot(b)) = (dying[0], dying[1]) {
            self.resolve_bot_duel(a, b);
            return self.resolve_eliminations();
        }
        Ok(())
    }

    pub(super) fn sudden_death_pending(&self) -> bool {
        self.players
            .iter()
            .any(|player| player.is_live() && player.in_sudden_death)
            || self
                .bots
                .iter()
                .any(|bot| !bot.eliminated && bot.in_sudden_death)
    }

    /// Starts the sudden-death bout once every human fighter has readied a
    /// build. The bout skips the pairing gate.
    pub(super) fn maybe_start_sudden_death_bout(&mut self) -> GameResult<()> {
        if self.battles.iter().any(|battle| battle.sudden_death) {
            return Ok(());
        }
        let fighters: Vec<usize> = (0..self.players.len())
            .filter(|idx| {
                let player = &self.players[*idx];
                player.is_live() && player.in_sudden_death
            })
            .collect();
        let waiting = fighters.iter().any(|idx| {
            let player = &self.players[*idx];
            player.phase() != Phase::Build || !player.build_ready
        });
        if waiting {
            return Ok(());
        }

        let opponent = match fighters.as_slice() {
            [_, second] => Opponent::Human(*second),
            [_] => {
                let Some(bot_idx) = self
                    .bots
                    .iter()
                    .position(|bot| !bot.eliminated && bot.in_sudden_death)
                else {
                    return Err(GameError::Fatal("sudden death lost its bot".to_string()));
                };
                Opponent::Bot(bot_idx)
            }
            _ => {
                return Err(GameError::Fatal(format!(
                    "sudden death has {} human fighters",
                    fighters.len()
                )))
            }
        };
        for idx in &fighters {
            self.players[*idx].set_phase(Phase::Battle)?;
        }
        self.start_battle(fighters[0], opponent, true)
    }

    fn eliminate(&mut self, seat: Seat) -> GameResult<()> {
        let live = self.live_count();
        if live == 0 {
            return Err(GameError::Fatal("eliminating with nobody left".to_string()));
        }
        let remaining = live - 1;
        let placement = live as u32;

        let frozen = match seat {
            Seat::Human(idx) => {
                let player = &mut self.players[idx];
                player.set_phase(Phase::Eliminated)?;
                player.placement = Some(placement);
                player.in_sudden_death = false;
                let mut frozen = player
                    .history
                    .values()
                    .next_back()
                    .cloned()
                    .unwrap_or_else(|| player.snapshot());
                frozen.poison = player.poison;
                self.history_outbox.push(HistoryRecord::Snapshots {
                    identity: player.name.clone(),
                    placement: Some(placement),
                    snapshots: player.history.clone(),
                });
                frozen
            }
            Seat::Bot(idx) => {
                let bot = &mut self.bots[idx];
                bot.eliminated = true;
                bot.placement = Some(placement);
                bot.in_sudden_death = false;
                let mut frozen = bot
                    .snapshots
                    .values()
                    .next_back()
                    .cloned()
                    .ok_or_else(|| GameError::Fatal(format!("{} has no snapshots", bot.name)))?;
                frozen.name = bot.name.clone();
                frozen.poison = bot.poison;
                frozen
            }
        };

        info!(
            match_id = %self.match_id,
            player = %frozen.name,
            placement,
            remaining,
            "eliminated"
        );
        self.ghost = (remaining % 2 == 1).then_some(frozen);
        Ok(())
    }

    /// Ends the match once at most one participant is left or no human is.
    pub(super) fn check_game_end(&mut self) -> GameResult<()> {
        if self.ended {
            return Ok(());
        }
        let live_humans: Vec<usize> = (0..self.players.len())
            .filter(|idx| self.players[*idx].is_live())
            .collect();
        if self.live_count() > 1 && !live_humans.is_empty() {
            return Ok(());
        }

        if let [survivor] = live_humans.as_slice() {
            let player = &mut self.players[*survivor];
            player.set_phase(Phase::Winner)?;
            player.placement = Some(1);
            self.winner = Some(player.name.clone());
            self.history_outbox.push(HistoryRecord::Snapshots {
                identity: player.name.clone(),
                placement: Some(1),
                snapshots: player.history.clone(),
            });
        } else {
            let mut standing: Vec<usize> = (0..self.bots.len())
                .filter(|idx| !self.bots[*idx].eliminated)
                .collect();
            standing.sort_by_key(|idx| self.bots[*idx].poison);
            for (rank, idx) in standing.into_iter().enumerate() {
                let bot = &mut self.bots[idx];
                bot.placement = Some(rank as u32 + 1);
                if rank == 0 {
                    self.winner = Some(bot.name.clone());
                }
            }
        }

        for player in &mut self.players {
            if player.phase() == Phase::Eliminated {
                player.set_phase(Phase::GameOver)?;
            }
        }
        self.ended = true;
        self.history_outbox.push(HistoryRecord::Finished {
            match_id: self.match_id.clone(),
            placements: self.placements(),
        });
        info!(
            match_id = %self.match_id,
            winner = self.winner.as_deref().unwrap_or("-"),
            "match finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use proptest::prelude::*;

    /// Puts one human in awaiting elimination at `poison` without a battle.
    fn doom(game: &mut Game, name: &str, poison: u32) {
        let player = player_mut(game, name);
        force_phase(player, Phase::Battle);
        player.poison = poison;
        player.set_phase(Phase::AwaitingElimination).expect("await");
    }

    fn with_bots(players: usize, bots: Vec<FakePlayer>) -> Game {
        let mut game = Game::new(
            MatchId::new("m"),
            names(players),
            bots,
            &crate::cards::demo_catalog(160),
            GameConfig::default(),
            17,
        )
        .expect("game");
        game.cleanup_draft();
        game
    }

    #[test]
    fn lethal_loss_with_three_others_leaves_a_ghost() {
        let config = GameConfig {
            use_upgrades: false,
            hand_size: 3,
            ..GameConfig::default()
        };
        let mut game = new_game(4, config, 19);
        player_mut(&mut game, "p1").poison = 9;
        for name in ["p1", "p2", "p3", "p4"] {
            ready_up(&mut game, name);
        }
        let battle = game.battle_for("p1").expect("paired");
        let theirs = &battle.sides[1 - battle.side_index("p1").expect("side")];
        assert_eq!(theirs.damage, 1);
        let opponent = theirs.name.clone();
        submit(&mut game, "p1", &opponent);
        submit(&mut game, &opponent, &opponent);
        assert_eq!(game.player("p1").expect("p1").poison, 10);

        let others: Vec<String> = game
            .battles()
            .iter()
            .flat_map(|battle| battle.sides.iter().map(|side| side.name.clone()))
            .collect();
        submit(&mut game, &others[0], &others[0]);
        submit(&mut game, &others[1], &others[0]);

        let p1 = game.player("p1").expect("p1");
        assert_eq!(p1.phase(), Phase::Eliminated);
        assert_eq!(p1.placement, Some(4));
        assert_eq!(game.live_count(), 3);
        let ghost = game.ghost().expect("odd count keeps a ghost");
        assert_eq!(ghost.name, "p1");
        assert_eq!(ghost.hand.len(), 3);
        assert!(game
            .drain_history()
            .iter()
            .any(|record| matches!(
                record,
                HistoryRecord::Snapshots { identity, .. } if identity == "p1"
            )));
    }

    #[test]
    fn even_remainder_clears_the_ghost() {
        let mut game = new_game(5, GameConfig::default(), 4);
        game.cleanup_draft();
        doom(&mut game, "p1", 10);
        game.resolve_eliminations().expect("resolve");
        assert!(game.ghost().is_none());
        assert_eq!(game.live_count(), 4);

        doom(&mut game, "p2", 12);
        game.resolve_eliminations().expect("resolve");
        assert_eq!(game.ghost().map(|ghost| ghost.name.as_str()), Some("p2"));
        assert_eq!(game.player("p2").expect("p2").placement, Some(4));
    }

    #[test]
    fn simultaneous_eliminations_place_worst_poison_last() {
        let mut game = new_game(5, GameConfig::default(), 4);
        game.cleanup_draft();
        doom(&mut game, "p1", 11);
        doom(&mut game, "p2", 14);
        game.resolve_eliminations().expect("resolve");
        assert_eq!(game.player("p2").expect("p2").placement, Some(5));
        assert_eq!(game.player("p1").expect("p1").placement, Some(4));
        assert_eq!(game.ghost().map(|ghost| ghost.name.as_str()), Some("p1"));
    }

    #[test]
    fn sudden_death_picks_the_two_lowest_and_resets_them() {
        let mut game = new_game(3, GameConfig::default(), 4);
        game.cleanup_draft();
        doom(&mut game, "p1", 15);
        doom(&mut game, "p2", 10);
        doom(&mut game, "p3", 11);
        game.resolve_eliminations().expect("resolve");

        let p1 = game.player("p1").expect("p1");
        assert_eq!(p1.phase(), Phase::Eliminated);
        assert_eq!(p1.placement, Some(3));
        for name in ["p2", "p3"] {
            let fighter = game.player(name).expect("fighter");
            assert_eq!(fighter.poison, 9);
            assert!(fighter.in_sudden_death);
            assert_eq!(fighter.phase(), Phase::Build);
        }
        assert!(game.battles().is_empty());

        finish_build(&mut game, "p2");
        assert!(game.battles().is_empty(), "bout waits for both fighters");
        finish_build(&mut game, "p3");
        let battle = game.battle_for("p2").expect("bout");
        assert!(battle.sudden_death && battle.involves("p3"));
        assert_eq!(game.player("p2").expect("p2").phase(), Phase::Battle);
        assert!(game
            .apply_action(
                "p2",
                GameAction::BattleSubmitResult {
                    claim: ResultClaim::Draw
                }
            )
            .is_err());

        submit(&mut game, "p2", "p2");
        submit(&mut game, "p3", "p2");
        assert_eq!(game.live_count(), 1);
        assert!(game.is_ended());
        assert_eq!(game.winner(), Some("p2"));
        let p2 = game.player("p2").expect("p2");
        assert_eq!(p2.phase(), Phase::Winner);
        assert!(!p2.in_sudden_death);
        assert_eq!(game.player("p3").expect("p3").placement, Some(2));
        assert_eq!(game.player("p1").expect("p1").phase(), Phase::GameOver);
        assert_eq!(game.summary().placements.len(), 3);
    }

    #[test]
    fn sudden_death_fighters_bring_their_last_hand() {
        let config = GameConfig {
            use_upgrades: false,
            ..GameConfig::default()
        };
        let hand_size = config.hand_size;
        let mut game = new_game(3, config, 23);
        for name in ["p1", "p2", "p3"] {
            player_mut(&mut game, name).poison = 9;
        }
        for name in ["p1", "p2", "p3"] {
            ready_up(&mut game, name);
        }
        let bout = game.battles()[0].clone();
        let fighters = [bout.sides[0].name.clone(), bout.sides[1].name.clone()];
        for name in &fighters {
            submit(&mut game, name, "draw");
        }

        for name in &fighters {
            let fighter = game.player(name).expect("fighter");
            assert!(fighter.in_sudden_death);
            assert_eq!(fighter.phase(), Phase::Build);
            assert_eq!(fighter.hand.len(), hand_size);
            assert!(!fighter.build_ready);
        }
        for name in &fighters {
            let basics = vec!["Swamp".to_string(); game.config.num_basics];
            game.apply_action(name, GameAction::BuildReady { basics })
                .expect("ready with the restored hand");
        }

        let battle = game.battle_for(&fighters[0]).expect("bout").clone();
        assert!(battle.sudden_death);
        for side in &battle.sides {
            assert_eq!(side.zones.hand.len(), hand_size);
            assert_eq!(side.damage, poison_damage(&game.config, 0, hand_size));
        }
        for name in &fighters {
            let fighter = game.player(name).expect("fighter");
            let recorded = fighter.history.get(&fighter.round_key()).expect("round snapshot");
            assert_eq!(recorded.hand.len(), hand_size);
        }
    }

    #[test]
    fn sudden_death_against_a_bot_needs_one_claim() {
        let mut game = with_bots(1, vec![bot("old", 12)]);
        doom(&mut game, "p1", 10);
        game.resolve_eliminations().expect("resolve");
        assert!(game.battles().is_empty());
        assert_eq!(game.bots()[0].poison, 9);

        finish_build(&mut game, "p1");
        let bout = game.battle_for("p1").expect("bout");
        assert!(bout.sudden_death);

        submit(&mut game, "p1", "p1");
        assert!(game.is_ended());
        assert_eq!(game.winner(), Some("p1"));
        assert!(game.bots()[0].eliminated);
        assert_eq!(game.bots()[0].placement, Some(2));
    }

    #[test]
    fn finished_match_keeps_ghost_parity() {
        let mut game = new_game(2, GameConfig::default(), 8);
        game.cleanup_draft();
        doom(&mut game, "p1", 10);
        game.resolve_eliminations().expect("resolve");

        assert!(game.is_ended());
        assert_eq!(game.player("p2").expect("p2").phase(), Phase::Winner);
        assert_eq!(game.live_count(), 1);
        assert_eq!(game.ghost().map(|ghost| ghost.name.as_str()), Some("p1"));
    }

    #[test]
    fn bot_duel_is_settled_by_the_engine() {
        let mut game = with_bots(1, vec![bot("a", 10), bot("b", 11), bot("c", 0)]);
        doom(&mut game, "p1", 13);
        game.bots[2].poison = 20;
        game.resolve_eliminations().expect("resolve");
        // everyone was dying: the two lowest bots duel, the rest are out
        assert!(game.is_ended());
        let standing: Vec<&FakePlayer> =
            game.bots().iter().filter(|bot| !bot.eliminated).collect();
        assert_eq!(standing.len(), 1);
        assert_eq!(game.winner(), Some(standing[0].name.as_str()));
        assert_eq!(game.player("p1").expect("p1").phase(), Phase::GameOver);
    }

    #[test]
    fn last_human_out_ends_the_match_for_the_bots() {
        let mut game = with_bots(1, vec![bot("a", 3), bot("b", 1)]);
        doom(&mut game, "p1", 10);
        game.resolve_eliminations().expect("resolve");
        assert!(game.is_ended());
        assert_eq!(game.winner(), Some("Bot b"));
        let records = game.drain_history();
        assert!(records
            .iter()
            .any(|record| matches!(record, HistoryRecord::Finished { .. })));
    }

    proptest! {
        #[test]
        fn ghost_exists_iff_live_count_is_odd(
            seed in 1u32..5_000,
            players in 3usize..9,
            kills in proptest::collection::vec((0usize..8, 10u32..20), 1..6),
        ) {
            let mut game = new_game(players, GameConfig::default(), seed);
            game.cleanup_draft();
            for (pick, poison) in kills {
                if game.is_ended() || game.live_count() <= 2 {
                    break;
                }
                let live: Vec<String> = game
                    .players()
                    .iter()
                    .filter(|player| player.is_live())
                    .map(|player| player.name.clone())
                    .collect();
                let name = live[pick % live.len()].clone();
                doom(&mut game, &name, poison);
                game.resolve_eliminations().expect("resolve");
                prop_assert_eq!(game.ghost().is_some(), game.live_count() % 2 == 1);
            }
        }

        #[test]
        fn sudden_death_removes_exactly_one(seed in 1u32..5_000, extra in 0usize..3) {
            let players = 2 + extra;
            let mut game = new_game(players, GameConfig::default(), seed);
            game.cleanup_draft();
            for idx in 0..players {
                doom(&mut game, &format!("p{}", idx + 1), 10 + idx as u32);
            }
            game.resolve_eliminations().expect("resolve");
            prop_assert_eq!(game.live_count(), 2);
            prop_assert!(game.ghost().is_none());
            for name in ["p1", "p2"] {
                finish_build(&mut game, name);
            }
            let bout = game.battles()[0].clone();
            prop_assert!(bout.sudden_death);
            let before = game.live_count();
            let winner = bout.sides[0].name.clone();
            submit(&mut game, &bout.sides[0].name, &winner);
            submit(&mut game, &bout.sides[1].name, &winner);
            prop_assert_eq!(before - game.live_count(), 1);
            prop_assert_eq!(game.ghost().is_some(), game.live_count() % 2 == 1);
        }
    }
}
