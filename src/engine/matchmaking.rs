use super::*;

/// Who a player entering battle will face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opponent {
    Human(usize),
    Bot(usize),
    Ghost,
}

impl Game {
    /// All live humans are in battle at the same round.
    pub fn can_start_pairing(&self) -> bool {
        let mut live = self.players.iter().filter(|player| player.is_live());
        let Some(first) = live.next() else {
            return false;
        };
        let key = first.round_key();
        first.phase() == Phase::Battle
            && live.all(|player| player.phase() == Phase::Battle && player.round_key() == key)
    }

    pub(super) fn in_active_battle(&self, name: &str) -> bool {
        self.battles.iter().any(|battle| battle.involves(name))
    }

    pub fn find_opponent(&mut self, idx: usize) -> GameResult<Option<Opponent>> {
        if !self.can_start_pairing() {
            return Err(GameError::invariant("players are not synchronized for pairing"));
        }
        let me = &self.players[idx];
        if self.in_active_battle(&me.name) {
            return Err(GameError::invariant(format!("{} is already fighting", me.name)));
        }
        let key = me.round_key();
        let last = me.last_opponent.clone();

        let humans: Vec<usize> = self
            .players
            .iter()
            .enumerate()
            .filter(|(other, player)| {
                *other != idx
                    && player.is_live()
                    && player.phase() == Phase::Battle
                    && player.round_key() == key
                    && !self.in_active_battle(&player.name)
            })
            .map(|(other, _)| other)
            .collect();
        if !humans.is_empty() {
            let names: Vec<&str> = humans
                .iter()
                .map(|other| self.players[*other].name.as_str())
                .collect();
            let picked = weighted_random_opponent(
                &names,
                last.as_deref(),
                self.config.repeat_opponent_weight,
                &mut self.rng,
            );
            return Ok(picked.map(|pick| Opponent::Human(humans[pick])));
        }

        let bots: Vec<usize> = self
            .bots
            .iter()
            .enumerate()
            .filter(|(_, bot)| {
                !bot.eliminated
                    && !self.in_active_battle(&bot.name)
                    && !bot.snapshots.is_empty()
            })
            .map(|(bot_idx, _)| bot_idx)
            .collect();
        if !bots.is_empty() {
            let names: Vec<&str> = bots
                .iter()
                .map(|bot_idx| self.bots[*bot_idx].name.as_str())
                .collect();
            let picked = weighted_random_opponent(
                &names,
                last.as_deref(),
                self.config.repeat_opponent_weight,
                &mut self.rng,
            );
            return Ok(picked.map(|pick| Opponent::Bot(bots[pick])));
        }

        let unpaired = self
            .players
            .iter()
            .filter(|player| {
                player.is_live()
                    && player.phase() == Phase::Battle
                    && !self.in_active_battle(&player.name)
            })
            .count();
        if unpaired == 1 && self.ghost.is_some() {
            return Ok(Some(Opponent::Ghost));
        }
        Ok(None)
    }

    /// Moves every live player into battle, pairs them in random order, and
    /// hands out byes to anyone left without an opponent.
    pub(super) fn start_pairing(&mut self) -> GameResult<()> {
        self.cleanup_draft();
        let mut order: Vec<usize> = (0..self.players.len())
            .filter(|idx| self.players[*idx].is_live())
            .collect();
        for idx in &order {
            let player = &mut self.players[*idx];
            player.set_phase(Phase::Battle)?;
            player.build_ready = false;
        }
        self.rng.shuffle(&mut order);

        let mut byes = Vec::new();
        for idx in order {
            if self.in_active_battle(&self.players[idx].name) {
                continue;
            }
            match self.find_opponent(idx)? {
                Some(opponent) => self.start_battle(idx, opponent, false)?,
                None => byes.push(idx),
            }
        }

        for idx in byes {
            info!(
                match_id = %self.match_id,
                player = %self.players[idx].name,
                stage = self.players[idx].stage,
                round = self.players[idx].round,
                "bye"
            );
            self.enter_reward(idx, Outcome::Bye)?;
        }

        if self.battles.is_empty() {
            self.resolve_eliminations()?;
        }
        Ok(())
    }
}
