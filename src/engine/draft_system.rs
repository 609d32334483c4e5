use super::*;

/// Undealt packs plus the pack each drafting player currently holds. Exists
/// from the first player entering a draft until pairing cleans it up.
#[derive(Clone, Debug, Default)]
pub struct DraftState {
    packs: Vec<Vec<Card>>,
    held: BTreeMap<String, Vec<Card>>,
}

impl DraftState {
    pub fn undealt_packs(&self) -> usize {
        self.packs.len()
    }

    pub fn held_pack(&self, name: &str) -> Option<&[Card]> {
        self.held.get(name).map(Vec::as_slice)
    }

    /// Pulls one random card out of the first non-empty undealt pack. A pack
    /// emptied this way is dropped.
    pub(super) fn take_random_undealt(&mut self, rng: &mut Rng) -> Option<Card> {
        let pack_idx = self.packs.iter().position(|pack| !pack.is_empty())?;
        let pack = &mut self.packs[pack_idx];
        let card = pack.swap_remove(rng.pick_index(pack.len()));
        if pack.is_empty() {
            self.packs.swap_remove(pack_idx);
        }
        Some(card)
    }
}

/// Shuffles the whole pool into full packs; a remainder smaller than one pack
/// stays in the pool.
fn slice_packs(battler: &mut Battler, pack_size: usize, rng: &mut Rng) -> Vec<Vec<Card>> {
    let mut cards = battler.take_all();
    rng.shuffle(&mut cards);
    let full = cards.len() / pack_size * pack_size;
    let remainder = cards.split_off(full);
    battler.return_cards(remainder);
    cards.chunks(pack_size).map(<[Card]>::to_vec).collect()
}

impl Game {
    pub(super) fn start_draft(&mut self) -> GameResult<()> {
        if self.draft.is_some() {
            return Err(GameError::invariant("a draft is already active"));
        }
        if self.battler.is_empty() {
            return Err(GameError::exhausted("the card pool is empty"));
        }
        let packs = slice_packs(&mut self.battler, self.config.pack_size, &mut self.rng);
        debug!(match_id = %self.match_id, packs = packs.len(), "draft started");
        self.draft = Some(DraftState {
            packs,
            held: BTreeMap::new(),
        });
        Ok(())
    }

    pub(super) fn deal_pack_to_player(&mut self, idx: usize) -> GameResult<()> {
        let pack_size = self.config.pack_size;
        let name = self.players[idx].name.clone();
        let Some(draft) = self.draft.as_mut() else {
            return Err(GameError::invariant("no draft is active"));
        };

        if draft.packs.is_empty() {
            draft.packs = slice_packs(&mut self.battler, pack_size, &mut self.rng);
        }
        let pack = match draft.packs.pop() {
            Some(pack) => pack,
            None => {
                // less than one full pack left in the pool
                let mut rest = self.battler.take_all();
                if rest.is_empty() {
                    return Err(GameError::exhausted("the card pool is empty"));
                }
                self.rng.shuffle(&mut rest);
                rest
            }
        };
        if let Some(previous) = draft.held.insert(name, pack) {
            self.battler.return_cards(previous);
        }
        Ok(())
    }

    /// Puts a player who just entered `draft` in front of a pack, starting a
    /// draft segment if they are the first one there. An exhausted pool just
    /// means no pack this round.
    pub(super) fn deal_into_draft(&mut self, idx: usize) -> GameResult<()> {
        if self.draft.is_none() {
            match self.start_draft() {
                Ok(()) => {}
                Err(GameError::ResourceExhausted(reason)) => {
                    debug!(
                        match_id = %self.match_id,
                        player = %self.players[idx].name,
                        reason = %reason,
                        "no draft this round"
                    );
                    return Ok(());
                }
                Err(error) => return Err(error),
            }
        }
        match self.deal_pack_to_player(idx) {
            Err(GameError::ResourceExhausted(reason)) => {
                debug!(
                    match_id = %self.match_id,
                    player = %self.players[idx].name,
                    reason = %reason,
                    "no pack dealt"
                );
                Ok(())
            }
            other => other,
        }
    }

    pub(super) fn draft_roll(&mut self, idx: usize) -> GameResult<()> {
        let player = &self.players[idx];
        if player.treasures < 1 {
            return Err(GameError::exhausted("rolling a pack costs one treasure"));
        }
        let Some(draft) = self.draft.as_mut() else {
            return Err(GameError::invariant("no draft is active"));
        };
        if !draft.held.contains_key(&player.name)
            && draft.packs.is_empty()
            && self.battler.is_empty()
        {
            return Err(GameError::exhausted("the card pool is empty"));
        }

        if let Some(old) = draft.held.remove(&player.name) {
            self.battler.return_cards(old);
        }
        self.players[idx].treasures -= 1;
        self.deal_pack_to_player(idx)
    }

    pub(super) fn draft_swap(
        &mut self,
        idx: usize,
        pack_card: CardId,
        own_card: CardId,
        destination: ZoneName,
    ) -> GameResult<()> {
        let Some(draft) = self.draft.as_mut() else {
            return Err(GameError::invariant("no draft is active"));
        };
        let player = &mut self.players[idx];
        let Some(pack) = draft.held.get_mut(&player.name) else {
            return Err(GameError::reference("no pack is held"));
        };
        let Some(pack_idx) = pack.iter().position(|card| card.id == pack_card) else {
            return Err(GameError::reference(format!(
                "card {pack_card} is not in the pack"
            )));
        };
        let own = match destination {
            ZoneName::Hand => &mut player.hand,
            ZoneName::Sideboard => &mut player.sideboard,
            ZoneName::Upgrades => &mut player.upgrades,
            other => {
                return Err(GameError::invariant(format!(
                    "cannot draft into {other:?}"
                )))
            }
        };
        let Some(own_idx) = own.iter().position(|card| card.id == own_card) else {
            return Err(GameError::reference(format!(
                "card {own_card} is not in {destination:?}"
            )));
        };
        if destination == ZoneName::Upgrades && !pack[pack_idx].is_upgrade() {
            return Err(GameError::invariant("only upgrades go to the upgrade zone"));
        }

        std::mem::swap(&mut pack[pack_idx], &mut own[own_idx]);
        Ok(())
    }

    pub(super) fn draft_done(&mut self, idx: usize) -> GameResult<()> {
        let name = self.players[idx].name.clone();
        self.players[idx].set_phase(Phase::Build)?;
        self.players[idx].build_ready = false;
        if let Some(pack) = self
            .draft
            .as_mut()
            .and_then(|draft| draft.held.remove(&name))
        {
            self.battler.return_cards(pack);
        }
        Ok(())
    }

    /// Returns every undealt and orphaned pack to the pool. Runs once per
    /// round, at pairing.
    pub(super) fn cleanup_draft(&mut self) {
        let Some(draft) = self.draft.take() else {
            return;
        };
        for pack in draft.packs.into_iter().chain(draft.held.into_values()) {
            self.battler.return_cards(pack);
        }
    }
}
