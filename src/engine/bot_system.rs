use std::collections::HashMap;

use super::*;

/// Snapshot a bot replays at `key`: the recorded one, the latest earlier one,
/// or failing both its earliest.
pub(super) fn bot_snapshot_at(bot: &FakePlayer, key: RoundKey) -> Option<&StaticOpponent> {
    bot.snapshot_for(key)
        .or_else(|| bot.snapshots.values().next())
}

/// Gives every card in a bot's recorded rounds an id from this match so it
/// can never collide with a live card. Applied-upgrade links follow along.
pub(super) fn reissue_snapshot_ids(bot: &mut FakePlayer, ids: &mut CardIdAllocator) {
    for snapshot in bot.snapshots.values_mut() {
        let mut remap: HashMap<CardId, CardId> = HashMap::new();
        for card in snapshot
            .hand
            .iter_mut()
            .chain(snapshot.sideboard.iter_mut())
            .chain(snapshot.command_zone.iter_mut())
            .chain(snapshot.upgrades.iter_mut())
        {
            let fresh = ids.next_id();
            remap.insert(card.id, fresh);
            card.id = fresh;
        }
        for upgrade in &mut snapshot.upgrades {
            upgrade.upgrade_target = upgrade
                .upgrade_target
                .and_then(|target| remap.get(&target).copied());
        }
    }
}

impl Game {
    /// Poison dealt to a bot lands on its own counter for the rest of the
    /// match.
    pub(super) fn apply_bot_poison(&mut self, bot_idx: usize, poison: u32) {
        let bot = &mut self.bots[bot_idx];
        bot.poison = bot.poison.saturating_add(poison);
        debug!(match_id = %self.match_id, bot = %bot.name, poison = bot.poison, "bot poisoned");
    }

    /// Settles a sudden-death bout between two bots with a fair coin.
    pub(super) fn resolve_bot_duel(&mut self, first: usize, second: usize) {
        let (winner, loser) = if self.rng.coin_flip() {
            (first, second)
        } else {
            (second, first)
        };
        let damage = self.bots[winner]
            .snapshots
            .values()
            .next_back()
            .map(|snapshot| {
                poison_damage(
                    &self.config,
                    snapshot.applied_upgrade_count(),
                    snapshot.hand.len(),
                )
            })
            .unwrap_or(1)
            .max(1);
        self.apply_bot_poison(loser, damage);
        self.bots[winner].in_sudden_death = false;
        info!(
            match_id = %self.match_id,
            winner = %self.bots[winner].name,
            loser = %self.bots[loser].name,
            "bot duel settled"
        );
    }
}
