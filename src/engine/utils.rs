use std::time::{SystemTime, UNIX_EPOCH};

use crate::cards::{Card, CardId};
use crate::rng::Rng;

pub(super) fn now_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    now as u64
}

/// Removes the card with `id`, keeping the order of the rest.
pub(super) fn take_card(cards: &mut Vec<Card>, id: CardId) -> Option<Card> {
    let position = cards.iter().position(|card| card.id == id)?;
    Some(cards.remove(position))
}

/// Picks one of `candidates`. When the one named `last` is among several, it
/// takes a fixed `repeat_weight` share of the draw and the rest split the
/// remainder evenly. That share is capped at half of a uniform share so a
/// rematch always stays less likely than a fresh pairing.
pub fn weighted_random_opponent(
    candidates: &[&str],
    last: Option<&str>,
    repeat_weight: f32,
    rng: &mut Rng,
) -> Option<usize> {
    match candidates.len() {
        0 => return None,
        1 => return Some(0),
        _ => {}
    }
    let Some(repeat) = candidates
        .iter()
        .position(|candidate| Some(*candidate) == last)
    else {
        return Some(rng.pick_index(candidates.len()));
    };

    let count = candidates.len() as f32;
    let repeat_share = repeat_weight.clamp(0.0, 0.5 / count);
    let other_share = (1.0 - repeat_share) / (count - 1.0);
    let weights: Vec<f32> = (0..candidates.len())
        .map(|idx| if idx == repeat { repeat_share } else { other_share })
        .collect();
    rng.weighted_index(&weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::CardKind;

    fn card(id: CardId) -> Card {
        Card {
            id,
            name: format!("Card {id}"),
            kind: CardKind::Normal,
            elo: 1200.0,
            upgrade_target: None,
        }
    }

    #[test]
    fn take_card_keeps_remaining_order() {
        let mut cards = vec![card(1), card(2), card(3)];
        let taken = take_card(&mut cards, 2).expect("card 2");
        assert_eq!(taken.id, 2);
        assert_eq!(cards.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);
        assert!(take_card(&mut cards, 2).is_none());
    }

    #[test]
    fn lone_candidate_is_picked_even_as_a_repeat() {
        let mut rng = Rng::new(1);
        assert_eq!(weighted_random_opponent(&[], None, 0.2, &mut rng), None);
        assert_eq!(
            weighted_random_opponent(&["p2"], Some("p2"), 0.2, &mut rng),
            Some(0)
        );
    }

    fn repeat_share(candidates: &[&str], weight: f32, seed: u32) -> f32 {
        let mut rng = Rng::new(seed);
        let trials = 40_000;
        let repeats = (0..trials)
            .filter(|_| {
                weighted_random_opponent(candidates, Some("a"), weight, &mut rng) == Some(0)
            })
            .count();
        repeats as f32 / trials as f32
    }

    #[test]
    fn repeat_opponent_takes_a_fixed_share() {
        let share = repeat_share(&["a", "b", "c", "d", "e"], 0.1, 99);
        assert!((0.09..0.11).contains(&share), "repeat share {share}");

        let share = repeat_share(&["a", "b", "c"], 0.1, 7);
        assert!((0.09..0.11).contains(&share), "repeat share {share}");
    }

    #[test]
    fn remaining_share_is_split_evenly() {
        let candidates = ["a", "b", "c", "d", "e"];
        let mut rng = Rng::new(31);
        let mut counts = [0usize; 5];
        for _ in 0..40_000 {
            let pick = weighted_random_opponent(&candidates, Some("a"), 0.1, &mut rng)
                .expect("pick");
            counts[pick] += 1;
        }
        for count in &counts[1..] {
            let share = *count as f32 / 40_000.0;
            assert!((0.205..0.245).contains(&share), "{counts:?}");
        }
    }

    #[test]
    fn large_tables_still_dampen_rematches() {
        let candidates: Vec<String> = (0..15u8)
            .map(|idx| char::from(b'a' + idx).to_string())
            .collect();
        let names: Vec<&str> = candidates.iter().map(String::as_str).collect();
        let share = repeat_share(&names, 0.1, 3);
        assert!(share < 1.0 / 15.0, "repeat share {share}");
        assert!(share > 0.0);
    }

    #[test]
    fn no_previous_opponent_spreads_picks() {
        let candidates = ["a", "b"];
        let mut rng = Rng::new(5);
        let mut counts = [0usize; 2];
        for _ in 0..2_000 {
            let pick = weighted_random_opponent(&candidates, None, 0.2, &mut rng).expect("pick");
            counts[pick] += 1;
        }
        assert!(counts[0] > 800 && counts[1] > 800, "{counts:?}");
    }
}
