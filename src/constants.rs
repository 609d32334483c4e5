pub const DEFAULT_POISON_TO_LOSE: u32 = 10;
pub const DEFAULT_PACK_SIZE: usize = 5;
pub const DEFAULT_ROUNDS_PER_STAGE: u32 = 3;
pub const DEFAULT_MAX_TREASURES: u32 = 5;
pub const DEFAULT_HAND_SIZE: usize = 5;
pub const DEFAULT_NUM_BASICS: usize = 3;
pub const DEFAULT_STARTING_TREASURES: u32 = 1;
pub const DEFAULT_STARTING_CARDS: usize = 10;
pub const DEFAULT_STARTING_LIFE: i32 = 20;
pub const DEFAULT_UPGRADE_CHOICES: usize = 3;

/// Share of the pairing weight left to the opponent a player just fought.
pub const REPEAT_OPPONENT_WEIGHT: f32 = 0.1;

pub const DRAW_SENTINEL: &str = "draw";

pub const MAX_PLAYERS_PER_MATCH: usize = 16;
pub const MAX_BOTS_PER_MATCH: usize = 15;

pub const DEFAULT_LOBBY_TTL_SECS: u64 = 600;
pub const DEFAULT_MULTIPLAYER_TTL_SECS: u64 = 1_800;
pub const DEFAULT_SOLO_TTL_SECS: u64 = 300;

/// Classic Fibonacci with `fib(0) = fib(1) = 1`.
pub fn fibonacci(n: u32) -> u32 {
    let (mut prev, mut current) = (1u32, 1u32);
    for _ in 1..n {
        let next = prev.saturating_add(current);
        prev = current;
        current = next;
    }
    current
}

/// Poison dealt by a loser-side hand when upgrades are off.
pub fn hand_size_damage(hand_size: usize) -> u32 {
    fibonacci(hand_size.saturating_sub(2) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fibonacci_starts_at_one_one() {
        let values: Vec<u32> = (0..8).map(fibonacci).collect();
        assert_eq!(values, vec![1, 1, 2, 3, 5, 8, 13, 21]);
    }

    #[test]
    fn hand_of_five_deals_three() {
        assert_eq!(hand_size_damage(5), 3);
        assert_eq!(hand_size_damage(3), 1);
        assert_eq!(hand_size_damage(0), 1);
    }
}
