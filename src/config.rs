use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    DEFAULT_HAND_SIZE, DEFAULT_LOBBY_TTL_SECS, DEFAULT_MAX_TREASURES, DEFAULT_MULTIPLAYER_TTL_SECS,
    DEFAULT_NUM_BASICS, DEFAULT_PACK_SIZE, DEFAULT_POISON_TO_LOSE, DEFAULT_ROUNDS_PER_STAGE,
    DEFAULT_SOLO_TTL_SECS, DEFAULT_STARTING_CARDS, DEFAULT_STARTING_LIFE,
    DEFAULT_STARTING_TREASURES, DEFAULT_UPGRADE_CHOICES, MAX_BOTS_PER_MATCH,
    REPEAT_OPPONENT_WEIGHT,
};
use crate::error::{GameError, GameResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    pub poison_to_lose: u32,
    pub pack_size: usize,
    pub rounds_per_stage: u32,
    pub max_treasures: u32,
    pub hand_size: usize,
    pub num_basics: usize,
    pub starting_treasures: u32,
    pub starting_cards: usize,
    pub starting_life: i32,
    pub use_upgrades: bool,
    pub use_vanguards: bool,
    pub upgrade_choices: usize,
    pub bot_count: usize,
    pub repeat_opponent_weight: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            poison_to_lose: DEFAULT_POISON_TO_LOSE,
            pack_size: DEFAULT_PACK_SIZE,
            rounds_per_stage: DEFAULT_ROUNDS_PER_STAGE,
            max_treasures: DEFAULT_MAX_TREASURES,
            hand_size: DEFAULT_HAND_SIZE,
            num_basics: DEFAULT_NUM_BASICS,
            starting_treasures: DEFAULT_STARTING_TREASURES,
            starting_cards: DEFAULT_STARTING_CARDS,
            starting_life: DEFAULT_STARTING_LIFE,
            use_upgrades: true,
            use_vanguards: false,
            upgrade_choices: DEFAULT_UPGRADE_CHOICES,
            bot_count: 0,
            repeat_opponent_weight: REPEAT_OPPONENT_WEIGHT,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> GameResult<()> {
        if self.poison_to_lose == 0 {
            return Err(GameError::invariant("poisonToLose must be at least 1"));
        }
        if self.pack_size == 0 {
            return Err(GameError::invariant("packSize must be at least 1"));
        }
        if self.rounds_per_stage == 0 {
            return Err(GameError::invariant("roundsPerStage must be at least 1"));
        }
        if self.hand_size == 0 {
            return Err(GameError::invariant("handSize must be at least 1"));
        }
        if self.bot_count > MAX_BOTS_PER_MATCH {
            return Err(GameError::invariant(format!(
                "botCount must be at most {MAX_BOTS_PER_MATCH}"
            )));
        }
        if !self.repeat_opponent_weight.is_finite()
            || !(0.0..=1.0).contains(&self.repeat_opponent_weight)
        {
            return Err(GameError::invariant(
                "repeatOpponentWeight must be within 0..=1",
            ));
        }
        Ok(())
    }

    /// True when finishing `round` closes the current stage.
    pub fn closes_stage(&self, round: u32) -> bool {
        round % self.rounds_per_stage == 0
    }
}

/// Process-level settings for the websocket server, read from the environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub history_path: PathBuf,
    pub cube_path: Option<PathBuf>,
    pub lobby_ttl: Duration,
    pub multiplayer_ttl: Duration,
    pub solo_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            history_path: PathBuf::from(".data/history.json"),
            cube_path: None,
            lobby_ttl: Duration::from_secs(DEFAULT_LOBBY_TTL_SECS),
            multiplayer_ttl: Duration::from_secs(DEFAULT_MULTIPLAYER_TTL_SECS),
            solo_ttl: Duration::from_secs(DEFAULT_SOLO_TTL_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: parse_or_default(&lookup, "PORT", defaults.port),
            history_path: lookup("HISTORY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.history_path),
            cube_path: lookup("CUBE_PATH")
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            lobby_ttl: Duration::from_secs(parse_or_default(
                &lookup,
                "LOBBY_TTL_SECS",
                DEFAULT_LOBBY_TTL_SECS,
            )),
            multiplayer_ttl: Duration::from_secs(parse_or_default(
                &lookup,
                "MULTIPLAYER_TTL_SECS",
                DEFAULT_MULTIPLAYER_TTL_SECS,
            )),
            solo_ttl: Duration::from_secs(parse_or_default(
                &lookup,
                "SOLO_TTL_SECS",
                DEFAULT_SOLO_TTL_SECS,
            )),
        }
    }
}

fn parse_or_default<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, raw = %raw, fallback = %default, "ignoring unparsable setting");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(GameConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_pack_size_is_rejected() {
        let config = GameConfig {
            pack_size: 0,
            ..GameConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GameError::InvariantViolation(_))
        ));
    }

    #[test]
    fn closes_stage_on_exact_multiples() {
        let config = GameConfig::default();
        assert!(!config.closes_stage(1));
        assert!(!config.closes_stage(2));
        assert!(config.closes_stage(3));
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let config: GameConfig =
            serde_json::from_str(r#"{"poisonToLose":7,"useUpgrades":false}"#).expect("parse");
        assert_eq!(config.poison_to_lose, 7);
        assert!(!config.use_upgrades);
        assert_eq!(config.pack_size, DEFAULT_PACK_SIZE);
    }

    #[test]
    fn server_config_falls_back_on_bad_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "not-a-port"),
            ("SOLO_TTL_SECS", "42"),
            ("CUBE_PATH", "  "),
        ]);
        let config = ServerConfig::from_lookup(|key| env.get(key).map(|value| value.to_string()));
        assert_eq!(config.port, 8080);
        assert_eq!(config.solo_ttl, Duration::from_secs(42));
        assert_eq!(config.cube_path, None);
    }
}
