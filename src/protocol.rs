use serde_json::{Map, Value};

use crate::cards::CardId;
use crate::config::GameConfig;
use crate::constants::DRAW_SENTINEL;
use crate::participants::Phase;
use crate::zones::ZoneName;

/// Claimed outcome of a battle, as submitted by one side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultClaim {
    Winner(String),
    Draw,
}

impl ResultClaim {
    pub fn parse(raw: &str) -> Self {
        if raw == DRAW_SENTINEL {
            Self::Draw
        } else {
            Self::Winner(raw.to_string())
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Winner(name) => name,
            Self::Draw => DRAW_SENTINEL,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GameAction {
    DraftSwap {
        pack_card: CardId,
        own_card: CardId,
        destination: ZoneName,
    },
    DraftRoll,
    DraftDone,
    BuildMove {
        card: CardId,
        from: ZoneName,
        to: ZoneName,
    },
    BuildSwap {
        hand_card: CardId,
        sideboard_card: CardId,
    },
    BuildReady {
        basics: Vec<String>,
    },
    BuildUnready,
    BuildApplyUpgrade {
        upgrade: CardId,
        target: CardId,
    },
    BuildSetCompanion {
        card: CardId,
    },
    BuildRemoveCompanion,
    BattleMove {
        card: CardId,
        from: ZoneName,
        to: ZoneName,
    },
    BattleSubmitResult {
        claim: ResultClaim,
    },
    BattleUpdateCardState {
        card: CardId,
        tapped: Option<bool>,
        flipped: Option<bool>,
        counters: Option<i32>,
    },
    BattleUpdateLife {
        life: i32,
    },
    RewardPickUpgrade {
        upgrade: CardId,
    },
    RewardApplyUpgrade {
        upgrade: CardId,
        target: CardId,
    },
    RewardDone,
}

impl GameAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DraftSwap { .. } => "draft_swap",
            Self::DraftRoll => "draft_roll",
            Self::DraftDone => "draft_done",
            Self::BuildMove { .. } => "build_move",
            Self::BuildSwap { .. } => "build_swap",
            Self::BuildReady { .. } => "build_ready",
            Self::BuildUnready => "build_unready",
            Self::BuildApplyUpgrade { .. } => "build_apply_upgrade",
            Self::BuildSetCompanion { .. } => "build_set_companion",
            Self::BuildRemoveCompanion => "build_remove_companion",
            Self::BattleMove { .. } => "battle_move",
            Self::BattleSubmitResult { .. } => "battle_submit_result",
            Self::BattleUpdateCardState { .. } => "battle_update_card_state",
            Self::BattleUpdateLife { .. } => "battle_update_life",
            Self::RewardPickUpgrade { .. } => "reward_pick_upgrade",
            Self::RewardApplyUpgrade { .. } => "reward_apply_upgrade",
            Self::RewardDone => "reward_done",
        }
    }

    pub fn required_phase(&self) -> Phase {
        match self {
            Self::DraftSwap { .. } | Self::DraftRoll | Self::DraftDone => Phase::Draft,
            Self::BuildMove { .. }
            | Self::BuildSwap { .. }
            | Self::BuildReady { .. }
            | Self::BuildUnready
            | Self::BuildApplyUpgrade { .. }
            | Self::BuildSetCompanion { .. }
            | Self::BuildRemoveCompanion => Phase::Build,
            Self::BattleMove { .. }
            | Self::BattleSubmitResult { .. }
            | Self::BattleUpdateCardState { .. }
            | Self::BattleUpdateLife { .. } => Phase::Battle,
            Self::RewardPickUpgrade { .. }
            | Self::RewardApplyUpgrade { .. }
            | Self::RewardDone => Phase::Reward,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    Join {
        match_id: Option<String>,
        name: String,
    },
    SetReady {
        ready: bool,
    },
    StartGame {
        config: Option<GameConfig>,
    },
    Ping {
        t: f64,
    },
    Game(GameAction),
}

/// Parses `{"action": "...", "payload": {...}}`. The error string is safe to
/// send back to the client.
pub fn parse_client_message(raw: &str) -> Result<ClientMessage, String> {
    let value: Value = serde_json::from_str(raw).map_err(|_| "message is not json".to_string())?;
    let object = value
        .as_object()
        .ok_or_else(|| "message must be an object".to_string())?;
    let action = object
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| "message has no action".to_string())?;
    let empty = Map::new();
    let payload = match object.get("payload") {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(payload)) => payload,
        Some(_) => return Err(format!("{action}: payload must be an object")),
    };

    parse_action(action, payload).ok_or_else(|| format!("{action}: invalid or unknown action"))
}

fn parse_action(action: &str, payload: &Map<String, Value>) -> Option<ClientMessage> {
    let message = match action {
        "join" => ClientMessage::Join {
            match_id: optional_str(payload, "matchId")?,
            name: payload.get("name")?.as_str()?.to_string(),
        },
        "set_ready" => ClientMessage::SetReady {
            ready: match payload.get("ready") {
                None => true,
                Some(value) => value.as_bool()?,
            },
        },
        "start_game" => ClientMessage::StartGame {
            config: match payload.get("config") {
                None | Some(Value::Null) => None,
                Some(value) => Some(serde_json::from_value(value.clone()).ok()?),
            },
        },
        "ping" => {
            let t = payload.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            ClientMessage::Ping { t }
        }
        _ => ClientMessage::Game(parse_game_action(action, payload)?),
    };
    Some(message)
}

fn parse_game_action(action: &str, payload: &Map<String, Value>) -> Option<GameAction> {
    let parsed = match action {
        "draft_swap" => {
            let destination = zone(payload, "destination")?;
            if !matches!(
                destination,
                ZoneName::Hand | ZoneName::Sideboard | ZoneName::Upgrades
            ) {
                return None;
            }
            GameAction::DraftSwap {
                pack_card: card_id(payload, "packCard")?,
                own_card: card_id(payload, "ownCard")?,
                destination,
            }
        }
        "draft_roll" => GameAction::DraftRoll,
        "draft_done" => GameAction::DraftDone,
        "build_move" => GameAction::BuildMove {
            card: card_id(payload, "card")?,
            from: zone(payload, "from")?,
            to: zone(payload, "to")?,
        },
        "build_swap" => GameAction::BuildSwap {
            hand_card: card_id(payload, "handCard")?,
            sideboard_card: card_id(payload, "sideboardCard")?,
        },
        "build_ready" => {
            let basics = payload
                .get("basics")?
                .as_array()?
                .iter()
                .map(|value| value.as_str().map(str::to_string))
                .collect::<Option<Vec<String>>>()?;
            GameAction::BuildReady { basics }
        }
        "build_unready" => GameAction::BuildUnready,
        "build_apply_upgrade" => GameAction::BuildApplyUpgrade {
            upgrade: card_id(payload, "upgrade")?,
            target: card_id(payload, "target")?,
        },
        "build_set_companion" => GameAction::BuildSetCompanion {
            card: card_id(payload, "card")?,
        },
        "build_remove_companion" => GameAction::BuildRemoveCompanion,
        "battle_move" => GameAction::BattleMove {
            card: card_id(payload, "card")?,
            from: zone(payload, "from")?,
            to: zone(payload, "to")?,
        },
        "battle_submit_result" => GameAction::BattleSubmitResult {
            claim: ResultClaim::parse(payload.get("winner")?.as_str()?),
        },
        "battle_update_card_state" => GameAction::BattleUpdateCardState {
            card: card_id(payload, "card")?,
            tapped: optional_bool(payload, "tapped")?,
            flipped: optional_bool(payload, "flipped")?,
            counters: match payload.get("counters") {
                None => None,
                Some(value) => Some(i32::try_from(value.as_i64()?).ok()?),
            },
        },
        "battle_update_life" => GameAction::BattleUpdateLife {
            life: i32::try_from(payload.get("life")?.as_i64()?).ok()?,
        },
        "reward_pick_upgrade" => GameAction::RewardPickUpgrade {
            upgrade: card_id(payload, "upgrade")?,
        },
        "reward_apply_upgrade" => GameAction::RewardApplyUpgrade {
            upgrade: card_id(payload, "upgrade")?,
            target: card_id(payload, "target")?,
        },
        "reward_done" => GameAction::RewardDone,
        _ => return None,
    };
    Some(parsed)
}

fn card_id(payload: &Map<String, Value>, key: &str) -> Option<CardId> {
    payload.get(key)?.as_u64()
}

fn zone(payload: &Map<String, Value>, key: &str) -> Option<ZoneName> {
    ZoneName::parse(payload.get(key)?.as_str()?)
}

fn optional_str(payload: &Map<String, Value>, key: &str) -> Option<Option<String>> {
    match payload.get(key) {
        None | Some(Value::Null) => Some(None),
        Some(value) => Some(Some(value.as_str()?.to_string())),
    }
}

fn optional_bool(payload: &Map<String, Value>, key: &str) -> Option<Option<bool>> {
    match payload.get(key) {
        None => Some(None),
        Some(value) => Some(Some(value.as_bool()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_join_message() {
        let parsed = parse_client_message(
            r#"{"action":"join","payload":{"name":"alice","matchId":"m-1"}}"#,
        )
        .expect("join should parse");
        assert_eq!(
            parsed,
            ClientMessage::Join {
                match_id: Some("m-1".to_string()),
                name: "alice".to_string(),
            }
        );
    }

    #[test]
    fn parse_draft_swap_message() {
        let parsed = parse_client_message(
            r#"{"action":"draft_swap","payload":{"packCard":4,"ownCard":9,"destination":"sideboard"}}"#,
        )
        .expect("swap should parse");
        match parsed {
            ClientMessage::Game(action) => {
                assert_eq!(action.required_phase(), Phase::Draft);
                assert_eq!(
                    action,
                    GameAction::DraftSwap {
                        pack_card: 4,
                        own_card: 9,
                        destination: ZoneName::Sideboard,
                    }
                );
            }
            other => panic!("expected game action, got {other:?}"),
        }
    }

    #[test]
    fn draft_swap_rejects_battle_zones() {
        let parsed = parse_client_message(
            r#"{"action":"draft_swap","payload":{"packCard":4,"ownCard":9,"destination":"exile"}}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn draw_sentinel_parses_as_draw() {
        let parsed = parse_client_message(
            r#"{"action":"battle_submit_result","payload":{"winner":"draw"}}"#,
        )
        .expect("submit should parse");
        assert_eq!(
            parsed,
            ClientMessage::Game(GameAction::BattleSubmitResult {
                claim: ResultClaim::Draw
            })
        );
    }

    #[test]
    fn payload_less_actions_parse() {
        for (raw, phase) in [
            (r#"{"action":"draft_roll"}"#, Phase::Draft),
            (r#"{"action":"build_unready","payload":null}"#, Phase::Build),
            (r#"{"action":"reward_done","payload":{}}"#, Phase::Reward),
        ] {
            match parse_client_message(raw).expect("parse") {
                ClientMessage::Game(action) => assert_eq!(action.required_phase(), phase),
                other => panic!("expected game action, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_action_names_the_action() {
        let error = parse_client_message(r#"{"action":"cheat","payload":{}}"#)
            .expect_err("unknown action");
        assert_eq!(error, "cheat: invalid or unknown action");
    }

    #[test]
    fn start_game_accepts_partial_config() {
        let parsed = parse_client_message(
            r#"{"action":"start_game","payload":{"config":{"botCount":2}}}"#,
        )
        .expect("start should parse");
        match parsed {
            ClientMessage::StartGame { config: Some(config) } => {
                assert_eq!(config.bot_count, 2);
                assert_eq!(config.pack_size, GameConfig::default().pack_size);
            }
            other => panic!("expected start_game, got {other:?}"),
        }
    }

    #[test]
    fn life_must_fit_in_i32() {
        assert!(parse_client_message(
            r#"{"action":"battle_update_life","payload":{"life":99999999999}}"#
        )
        .is_err());
        assert!(parse_client_message(
            r#"{"action":"battle_update_life","payload":{"life":-3}}"#
        )
        .is_ok());
    }
}
