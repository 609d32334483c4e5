use std::fmt;

use crate::participants::Phase;

/// Failures an engine operation can report. Every variant except `Fatal` is
/// recoverable: the match keeps running and only the acting client hears
/// about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameError {
    /// Action attempted outside the phase it requires.
    InvalidPhase { expected: Vec<Phase>, actual: Phase },
    /// A card, upgrade, pack slot, player or battle that is not where the
    /// caller claimed it was.
    InvalidReference(String),
    /// Not enough treasure, or an empty pool where one is required.
    ResourceExhausted(String),
    /// A structural rule would be broken, e.g. starting a second draft.
    InvariantViolation(String),
    /// Bookkeeping defect. The match cannot continue.
    Fatal(String),
}

impl GameError {
    pub fn invalid_phase(expected: Phase, actual: Phase) -> Self {
        Self::InvalidPhase {
            expected: vec![expected],
            actual,
        }
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::InvalidReference(message.into())
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPhase { expected, actual } => {
                let expected: Vec<&str> = expected.iter().map(|phase| phase.as_str()).collect();
                write!(
                    f,
                    "action requires phase {} but player is in {}",
                    expected.join(" or "),
                    actual.as_str()
                )
            }
            Self::InvalidReference(message) => write!(f, "invalid reference: {message}"),
            Self::ResourceExhausted(message) => write!(f, "not enough resources: {message}"),
            Self::InvariantViolation(message) => write!(f, "not allowed: {message}"),
            Self::Fatal(message) => write!(f, "match state corrupted: {message}"),
        }
    }
}

impl std::error::Error for GameError {}

pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_phase_message_names_both_phases() {
        let error = GameError::invalid_phase(Phase::Draft, Phase::Battle);
        assert_eq!(
            error.to_string(),
            "action requires phase draft but player is in battle"
        );
        assert!(!error.is_fatal());
    }

    #[test]
    fn only_fatal_errors_abandon_the_match() {
        assert!(GameError::Fatal("lost battle".to_string()).is_fatal());
        assert!(!GameError::exhausted("treasure").is_fatal());
        assert!(!GameError::invariant("draft active").is_fatal());
    }
}
