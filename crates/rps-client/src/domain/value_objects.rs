//! # Value Objects
//!
//! Moves, outcomes and identifiers shared by every component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::GameError;

/// A move in rock-paper-scissors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    /// Rock (beats scissors).
    Rock,
    /// Paper (beats rock).
    Paper,
    /// Scissors (beats paper).
    Scissors,
}

impl Choice {
    /// All moves, in display order.
    pub const ALL: [Choice; 3] = [Choice::Rock, Choice::Paper, Choice::Scissors];

    /// The move this one defeats.
    pub fn beats(self) -> Choice {
        match self {
            Choice::Rock => Choice::Scissors,
            Choice::Paper => Choice::Rock,
            Choice::Scissors => Choice::Paper,
        }
    }

    /// Wire name (`rock`, `paper`, `scissors`).
    pub fn as_str(self) -> &'static str {
        match self {
            Choice::Rock => "rock",
            Choice::Paper => "paper",
            Choice::Scissors => "scissors",
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Choice {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rock" => Ok(Choice::Rock),
            "paper" => Ok(Choice::Paper),
            "scissors" => Ok(Choice::Scissors),
            other => Err(GameError::InvalidChoice(other.to_string())),
        }
    }
}

/// Result of a round from the player's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Player won.
    Win,
    /// Player lost.
    Loss,
    /// Same move on both sides.
    Draw,
}

impl Outcome {
    /// Wire name (`win`, `loss`, `draw`).
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Draw => "draw",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque user identifier assigned by the remote auth service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Primary key of a stored row: a serial number or a text key such as a
/// uuid, whichever the table uses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    /// `bigserial` key.
    Serial(i64),
    /// Text key (`uuid`, `text`).
    Text(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Serial(id) => write!(f, "{id}"),
            RowId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        RowId::Serial(value)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        RowId::Text(value.to_string())
    }
}

/// How standings are computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardMode {
    /// Group raw `game_results` rows client-side.
    #[default]
    Raw,
    /// Rank precomputed `user_stats` rows.
    Stats,
}

impl fmt::Display for LeaderboardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LeaderboardMode::Raw => "raw",
            LeaderboardMode::Stats => "stats",
        })
    }
}

impl FromStr for LeaderboardMode {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(LeaderboardMode::Raw),
            "stats" | "precomputed" => Ok(LeaderboardMode::Stats),
            other => Err(GameError::InvalidMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_cycle() {
        for choice in Choice::ALL {
            assert_ne!(choice.beats(), choice);
            assert_ne!(choice.beats().beats(), choice);
        }
    }

    #[test]
    fn test_choice_parse() {
        assert_eq!("Rock".parse::<Choice>().unwrap(), Choice::Rock);
        assert_eq!(" scissors ".parse::<Choice>().unwrap(), Choice::Scissors);
        assert!("lizard".parse::<Choice>().is_err());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&Choice::Paper).unwrap(), "\"paper\"");
        assert_eq!(serde_json::to_string(&Outcome::Loss).unwrap(), "\"loss\"");
        let outcome: Outcome = serde_json::from_str("\"draw\"").unwrap();
        assert_eq!(outcome, Outcome::Draw);
    }

    #[test]
    fn test_leaderboard_mode_parse() {
        assert_eq!("raw".parse::<LeaderboardMode>().unwrap(), LeaderboardMode::Raw);
        assert_eq!("STATS".parse::<LeaderboardMode>().unwrap(), LeaderboardMode::Stats);
        assert!("elo".parse::<LeaderboardMode>().is_err());
    }
}
