// Club records: players, games, championships, invitations, and their
// identifiers.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::Achievement;

/// Roster size used when a game does not declare its own `max_players`.
pub const DEFAULT_MAX_PLAYERS: usize = 20;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

string_id!(
    /// Opaque player identifier.
    PlayerId
);
string_id!(
    /// Opaque game identifier.
    GameId
);
string_id!(
    /// Opaque trade proposal identifier.
    TradeId
);
string_id!(ChampionshipId);
string_id!(InvitationId);

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// Field position a player usually takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Goalkeeper,
    Defender,
    FullBack,
    Midfielder,
    Forward,
}

impl Position {
    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "GK",
            Position::Defender => "DF",
            Position::FullBack => "FB",
            Position::Midfielder => "MF",
            Position::Forward => "FW",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    #[default]
    Active,
    /// Enrolled but not yet approved by an admin.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalCondition {
    Excellent,
    Good,
    Fair,
    Injured,
}

/// Highest mark a rater can give one attribute.
pub const MAX_ATTRIBUTE_RATING: u8 = 10;

/// Running total of the marks one attribute has received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeScore {
    pub score: u32,
    pub count: u32,
}

impl AttributeScore {
    pub fn add(&mut self, mark: u8) {
        self.score = self.score.saturating_add(u32::from(mark));
        self.count = self.count.saturating_add(1);
    }

    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| f64::from(self.score) / f64::from(self.count))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    pub attack: AttributeScore,
    #[serde(default)]
    pub defense: AttributeScore,
    #[serde(default)]
    pub speed: AttributeScore,
    #[serde(default)]
    pub passing: AttributeScore,
}

impl Attributes {
    pub fn record(&mut self, rating: &AttributeRating) {
        self.attack.add(rating.attack);
        self.defense.add(rating.defense);
        self.speed.add(rating.speed);
        self.passing.add(rating.passing);
    }

    /// Mean of the rated attributes' averages, on the 0-10 mark scale.
    pub fn overall(&self) -> Option<f64> {
        let averages: Vec<f64> = [self.attack, self.defense, self.speed, self.passing]
            .iter()
            .filter_map(AttributeScore::average)
            .collect();
        if averages.is_empty() {
            return None;
        }
        Some(averages.iter().sum::<f64>() / averages.len() as f64)
    }
}

/// One rater's marks for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRating {
    pub attack: u8,
    pub defense: u8,
    pub speed: u8,
    pub passing: u8,
}

impl AttributeRating {
    pub fn is_valid(&self) -> bool {
        [self.attack, self.defense, self.speed, self.passing]
            .iter()
            .all(|&mark| mark <= MAX_ATTRIBUTE_RATING)
    }
}

/// A club member (or guest) as known to the roster.
///
/// The draw and trade engines never look at this payload; they only move
/// [`PlayerId`]s around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub nickname: String,
    pub position: Position,
    pub membership_number: String,
    pub role: Role,
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub status: PlayerStatus,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub physical_condition: Option<PhysicalCondition>,
    #[serde(default)]
    pub attributes: Attributes,
    /// Granted by hand, on top of the ones earned from stats.
    #[serde(default)]
    pub achievements: Vec<Achievement>,
}

impl Player {
    /// Whether the player may sign up for games.
    pub fn can_register(&self) -> bool {
        self.role != Role::Guest && self.status == PlayerStatus::Active
    }

    /// Star rating out of five, `None` until someone has rated the player.
    pub fn rating(&self) -> Option<f64> {
        self.attributes
            .overall()
            .map(|overall| overall * 5.0 / f64::from(MAX_ATTRIBUTE_RATING))
    }

    /// Case-insensitive e-mail match.
    pub fn has_email(&self, email: &str) -> bool {
        self.email
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(email))
    }
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    #[default]
    Sent,
    /// Someone enrolled with the invited e-mail.
    Registered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub email: String,
    #[serde(default)]
    pub status: InvitationStatus,
    pub sent_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Open,
    /// Registration cut off; the game can still be drawn.
    Closed,
    /// The live draw is being presented.
    Drawing,
    /// Roster assigned. Only trades may change it from here on.
    Finished,
}

impl GameStatus {
    /// Allowed status moves. `Open`/`Closed` may jump straight to `Finished`
    /// when a later game of the day is filled from the master game's overflow.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        use GameStatus::*;
        matches!(
            (self, next),
            (Open, Drawing)
                | (Open, Closed)
                | (Open, Finished)
                | (Closed, Drawing)
                | (Closed, Finished)
                | (Drawing, Finished)
        )
    }

    pub fn is_finished(self) -> bool {
        self == GameStatus::Finished
    }
}

/// A status move [`GameStatus::can_transition_to`] does not allow.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("game {game} cannot move from {from:?} to {to:?}")]
pub struct StatusError {
    pub game: GameId,
    pub from: GameStatus,
    pub to: GameStatus,
}

/// A scheduled match, generic over the player identifier it stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game<P> {
    pub id: GameId,
    pub date: NaiveDate,
    /// Only used to order games of the same day.
    pub time: NaiveTime,
    #[serde(default)]
    pub status: GameStatus,
    #[serde(default)]
    pub max_players: Option<usize>,
    /// Sign-ups for the whole day. Only meaningful on the day's first game.
    #[serde(default = "Vec::new")]
    pub registrants: Vec<P>,
    #[serde(default = "Vec::new")]
    pub drawn_players: Vec<P>,
    #[serde(default = "Vec::new")]
    pub captains: Vec<P>,
    #[serde(default)]
    pub trading_end_time: Option<DateTime<Utc>>,
}

impl<P> Game<P> {
    pub fn new(id: impl Into<GameId>, date: NaiveDate, time: NaiveTime) -> Self {
        Game {
            id: id.into(),
            date,
            time,
            status: GameStatus::Open,
            max_players: None,
            registrants: Vec::new(),
            drawn_players: Vec::new(),
            captains: Vec::new(),
            trading_end_time: None,
        }
    }

    pub fn with_max_players(mut self, max_players: usize) -> Self {
        self.max_players = Some(max_players);
        self
    }

    /// Roster capacity, falling back to `default` when unset.
    pub fn capacity_or(&self, default: usize) -> usize {
        self.max_players.unwrap_or(default)
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Move to `next`, refusing anything outside the status machine.
    pub fn set_status(&mut self, next: GameStatus) -> Result<(), StatusError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusError {
                game: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

impl<P: PartialEq> Game<P> {
    pub fn has_drawn(&self, player: &P) -> bool {
        self.drawn_players.contains(player)
    }

    pub fn is_registered(&self, player: &P) -> bool {
        self.registrants.contains(player)
    }
}

// ---------------------------------------------------------------------------
// Championships
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChampionshipStatus {
    #[default]
    Upcoming,
    Ongoing,
    Finished,
}

/// A championship listing. Plain record, no bracket logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Championship {
    pub id: ChampionshipId,
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub status: ChampionshipStatus,
    #[serde(default)]
    pub teams: Vec<String>,
}
