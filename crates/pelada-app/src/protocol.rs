// Message types between the front end and the app loop.
//
// Commands arrive as JSON objects tagged by `type`; updates go back out the
// same way.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use pelada_core::club::{ChampionshipDetails, ClubSnapshot, Enrollment, PlayerRating};
use pelada_core::draw::DrawOutcome;
use pelada_core::model::{ChampionshipId, GameId, Invitation, PlayerId, TradeId};
use pelada_core::stats::{PlayerProfile, RankingEntry, RankingMetric};
use pelada_core::trade::{TradeProposal, TradeResolution, TradeResponse};
use serde::{Deserialize, Serialize};

/// Commands sent from the front end to the app loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserCommand {
    Register {
        player: PlayerId,
        day: NaiveDate,
    },
    Unregister {
        player: PlayerId,
        day: NaiveDate,
    },
    CloseRegistration {
        day: NaiveDate,
    },
    StartDraw {
        day: NaiveDate,
    },
    CompleteDraw {
        day: NaiveDate,
    },
    ProposeTrade {
        day: NaiveDate,
        from: PlayerId,
        to: PlayerId,
    },
    RespondToTrade {
        trade: TradeId,
        response: TradeResponse,
    },
    ScheduleGame {
        date: NaiveDate,
        time: NaiveTime,
        #[serde(default)]
        max_players: Option<usize>,
    },
    SetCaptains {
        game: GameId,
        captains: Vec<PlayerId>,
    },
    RecordGoals {
        player: PlayerId,
        goals: u32,
    },
    EnrollPlayer {
        #[serde(flatten)]
        enrollment: Enrollment,
    },
    ApprovePlayer {
        player: PlayerId,
    },
    /// Turn down an enrollment (or drop a member).
    RejectPlayer {
        player: PlayerId,
    },
    PromoteToAdmin {
        player: PlayerId,
    },
    SendInvite {
        email: String,
    },
    RatePlayers {
        rater: PlayerId,
        ratings: Vec<PlayerRating>,
    },
    /// Create a championship, or update it when `championship` is set.
    SaveChampionship {
        #[serde(default)]
        championship: Option<ChampionshipId>,
        #[serde(flatten)]
        details: ChampionshipDetails,
    },
    DeleteChampionship {
        championship: ChampionshipId,
    },
    Ranking {
        #[serde(default)]
        metric: RankingMetric,
    },
    Profile {
        player: PlayerId,
    },
    Snapshot,
    Quit,
}

impl UserCommand {
    /// Whether a successful run of this command changes club state.
    pub fn mutates_state(&self) -> bool {
        !matches!(
            self,
            UserCommand::Ranking { .. }
                | UserCommand::Profile { .. }
                | UserCommand::Snapshot
                | UserCommand::Quit
        )
    }
}

/// Updates sent from the app loop to the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiUpdate {
    RegistrationClosed {
        day: NaiveDate,
        game: GameId,
    },
    DrawStarted {
        day: NaiveDate,
        game: GameId,
    },
    DrawCompleted {
        day: NaiveDate,
        outcome: DrawOutcome<PlayerId>,
    },
    TradeProposed {
        proposal: TradeProposal<PlayerId>,
    },
    TradeResolved {
        resolution: TradeResolution<PlayerId>,
    },
    TradingClosed {
        day: NaiveDate,
        expired: Vec<TradeId>,
    },
    Registered {
        player: PlayerId,
        day: NaiveDate,
        registered: bool,
    },
    GameScheduled {
        game: GameId,
    },
    PlayerEnrolled {
        player: PlayerId,
    },
    PlayerRemoved {
        player: PlayerId,
    },
    InviteSent {
        invitation: Invitation,
    },
    PlayersRated {
        rater: PlayerId,
        rated: usize,
    },
    ChampionshipSaved {
        championship: ChampionshipId,
    },
    Ranking {
        metric: RankingMetric,
        entries: Vec<RankingEntry>,
    },
    Profile {
        profile: PlayerProfile,
    },
    StateSnapshot {
        snapshot: ClubSnapshot,
        at: DateTime<Utc>,
    },
    Rejected {
        reason: String,
    },
    Ack,
}
