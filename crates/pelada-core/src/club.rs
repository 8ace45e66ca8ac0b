// Club state: the single owner of players, games, championships,
// invitations and trade proposals. Every mutation goes through a method here so the engines always
// see a consistent snapshot.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::draw::{DrawEngine, DrawError, DrawOutcome, DrawSettings};
use crate::model::{
    AttributeRating, Attributes, Championship, ChampionshipId, ChampionshipStatus, Game, GameId,
    Invitation, InvitationId, InvitationStatus, PhysicalCondition, Player, PlayerId,
    PlayerStatus, Position, Role, TradeId,
};
use crate::schedule::{self, ScheduleError};
use crate::stats::{self, PlayerProfile, PlayerStats, RankingEntry, RankingMetric};
use crate::trade::{TradeBook, TradeError, TradeProposal, TradeResolution, TradeResponse};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClubError {
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("unknown game {0}")]
    UnknownGame(GameId),

    #[error("unknown championship {0}")]
    UnknownChampionship(ChampionshipId),

    #[error("player {0} is not allowed to register for games")]
    NotEligible(PlayerId),

    #[error("membership number or e-mail already in use: {0}")]
    DuplicateMember(String),

    #[error("captain {player} was not drawn into game {game}")]
    CaptainNotDrawn { player: PlayerId, game: GameId },

    #[error("game capacity must be greater than 0")]
    InvalidCapacity,

    #[error("{0} already belongs to a member")]
    AlreadyMember(String),

    #[error("{0} has already been invited")]
    AlreadyInvited(String),

    #[error("player {0} cannot rate themselves")]
    SelfRating(PlayerId),

    #[error("ratings for player {0} must be between 0 and 10")]
    InvalidRating(PlayerId),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Draw(#[from] DrawError),

    #[error(transparent)]
    Trade(#[from] TradeError),
}

/// Details supplied when someone signs up for the club.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub name: String,
    pub nickname: String,
    pub position: Position,
    pub membership_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub physical_condition: Option<PhysicalCondition>,
}

/// Editable championship fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionshipDetails {
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub status: ChampionshipStatus,
}

/// One rater's marks for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRating {
    pub player: PlayerId,
    #[serde(flatten)]
    pub rating: AttributeRating,
}

/// Everything the club persists, one collection per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClubSnapshot {
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub games: Vec<Game<PlayerId>>,
    #[serde(default)]
    pub championships: Vec<Championship>,
    #[serde(default)]
    pub trades: Vec<TradeProposal<PlayerId>>,
    #[serde(default)]
    pub invitations: Vec<Invitation>,
}

#[derive(Debug, Clone, Default)]
pub struct Club {
    players: Vec<Player>,
    games: Vec<Game<PlayerId>>,
    championships: Vec<Championship>,
    invitations: Vec<Invitation>,
    trades: TradeBook<PlayerId>,
    draw: DrawEngine,
}

impl Club {
    pub fn new(settings: DrawSettings) -> Self {
        Club {
            draw: DrawEngine::new(settings),
            ..Default::default()
        }
    }

    pub fn from_snapshot(snapshot: ClubSnapshot, settings: DrawSettings) -> Self {
        Club {
            players: snapshot.players,
            games: snapshot.games,
            championships: snapshot.championships,
            invitations: snapshot.invitations,
            trades: TradeBook::from_proposals(snapshot.trades),
            draw: DrawEngine::new(settings),
        }
    }

    pub fn snapshot(&self) -> ClubSnapshot {
        ClubSnapshot {
            players: self.players.clone(),
            games: self.games.clone(),
            championships: self.championships.clone(),
            trades: self.trades.proposals().to_vec(),
            invitations: self.invitations.clone(),
        }
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn games(&self) -> &[Game<PlayerId>] {
        &self.games
    }

    pub fn championships(&self) -> &[Championship] {
        &self.championships
    }

    /// Newest first.
    pub fn invitations(&self) -> &[Invitation] {
        &self.invitations
    }

    pub fn trades(&self) -> &TradeBook<PlayerId> {
        &self.trades
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn game(&self, id: &GameId) -> Option<&Game<PlayerId>> {
        self.games.iter().find(|g| &g.id == id)
    }

    fn player_mut(&mut self, id: &PlayerId) -> Result<&mut Player, ClubError> {
        self.players
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| ClubError::UnknownPlayer(id.clone()))
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Add a pending member. An admin has to approve them before they can
    /// register for games. Invitations sent to the same e-mail are marked
    /// as registered.
    pub fn enroll_player(&mut self, enrollment: Enrollment) -> Result<PlayerId, ClubError> {
        let taken = self.players.iter().any(|p| {
            p.membership_number == enrollment.membership_number
                || enrollment.email.as_deref().is_some_and(|email| p.has_email(email))
        });
        if taken {
            return Err(ClubError::DuplicateMember(enrollment.membership_number));
        }

        if let Some(email) = enrollment.email.as_deref() {
            for invitation in self
                .invitations
                .iter_mut()
                .filter(|i| i.email.eq_ignore_ascii_case(email))
            {
                invitation.status = InvitationStatus::Registered;
            }
        }

        let id = PlayerId(format!("player-{}", Uuid::new_v4()));
        self.players.push(Player {
            id: id.clone(),
            name: enrollment.name,
            nickname: enrollment.nickname,
            position: enrollment.position,
            membership_number: enrollment.membership_number,
            role: Role::Member,
            goals: 0,
            status: PlayerStatus::Pending,
            email: enrollment.email,
            physical_condition: enrollment.physical_condition,
            attributes: Attributes::default(),
            achievements: Vec::new(),
        });
        info!("Enrolled player {} (pending approval)", id);
        Ok(id)
    }

    pub fn approve_player(&mut self, id: &PlayerId) -> Result<(), ClubError> {
        self.player_mut(id)?.status = PlayerStatus::Active;
        info!("Approved player {}", id);
        Ok(())
    }

    pub fn promote_to_admin(&mut self, id: &PlayerId) -> Result<(), ClubError> {
        self.player_mut(id)?.role = Role::Admin;
        info!("Promoted player {} to admin", id);
        Ok(())
    }

    /// Remove a player from the roster (e.g. a rejected enrollment). Their
    /// pending registrations go with them; drawn rosters are left as history.
    pub fn remove_player(&mut self, id: &PlayerId) -> Result<Player, ClubError> {
        let idx = self
            .players
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| ClubError::UnknownPlayer(id.clone()))?;
        for game in self.games.iter_mut().filter(|g| !g.is_finished()) {
            game.registrants.retain(|p| p != id);
        }
        Ok(self.players.remove(idx))
    }

    /// Invite `email` to join. Newest invitations come first.
    pub fn send_invite(
        &mut self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Invitation, ClubError> {
        let email = email.trim();
        if self.players.iter().any(|p| p.has_email(email)) {
            return Err(ClubError::AlreadyMember(email.to_string()));
        }
        if self
            .invitations
            .iter()
            .any(|i| i.email.eq_ignore_ascii_case(email))
        {
            return Err(ClubError::AlreadyInvited(email.to_string()));
        }

        let invitation = Invitation {
            id: InvitationId(format!("inv-{}", Uuid::new_v4())),
            email: email.to_string(),
            status: InvitationStatus::Sent,
            sent_at: now,
        };
        self.invitations.insert(0, invitation.clone());
        info!("Sent invitation {} to {}", invitation.id, invitation.email);
        Ok(invitation)
    }

    pub fn record_goals(&mut self, id: &PlayerId, goals: u32) -> Result<u32, ClubError> {
        let player = self.player_mut(id)?;
        player.goals = player.goals.saturating_add(goals);
        Ok(player.goals)
    }

    // -----------------------------------------------------------------------
    // Games and registration
    // -----------------------------------------------------------------------

    pub fn schedule_game(
        &mut self,
        date: NaiveDate,
        time: NaiveTime,
        max_players: Option<usize>,
    ) -> Result<GameId, ClubError> {
        if max_players == Some(0) {
            return Err(ClubError::InvalidCapacity);
        }
        let mut game = Game::new(GameId(format!("game-{}", Uuid::new_v4())), date, time);
        game.max_players = max_players;
        let id = game.id.clone();
        self.games.push(game);
        info!("Scheduled game {} on {} at {}", id, date, time);
        Ok(id)
    }

    pub fn set_captains(
        &mut self,
        game_id: &GameId,
        captains: Vec<PlayerId>,
    ) -> Result<(), ClubError> {
        let game = self
            .games
            .iter_mut()
            .find(|g| &g.id == game_id)
            .ok_or_else(|| ClubError::UnknownGame(game_id.clone()))?;
        if let Some(outsider) = captains.iter().find(|c| !game.has_drawn(c)) {
            return Err(ClubError::CaptainNotDrawn {
                player: outsider.clone(),
                game: game_id.clone(),
            });
        }
        game.captains = captains;
        Ok(())
    }

    pub fn register(&mut self, player: &PlayerId, day: NaiveDate) -> Result<bool, ClubError> {
        let eligible = self
            .player(player)
            .ok_or_else(|| ClubError::UnknownPlayer(player.clone()))?
            .can_register();
        if !eligible {
            return Err(ClubError::NotEligible(player.clone()));
        }
        Ok(schedule::register(&mut self.games, day, player.clone())?)
    }

    pub fn unregister(&mut self, player: &PlayerId, day: NaiveDate) -> Result<bool, ClubError> {
        Ok(schedule::unregister(&mut self.games, day, player)?)
    }

    /// Stop sign-ups for `day`. The day can still be drawn.
    pub fn close_registration(&mut self, day: NaiveDate) -> Result<GameId, ClubError> {
        Ok(schedule::close_registration(&mut self.games, day)?)
    }

    // -----------------------------------------------------------------------
    // Draw and trading
    // -----------------------------------------------------------------------

    pub fn start_draw(&mut self, day: NaiveDate) -> Result<GameId, ClubError> {
        Ok(self.draw.start_draw(day, &mut self.games)?)
    }

    /// Run the draw for `day` using the master game's registrants as the pool.
    pub fn complete_draw<R: Rng + ?Sized>(
        &mut self,
        day: NaiveDate,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<DrawOutcome<PlayerId>, ClubError> {
        let pool = schedule::master_game(&self.games, day)
            .map(|g| g.registrants.clone())
            .ok_or(DrawError::NoGamesForDay { day })?;
        Ok(self.draw.complete_draw(day, &mut self.games, &pool, rng, now)?)
    }

    pub fn propose_trade(
        &mut self,
        day: NaiveDate,
        from: &PlayerId,
        to: &PlayerId,
        now: DateTime<Utc>,
    ) -> Result<TradeProposal<PlayerId>, ClubError> {
        let proposal = self
            .trades
            .propose(day, from.clone(), to.clone(), &self.games, now)?;
        Ok(proposal.clone())
    }

    pub fn respond_to_trade(
        &mut self,
        id: &TradeId,
        response: TradeResponse,
        now: DateTime<Utc>,
    ) -> Result<Option<TradeResolution<PlayerId>>, ClubError> {
        Ok(self.trades.respond(id, response, &mut self.games, now)?)
    }

    pub fn active_trading_days(&self, now: DateTime<Utc>) -> Vec<NaiveDate> {
        schedule::active_trading_days(&self.games, now)
    }

    /// Days whose trading deadline has passed at `now`.
    pub fn closed_trading_days(&self, now: DateTime<Utc>) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = self
            .games
            .iter()
            .filter(|g| g.trading_end_time.is_some_and(|end| end <= now))
            .map(|g| g.date)
            .collect();
        days.sort();
        days.dedup();
        days
    }

    /// Drop pending proposals of a day whose window has closed.
    pub fn expire_trading(&mut self, day: NaiveDate) -> Vec<TradeId> {
        let expired = self.trades.expire_day(day);
        if !expired.is_empty() {
            warn!(
                "Trading window for {} closed with {} pending proposals",
                day,
                expired.len()
            );
        }
        expired
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    pub fn player_stats(&self, id: &PlayerId) -> Result<PlayerStats, ClubError> {
        let player = self
            .player(id)
            .ok_or_else(|| ClubError::UnknownPlayer(id.clone()))?;
        Ok(PlayerStats::compute(player, &self.games))
    }

    pub fn ranking(&self, metric: RankingMetric) -> Vec<RankingEntry> {
        stats::ranking(&self.players, &self.games, metric)
    }

    pub fn player_profile(&self, id: &PlayerId) -> Result<PlayerProfile, ClubError> {
        let player = self
            .player(id)
            .ok_or_else(|| ClubError::UnknownPlayer(id.clone()))?;
        Ok(PlayerProfile::build(player, &self.games))
    }

    /// Add `rater`'s marks to each rated player's attribute totals. Nothing
    /// is recorded unless every rating is accepted.
    pub fn rate_players(
        &mut self,
        rater: &PlayerId,
        ratings: &[PlayerRating],
    ) -> Result<usize, ClubError> {
        if self.player(rater).is_none() {
            return Err(ClubError::UnknownPlayer(rater.clone()));
        }
        for entry in ratings {
            if &entry.player == rater {
                return Err(ClubError::SelfRating(rater.clone()));
            }
            if self.player(&entry.player).is_none() {
                return Err(ClubError::UnknownPlayer(entry.player.clone()));
            }
            if !entry.rating.is_valid() {
                return Err(ClubError::InvalidRating(entry.player.clone()));
            }
        }

        for entry in ratings {
            self.player_mut(&entry.player)?
                .attributes
                .record(&entry.rating);
        }
        debug!("Player {} rated {} players", rater, ratings.len());
        Ok(ratings.len())
    }

    // -----------------------------------------------------------------------
    // Championships
    // -----------------------------------------------------------------------

    /// Create a championship (`id == None`) or update an existing one.
    pub fn save_championship(
        &mut self,
        id: Option<&ChampionshipId>,
        details: ChampionshipDetails,
    ) -> Result<ChampionshipId, ClubError> {
        match id {
            Some(id) => {
                let existing = self
                    .championships
                    .iter_mut()
                    .find(|c| &c.id == id)
                    .ok_or_else(|| ClubError::UnknownChampionship(id.clone()))?;
                existing.name = details.name;
                existing.description = details.description;
                existing.date = details.date;
                existing.time = details.time;
                existing.status = details.status;
                Ok(id.clone())
            }
            None => {
                let id = ChampionshipId(format!("champ-{}", Uuid::new_v4()));
                self.championships.insert(
                    0,
                    Championship {
                        id: id.clone(),
                        name: details.name,
                        description: details.description,
                        date: details.date,
                        time: details.time,
                        status: details.status,
                        teams: Vec::new(),
                    },
                );
                Ok(id)
            }
        }
    }

    pub fn delete_championship(&mut self, id: &ChampionshipId) -> Result<(), ClubError> {
        let before = self.championships.len();
        self.championships.retain(|c| &c.id != id);
        if self.championships.len() == before {
            return Err(ClubError::UnknownChampionship(id.clone()));
        }
        Ok(())
    }
}
