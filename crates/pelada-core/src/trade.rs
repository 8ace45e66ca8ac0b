// Trade engine: roster swaps between drawn players of the same day.
//
// Proposals live in a `TradeBook` for the duration of the trading window.
// Accepting one swaps the two players and drops every other pending proposal
// that names either of them, so each player trades at most once.

use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{Game, GameId, TradeId};
use crate::schedule::trading_deadline;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TradeError {
    #[error("player {player} has no place in any finished game on {day}")]
    GameNotFoundForPlayer { player: String, day: NaiveDate },

    #[error("a player cannot trade with themselves")]
    SelfTrade,

    #[error("trading for {day} is not open")]
    TradingClosed { day: NaiveDate },

    #[error("both players are already in game {game}")]
    SameGame { game: GameId },

    #[error("player {player} has already completed a trade")]
    AlreadyTraded { player: String },

    #[error("an identical proposal is already pending")]
    DuplicateProposal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeResponse {
    Accepted,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal<P> {
    pub id: TradeId,
    pub day: NaiveDate,
    pub from_player: P,
    pub to_player: P,
    pub from_game: GameId,
    pub to_game: GameId,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
}

impl<P: PartialEq> TradeProposal<P> {
    /// Whether `player` is on either side of this proposal.
    pub fn involves(&self, player: &P) -> bool {
        &self.from_player == player || &self.to_player == player
    }
}

/// Result of a successful `respond` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResolution<P> {
    pub proposal: TradeProposal<P>,
    /// Pending proposals dropped because they named a player who just traded.
    pub invalidated: Vec<TradeId>,
}

/// The active proposal set for every open trading window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeBook<P> {
    proposals: Vec<TradeProposal<P>>,
}

impl<P> Default for TradeBook<P> {
    fn default() -> Self {
        TradeBook {
            proposals: Vec::new(),
        }
    }
}

impl<P> TradeBook<P>
where
    P: Clone + Eq + Hash + fmt::Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_proposals(proposals: Vec<TradeProposal<P>>) -> Self {
        TradeBook { proposals }
    }

    pub fn proposals(&self) -> &[TradeProposal<P>] {
        &self.proposals
    }

    pub fn get(&self, id: &TradeId) -> Option<&TradeProposal<P>> {
        self.proposals.iter().find(|t| &t.id == id)
    }

    /// Players who completed a trade (both sides of every accepted proposal).
    pub fn traded_player_ids(&self) -> Vec<P> {
        self.proposals
            .iter()
            .filter(|t| t.status == TradeStatus::Accepted)
            .flat_map(|t| [t.from_player.clone(), t.to_player.clone()])
            .collect()
    }

    pub fn has_traded(&self, player: &P) -> bool {
        self.proposals
            .iter()
            .any(|t| t.status == TradeStatus::Accepted && t.involves(player))
    }

    /// Pending proposals addressed to `player`.
    pub fn incoming<'a>(&'a self, player: &'a P) -> impl Iterator<Item = &'a TradeProposal<P>> {
        self.proposals
            .iter()
            .filter(move |t| t.status == TradeStatus::Pending && &t.to_player == player)
    }

    /// Pending proposals made by `player`.
    pub fn outgoing<'a>(&'a self, player: &'a P) -> impl Iterator<Item = &'a TradeProposal<P>> {
        self.proposals
            .iter()
            .filter(move |t| t.status == TradeStatus::Pending && &t.from_player == player)
    }

    pub fn pending_for_day(&self, day: NaiveDate) -> impl Iterator<Item = &TradeProposal<P>> {
        self.proposals
            .iter()
            .filter(move |t| t.status == TradeStatus::Pending && t.day == day)
    }

    /// Create a pending proposal for `from` to swap places with `to`.
    ///
    /// Both players must hold a place in a finished game of `day`, the day's
    /// trading window must be open at `now`, and neither player may have
    /// traded already.
    pub fn propose(
        &mut self,
        day: NaiveDate,
        from: P,
        to: P,
        games: &[Game<P>],
        now: DateTime<Utc>,
    ) -> Result<&TradeProposal<P>, TradeError> {
        if from == to {
            return Err(TradeError::SelfTrade);
        }

        let from_game = find_drawn_game(games, day, &from)?;
        let to_game = find_drawn_game(games, day, &to)?;

        if !window_open(games, day, now) {
            return Err(TradeError::TradingClosed { day });
        }
        if from_game == to_game {
            return Err(TradeError::SameGame { game: from_game });
        }
        for player in [&from, &to] {
            if self.has_traded(player) {
                return Err(TradeError::AlreadyTraded {
                    player: player.to_string(),
                });
            }
        }
        if self
            .outgoing(&from)
            .any(|t| t.to_player == to && t.day == day)
        {
            return Err(TradeError::DuplicateProposal);
        }

        let proposal = TradeProposal {
            id: TradeId(format!("trade-{}", Uuid::new_v4())),
            day,
            from_player: from,
            to_player: to,
            from_game,
            to_game,
            status: TradeStatus::Pending,
            created_at: now,
        };
        info!(
            "Trade {} proposed: {} ({}) <-> {} ({})",
            proposal.id,
            proposal.from_player,
            proposal.from_game,
            proposal.to_player,
            proposal.to_game
        );
        self.proposals.push(proposal);
        // Just pushed, so the book is non-empty.
        Ok(&self.proposals[self.proposals.len() - 1])
    }

    /// Accept or decline a pending proposal.
    ///
    /// Unknown or already-resolved ids, and proposals whose games no longer
    /// exist, return `Ok(None)` without touching anything. Declining removes
    /// the proposal. Accepting after the deadline fails with `TradingClosed`.
    pub fn respond(
        &mut self,
        id: &TradeId,
        response: TradeResponse,
        games: &mut [Game<P>],
        now: DateTime<Utc>,
    ) -> Result<Option<TradeResolution<P>>, TradeError> {
        let Some(idx) = self
            .proposals
            .iter()
            .position(|t| &t.id == id && t.status == TradeStatus::Pending)
        else {
            debug!("Ignoring response to unknown or resolved trade {}", id);
            return Ok(None);
        };

        if response == TradeResponse::Declined {
            let mut proposal = self.proposals.remove(idx);
            proposal.status = TradeStatus::Declined;
            info!("Trade {} declined", proposal.id);
            return Ok(Some(TradeResolution {
                proposal,
                invalidated: Vec::new(),
            }));
        }

        let day = self.proposals[idx].day;
        if !window_open(games, day, now) {
            return Err(TradeError::TradingClosed { day });
        }

        let proposal = &self.proposals[idx];
        let from_idx = games.iter().position(|g| g.id == proposal.from_game);
        let to_idx = games.iter().position(|g| g.id == proposal.to_game);
        let (Some(from_idx), Some(to_idx)) = (from_idx, to_idx) else {
            warn!("Trade {} references a missing game, ignoring", proposal.id);
            return Ok(None);
        };

        let from = proposal.from_player.clone();
        let to = proposal.to_player.clone();

        let from_game = &mut games[from_idx];
        from_game.drawn_players.retain(|p| p != &from);
        from_game.drawn_players.push(to.clone());

        let to_game = &mut games[to_idx];
        to_game.drawn_players.retain(|p| p != &to);
        to_game.drawn_players.push(from.clone());

        self.proposals[idx].status = TradeStatus::Accepted;
        let accepted = self.proposals[idx].clone();

        let mut invalidated = Vec::new();
        self.proposals.retain(|t| {
            let stale = t.status == TradeStatus::Pending && (t.involves(&from) || t.involves(&to));
            if stale {
                invalidated.push(t.id.clone());
            }
            !stale
        });

        info!(
            "Trade {} accepted: {} -> {}, {} -> {} ({} proposals invalidated)",
            accepted.id,
            from,
            accepted.to_game,
            to,
            accepted.from_game,
            invalidated.len()
        );

        Ok(Some(TradeResolution {
            proposal: accepted,
            invalidated,
        }))
    }

    /// Drop the pending proposals of `day` once its window is over.
    /// Accepted trades stay so `traded_player_ids` keeps reporting them.
    pub fn expire_day(&mut self, day: NaiveDate) -> Vec<TradeId> {
        let mut expired = Vec::new();
        self.proposals.retain(|t| {
            let drop = t.day == day && t.status == TradeStatus::Pending;
            if drop {
                expired.push(t.id.clone());
            }
            !drop
        });
        expired
    }
}

fn find_drawn_game<P: PartialEq + fmt::Display>(
    games: &[Game<P>],
    day: NaiveDate,
    player: &P,
) -> Result<GameId, TradeError> {
    games
        .iter()
        .find(|g| g.date == day && g.is_finished() && g.has_drawn(player))
        .map(|g| g.id.clone())
        .ok_or_else(|| TradeError::GameNotFoundForPlayer {
            player: player.to_string(),
            day,
        })
}

fn window_open<P>(games: &[Game<P>], day: NaiveDate, now: DateTime<Utc>) -> bool {
    trading_deadline(games, day).is_some_and(|end| now < end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GameStatus, PlayerId};
    use chrono::{NaiveTime, TimeDelta, TimeZone};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 18, 0, 0).unwrap()
    }

    fn pid(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    fn finished(id: &str, hour: u32, roster: &[&str]) -> Game<PlayerId> {
        let mut game = Game::new(id, day(), NaiveTime::from_hms_opt(hour, 0, 0).unwrap());
        game.status = GameStatus::Finished;
        game.drawn_players = roster.iter().map(|s| pid(s)).collect();
        game.trading_end_time = Some(now() + TimeDelta::minutes(30));
        game
    }

    /// Two finished games with an open window: g1 = [a, b, c], g2 = [x, y, z].
    fn day_games() -> Vec<Game<PlayerId>> {
        vec![
            finished("g1", 19, &["a", "b", "c"]),
            finished("g2", 20, &["x", "y", "z"]),
        ]
    }

    fn propose(
        book: &mut TradeBook<PlayerId>,
        games: &[Game<PlayerId>],
        from: &str,
        to: &str,
    ) -> TradeId {
        book.propose(day(), pid(from), pid(to), games, now())
            .unwrap()
            .id
            .clone()
    }

    #[test]
    fn propose_creates_pending_proposal() {
        let games = day_games();
        let mut book = TradeBook::new();
        let proposal = book.propose(day(), pid("a"), pid("x"), &games, now()).unwrap();
        assert_eq!(proposal.status, TradeStatus::Pending);
        assert_eq!(proposal.from_game.as_str(), "g1");
        assert_eq!(proposal.to_game.as_str(), "g2");
        assert_eq!(book.outgoing(&pid("a")).count(), 1);
        assert_eq!(book.incoming(&pid("x")).count(), 1);
        assert_eq!(games, day_games());
    }

    #[test]
    fn propose_to_undrawn_player_fails() {
        let games = day_games();
        let mut book = TradeBook::new();
        let err = book
            .propose(day(), pid("a"), pid("nobody"), &games, now())
            .unwrap_err();
        assert_eq!(
            err,
            TradeError::GameNotFoundForPlayer {
                player: "nobody".into(),
                day: day()
            }
        );
        assert!(book.proposals().is_empty());
    }

    #[test]
    fn propose_from_undrawn_player_fails() {
        let games = day_games();
        let mut book = TradeBook::new();
        let err = book
            .propose(day(), pid("ghost"), pid("x"), &games, now())
            .unwrap_err();
        assert!(matches!(err, TradeError::GameNotFoundForPlayer { .. }));
    }

    #[test]
    fn propose_ignores_unfinished_games() {
        let mut games = day_games();
        games[1].status = GameStatus::Open;
        let mut book = TradeBook::new();
        let err = book
            .propose(day(), pid("a"), pid("x"), &games, now())
            .unwrap_err();
        assert!(matches!(err, TradeError::GameNotFoundForPlayer { .. }));
    }

    #[test]
    fn propose_rejects_self_and_same_game() {
        let games = day_games();
        let mut book = TradeBook::new();
        assert_eq!(
            book.propose(day(), pid("a"), pid("a"), &games, now()).unwrap_err(),
            TradeError::SelfTrade
        );
        assert_eq!(
            book.propose(day(), pid("a"), pid("b"), &games, now()).unwrap_err(),
            TradeError::SameGame { game: "g1".into() }
        );
    }

    #[test]
    fn propose_after_deadline_fails() {
        let games = day_games();
        let mut book = TradeBook::new();
        let late = now() + TimeDelta::minutes(30);
        assert_eq!(
            book.propose(day(), pid("a"), pid("x"), &games, late).unwrap_err(),
            TradeError::TradingClosed { day: day() }
        );
    }

    #[test]
    fn propose_without_window_fails() {
        let mut games = day_games();
        for g in &mut games {
            g.trading_end_time = None;
        }
        let mut book = TradeBook::new();
        assert_eq!(
            book.propose(day(), pid("a"), pid("x"), &games, now()).unwrap_err(),
            TradeError::TradingClosed { day: day() }
        );
    }

    #[test]
    fn duplicate_pending_proposal_rejected() {
        let games = day_games();
        let mut book = TradeBook::new();
        propose(&mut book, &games, "a", "x");
        assert_eq!(
            book.propose(day(), pid("a"), pid("x"), &games, now()).unwrap_err(),
            TradeError::DuplicateProposal
        );
        // A different target is still fine.
        propose(&mut book, &games, "a", "y");
        assert_eq!(book.outgoing(&pid("a")).count(), 2);
    }

    #[test]
    fn accept_swaps_rosters() {
        let mut games = day_games();
        let mut book = TradeBook::new();
        let id = propose(&mut book, &games, "a", "x");

        let resolution = book
            .respond(&id, TradeResponse::Accepted, &mut games, now())
            .unwrap()
            .unwrap();

        assert_eq!(resolution.proposal.status, TradeStatus::Accepted);
        assert!(games[1].has_drawn(&pid("a")));
        assert!(games[0].has_drawn(&pid("x")));
        assert!(!games[0].has_drawn(&pid("a")));
        assert!(!games[1].has_drawn(&pid("x")));
        assert_eq!(games[0].drawn_players.len(), 3);
        assert_eq!(games[1].drawn_players.len(), 3);
        assert_eq!(book.traded_player_ids(), vec![pid("a"), pid("x")]);
    }

    #[test]
    fn accept_invalidates_conflicting_proposals() {
        let mut games = day_games();
        let mut book = TradeBook::new();
        let accepted = propose(&mut book, &games, "a", "x");
        let a_out = propose(&mut book, &games, "a", "y");
        let into_x = propose(&mut book, &games, "b", "x");
        let from_x = propose(&mut book, &games, "x", "c");
        let into_a = propose(&mut book, &games, "z", "a");
        let unrelated = propose(&mut book, &games, "b", "y");

        let resolution = book
            .respond(&accepted, TradeResponse::Accepted, &mut games, now())
            .unwrap()
            .unwrap();

        let mut invalidated = resolution.invalidated.clone();
        invalidated.sort();
        let mut expected = vec![a_out, into_x, from_x, into_a];
        expected.sort();
        assert_eq!(invalidated, expected);

        let remaining: Vec<&TradeId> = book.proposals().iter().map(|t| &t.id).collect();
        assert_eq!(remaining, vec![&accepted, &unrelated]);
    }

    #[test]
    fn decline_leaves_rosters_alone() {
        let mut games = day_games();
        let mut book = TradeBook::new();
        let id = propose(&mut book, &games, "a", "x");

        let resolution = book
            .respond(&id, TradeResponse::Declined, &mut games, now())
            .unwrap()
            .unwrap();

        assert_eq!(resolution.proposal.status, TradeStatus::Declined);
        assert!(book.proposals().is_empty());
        assert_eq!(games, day_games());
    }

    #[test]
    fn responding_twice_is_noop() {
        let mut games = day_games();
        let mut book = TradeBook::new();
        let id = propose(&mut book, &games, "a", "x");
        book.respond(&id, TradeResponse::Accepted, &mut games, now())
            .unwrap();
        let snapshot = games.clone();

        let again = book
            .respond(&id, TradeResponse::Accepted, &mut games, now())
            .unwrap();
        assert!(again.is_none());
        assert_eq!(games, snapshot);

        let unknown = book
            .respond(&TradeId::from("nope"), TradeResponse::Declined, &mut games, now())
            .unwrap();
        assert!(unknown.is_none());
    }

    #[test]
    fn traded_player_cannot_propose_again() {
        let mut games = day_games();
        let mut book = TradeBook::new();
        let id = propose(&mut book, &games, "a", "x");
        book.respond(&id, TradeResponse::Accepted, &mut games, now())
            .unwrap();

        // "a" now plays in g2, "b" is still in g1.
        let err = book
            .propose(day(), pid("b"), pid("a"), &games, now())
            .unwrap_err();
        assert_eq!(err, TradeError::AlreadyTraded { player: "a".into() });
    }

    #[test]
    fn accept_after_deadline_fails_but_decline_works() {
        let mut games = day_games();
        let mut book = TradeBook::new();
        let first = propose(&mut book, &games, "a", "x");
        let second = propose(&mut book, &games, "b", "y");
        let late = now() + TimeDelta::hours(1);

        assert_eq!(
            book.respond(&first, TradeResponse::Accepted, &mut games, late),
            Err(TradeError::TradingClosed { day: day() })
        );
        assert_eq!(games, day_games());
        assert!(book
            .respond(&second, TradeResponse::Declined, &mut games, late)
            .unwrap()
            .is_some());
    }

    #[test]
    fn missing_game_makes_accept_a_noop() {
        let mut games = day_games();
        let mut book = TradeBook::new();
        let id = propose(&mut book, &games, "a", "x");
        let mut g3 = games[1].clone();
        g3.id = "g3".into();
        games[1] = g3;

        let result = book
            .respond(&id, TradeResponse::Accepted, &mut games, now())
            .unwrap();
        assert!(result.is_none());
        assert_eq!(book.get(&id).unwrap().status, TradeStatus::Pending);
    }

    #[test]
    fn expire_day_drops_only_pending() {
        let mut games = day_games();
        let mut book = TradeBook::new();
        let accepted = propose(&mut book, &games, "a", "x");
        propose(&mut book, &games, "b", "y");
        propose(&mut book, &games, "c", "z");
        book.respond(&accepted, TradeResponse::Accepted, &mut games, now())
            .unwrap();
        assert_eq!(book.pending_for_day(day()).count(), 2);

        assert_eq!(book.expire_day(day()).len(), 2);
        assert_eq!(book.pending_for_day(day()).count(), 0);
        assert_eq!(book.traded_player_ids(), vec![pid("a"), pid("x")]);
    }
}
