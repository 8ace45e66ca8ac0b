// Day grouping over the flat game list and master-game registration.
//
// A "day" is never stored: it is every game sharing a date. The earliest game
// of a day (the master game) holds the registrations for the whole day.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Game, GameId, GameStatus, StatusError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("no games scheduled on {day}")]
    NoGamesForDay { day: NaiveDate },

    #[error("registration for {day} is closed (master game {game} is {status:?})")]
    RegistrationClosed {
        day: NaiveDate,
        game: GameId,
        status: GameStatus,
    },

    #[error(transparent)]
    Status(#[from] StatusError),
}

/// Indices of `day`'s games, ordered by start time (ties broken by id).
pub fn day_game_indices<P>(games: &[Game<P>], day: NaiveDate) -> Vec<usize> {
    let mut indices: Vec<usize> = games
        .iter()
        .enumerate()
        .filter(|(_, g)| g.date == day)
        .map(|(i, _)| i)
        .collect();
    indices.sort_by(|&a, &b| {
        games[a]
            .time
            .cmp(&games[b].time)
            .then_with(|| games[a].id.cmp(&games[b].id))
    });
    indices
}

/// `day`'s games ordered by start time.
pub fn day_games<P>(games: &[Game<P>], day: NaiveDate) -> Vec<&Game<P>> {
    day_game_indices(games, day)
        .into_iter()
        .map(|i| &games[i])
        .collect()
}

pub fn master_game_index<P>(games: &[Game<P>], day: NaiveDate) -> Option<usize> {
    day_game_indices(games, day).first().copied()
}

/// The earliest game of `day`, if any game is scheduled.
pub fn master_game<P>(games: &[Game<P>], day: NaiveDate) -> Option<&Game<P>> {
    master_game_index(games, day).map(|i| &games[i])
}

/// Every game grouped by day, each day's games in start-time order.
pub fn group_by_day<P>(games: &[Game<P>]) -> BTreeMap<NaiveDate, Vec<&Game<P>>> {
    let mut days: BTreeMap<NaiveDate, Vec<&Game<P>>> = BTreeMap::new();
    for game in games {
        days.entry(game.date).or_default().push(game);
    }
    for day_games in days.values_mut() {
        day_games.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
    }
    days
}

/// Like [`group_by_day`] but skipping finished games; days left with no
/// game are dropped.
pub fn upcoming_days<P>(games: &[Game<P>]) -> BTreeMap<NaiveDate, Vec<&Game<P>>> {
    let mut days = group_by_day(games);
    for day_games in days.values_mut() {
        day_games.retain(|g| !g.is_finished());
    }
    days.retain(|_, g| !g.is_empty());
    days
}

/// Add `player` to the master game's registrants.
///
/// Returns `Ok(false)` when the player was already registered.
pub fn register<P: PartialEq>(
    games: &mut [Game<P>],
    day: NaiveDate,
    player: P,
) -> Result<bool, ScheduleError> {
    let idx = master_game_index(games, day).ok_or(ScheduleError::NoGamesForDay { day })?;
    let master = &mut games[idx];
    if master.status != GameStatus::Open {
        return Err(ScheduleError::RegistrationClosed {
            day,
            game: master.id.clone(),
            status: master.status,
        });
    }
    if master.registrants.contains(&player) {
        return Ok(false);
    }
    master.registrants.push(player);
    debug!("Registered player for {} on master game {}", day, master.id);
    Ok(true)
}

/// Remove `player` from the master game's registrants.
///
/// Returns `Ok(false)` when the player was not registered.
pub fn unregister<P: PartialEq>(
    games: &mut [Game<P>],
    day: NaiveDate,
    player: &P,
) -> Result<bool, ScheduleError> {
    let idx = master_game_index(games, day).ok_or(ScheduleError::NoGamesForDay { day })?;
    let master = &mut games[idx];
    if master.status != GameStatus::Open {
        return Err(ScheduleError::RegistrationClosed {
            day,
            game: master.id.clone(),
            status: master.status,
        });
    }
    let before = master.registrants.len();
    master.registrants.retain(|p| p != player);
    Ok(master.registrants.len() != before)
}

/// Cut off registration for `day`. Every open game of the day moves to
/// `Closed`; the master game must still be open. Returns the master game's id.
pub fn close_registration<P>(
    games: &mut [Game<P>],
    day: NaiveDate,
) -> Result<GameId, ScheduleError> {
    let indices = day_game_indices(games, day);
    let (&master_idx, later) = indices
        .split_first()
        .ok_or(ScheduleError::NoGamesForDay { day })?;
    games[master_idx].set_status(GameStatus::Closed)?;
    for &idx in later {
        if games[idx].status == GameStatus::Open {
            games[idx].set_status(GameStatus::Closed)?;
        }
    }
    let master = &games[master_idx];
    info!(
        "Registration closed for {} ({} registrants on master game {})",
        day,
        master.registrants.len(),
        master.id
    );
    Ok(master.id.clone())
}

/// The trading deadline stamped on `day`'s games, if the window was opened.
pub fn trading_deadline<P>(games: &[Game<P>], day: NaiveDate) -> Option<DateTime<Utc>> {
    games
        .iter()
        .filter(|g| g.date == day)
        .find_map(|g| g.trading_end_time)
}

/// Days whose trading window is still open at `now`.
pub fn active_trading_days<P>(games: &[Game<P>], now: DateTime<Utc>) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = games
        .iter()
        .filter(|g| g.trading_end_time.is_some_and(|end| end > now))
        .map(|g| g.date)
        .collect();
    days.sort();
    days.dedup();
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayerId;
    use chrono::{NaiveTime, TimeDelta, TimeZone};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn at(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn schedule() -> Vec<Game<PlayerId>> {
        vec![
            Game::new("late", day(14), at(21)),
            Game::new("other-day", day(17), at(9)),
            Game::new("early", day(14), at(19)),
            Game::new("mid", day(14), at(20)),
        ]
    }

    #[test]
    fn day_games_sorted_by_start_time() {
        let games = schedule();
        let ids: Vec<&str> = day_games(&games, day(14))
            .iter()
            .map(|g| g.id.as_str())
            .collect();
        assert_eq!(ids, vec!["early", "mid", "late"]);
    }

    #[test]
    fn master_game_is_earliest() {
        let games = schedule();
        assert_eq!(master_game(&games, day(14)).unwrap().id.as_str(), "early");
        assert!(master_game(&games, day(1)).is_none());
    }

    #[test]
    fn same_start_time_breaks_ties_by_id() {
        let games: Vec<Game<PlayerId>> = vec![
            Game::new("b", day(14), at(19)),
            Game::new("a", day(14), at(19)),
        ];
        assert_eq!(master_game(&games, day(14)).unwrap().id.as_str(), "a");
    }

    #[test]
    fn register_targets_master_game_only() {
        let mut games = schedule();
        assert!(register(&mut games, day(14), PlayerId::from("p1")).unwrap());
        let master = master_game(&games, day(14)).unwrap();
        assert_eq!(master.registrants, vec![PlayerId::from("p1")]);
        for g in games.iter().filter(|g| g.id.as_str() != "early") {
            assert!(g.registrants.is_empty());
        }
    }

    #[test]
    fn register_twice_is_noop() {
        let mut games = schedule();
        register(&mut games, day(14), PlayerId::from("p1")).unwrap();
        assert!(!register(&mut games, day(14), PlayerId::from("p1")).unwrap());
        assert_eq!(master_game(&games, day(14)).unwrap().registrants.len(), 1);
    }

    #[test]
    fn register_rejected_when_master_not_open() {
        let mut games = schedule();
        games[2].status = GameStatus::Closed;
        let err = register(&mut games, day(14), PlayerId::from("p1")).unwrap_err();
        assert!(matches!(err, ScheduleError::RegistrationClosed { .. }));
    }

    #[test]
    fn close_registration_closes_the_whole_day() {
        let mut games = schedule();
        games[0].status = GameStatus::Finished;
        register(&mut games, day(14), PlayerId::from("p1")).unwrap();

        assert_eq!(close_registration(&mut games, day(14)).unwrap().as_str(), "early");
        assert_eq!(games[2].status, GameStatus::Closed);
        assert_eq!(games[3].status, GameStatus::Closed);
        assert_eq!(games[0].status, GameStatus::Finished);
        assert_eq!(games[1].status, GameStatus::Open);

        let err = register(&mut games, day(14), PlayerId::from("p2")).unwrap_err();
        assert!(matches!(err, ScheduleError::RegistrationClosed { .. }));
        let err = unregister(&mut games, day(14), &PlayerId::from("p1")).unwrap_err();
        assert!(matches!(err, ScheduleError::RegistrationClosed { .. }));
        assert!(matches!(
            close_registration(&mut games, day(14)),
            Err(ScheduleError::Status(_))
        ));
        assert_eq!(
            close_registration(&mut games, day(1)),
            Err(ScheduleError::NoGamesForDay { day: day(1) })
        );
    }

    #[test]
    fn register_on_empty_day_fails() {
        let mut games = schedule();
        let err = register(&mut games, day(1), PlayerId::from("p1")).unwrap_err();
        assert_eq!(err, ScheduleError::NoGamesForDay { day: day(1) });
    }

    #[test]
    fn unregister_removes_and_reports() {
        let mut games = schedule();
        register(&mut games, day(14), PlayerId::from("p1")).unwrap();
        assert!(unregister(&mut games, day(14), &PlayerId::from("p1")).unwrap());
        assert!(!unregister(&mut games, day(14), &PlayerId::from("p1")).unwrap());
    }

    #[test]
    fn upcoming_days_skip_finished_games() {
        let mut games = schedule();
        games[1].status = GameStatus::Finished;
        let days = upcoming_days(&games);
        assert_eq!(days.len(), 1);
        assert_eq!(days[&day(14)].len(), 3);
    }

    #[test]
    fn active_trading_days_only_future_deadlines() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 22, 0, 0).unwrap();
        let mut games = schedule();
        for g in games.iter_mut().filter(|g| g.date == day(14)) {
            g.trading_end_time = Some(now + TimeDelta::minutes(10));
        }
        games[1].trading_end_time = Some(now - TimeDelta::minutes(1));

        assert_eq!(active_trading_days(&games, now), vec![day(14)]);
        assert_eq!(
            trading_deadline(&games, day(14)),
            Some(now + TimeDelta::minutes(10))
        );
        assert!(active_trading_days(&games, now + TimeDelta::minutes(10)).is_empty());
    }
}
