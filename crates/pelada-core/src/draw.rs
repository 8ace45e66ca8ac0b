// Draw engine: random roster selection for a day, overflow redistribution
// into the later games, and opening of the trading window.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Game, GameId, GameStatus, StatusError, DEFAULT_MAX_PLAYERS};
use crate::schedule::day_game_indices;

/// Default length of the trading window opened after a day is fully drawn.
pub const DEFAULT_TRADING_WINDOW_MINUTES: i64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrawError {
    #[error("no games scheduled on {day}")]
    NoGamesForDay { day: NaiveDate },

    #[error("master game {game} has no registrants")]
    NoRegistrants { game: GameId },

    #[error("the draw for {day} has already been completed")]
    DayAlreadyDrawn { day: NaiveDate },

    #[error(transparent)]
    Status(#[from] StatusError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawSettings {
    /// Capacity for games without an explicit `max_players`.
    pub default_capacity: usize,
    /// How long trading stays open once every game of a day is drawn.
    pub trading_window: TimeDelta,
}

impl Default for DrawSettings {
    fn default() -> Self {
        DrawSettings {
            default_capacity: DEFAULT_MAX_PLAYERS,
            trading_window: TimeDelta::minutes(DEFAULT_TRADING_WINDOW_MINUTES),
        }
    }
}

/// What a completed draw did to the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawOutcome<P> {
    /// Rosters handed out in this pass, master game first.
    pub assignments: Vec<(GameId, Vec<P>)>,
    /// Registrants left over once every game of the day was full.
    pub undrawn: Vec<P>,
    /// Set when this pass finished the last open game of the day.
    pub trading_end_time: Option<DateTime<Utc>>,
}

impl<P> DrawOutcome<P> {
    pub fn drawn_count(&self) -> usize {
        self.assignments.iter().map(|(_, roster)| roster.len()).sum()
    }
}

/// Fisher–Yates shuffle of the registrant pool.
pub fn shuffle_pool<P, R: Rng + ?Sized>(pool: &mut [P], rng: &mut R) {
    pool.shuffle(rng);
}

#[derive(Debug, Clone, Default)]
pub struct DrawEngine {
    settings: DrawSettings,
}

impl DrawEngine {
    pub fn new(settings: DrawSettings) -> Self {
        DrawEngine { settings }
    }

    /// Flag the master game of `day` as `Drawing` so the presentation layer
    /// can run its reveal. No players are selected here. Starting an
    /// already-started draw returns the same game.
    pub fn start_draw<P>(
        &self,
        day: NaiveDate,
        games: &mut [Game<P>],
    ) -> Result<GameId, DrawError> {
        let indices = day_game_indices(games, day);
        let &master_idx = indices.first().ok_or(DrawError::NoGamesForDay { day })?;
        if indices.iter().any(|&i| games[i].is_finished()) {
            return Err(DrawError::DayAlreadyDrawn { day });
        }

        let master = &mut games[master_idx];
        if master.registrants.is_empty() {
            return Err(DrawError::NoRegistrants {
                game: master.id.clone(),
            });
        }

        if master.status != GameStatus::Drawing {
            master.set_status(GameStatus::Drawing)?;
        }
        info!(
            "Draw started for {} on master game {} ({} registrants)",
            day,
            master.id,
            master.registrants.len()
        );
        Ok(master.id.clone())
    }

    /// Draw `registrants` into `day`'s games.
    ///
    /// One shuffle decides the whole day: the master game takes the first
    /// `capacity` ids, and each later game (in start-time order, skipping
    /// finished ones) takes the next `capacity` ids off the overflow. A later
    /// game that gets nobody keeps its status. Once every game of the day is
    /// finished, the same trading deadline is stamped on all of them.
    ///
    /// An empty pool finishes the master game with an empty roster.
    pub fn complete_draw<P, R>(
        &self,
        day: NaiveDate,
        games: &mut [Game<P>],
        registrants: &[P],
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<DrawOutcome<P>, DrawError>
    where
        P: Clone + Eq + Hash,
        R: Rng + ?Sized,
    {
        let indices = day_game_indices(games, day);
        let (&master_idx, later) = indices
            .split_first()
            .ok_or(DrawError::NoGamesForDay { day })?;
        if games[master_idx].is_finished() {
            return Err(DrawError::DayAlreadyDrawn { day });
        }

        let mut seen = HashSet::with_capacity(registrants.len());
        let mut pool: Vec<P> = registrants
            .iter()
            .filter(|p| seen.insert(*p))
            .cloned()
            .collect();
        shuffle_pool(&mut pool, rng);

        let mut overflow: VecDeque<P> = pool.into();
        let mut assignments = Vec::with_capacity(indices.len());

        let master = &mut games[master_idx];
        let take = overflow.len().min(master.capacity_or(self.settings.default_capacity));
        master.set_status(GameStatus::Finished)?;
        master.drawn_players = overflow.drain(..take).collect();
        assignments.push((master.id.clone(), master.drawn_players.clone()));
        debug!("Master game {} drew {} players", master.id, take);

        for &idx in later {
            if overflow.is_empty() {
                break;
            }
            let game = &mut games[idx];
            if game.is_finished() {
                continue;
            }
            let take = overflow.len().min(game.capacity_or(self.settings.default_capacity));
            if take == 0 {
                continue;
            }
            game.set_status(GameStatus::Finished)?;
            game.drawn_players = overflow.drain(..take).collect();
            assignments.push((game.id.clone(), game.drawn_players.clone()));
            debug!("Overflow game {} drew {} players", game.id, take);
        }

        let undrawn: Vec<P> = overflow.into_iter().collect();

        let trading_end_time = if indices.iter().all(|&i| games[i].is_finished()) {
            let end = now + self.settings.trading_window;
            for &i in &indices {
                games[i].trading_end_time = Some(end);
            }
            info!("All games on {} drawn, trading open until {}", day, end);
            Some(end)
        } else {
            info!("Draw for {} left games without players, trading not opened", day);
            None
        };

        if !undrawn.is_empty() {
            info!("{} registrants on {} did not get a place", undrawn.len(), day);
        }

        Ok(DrawOutcome {
            assignments,
            undrawn,
            trading_end_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayerId;
    use chrono::{NaiveTime, TimeZone};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    fn at(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 18, 0, 0).unwrap()
    }

    fn players(n: usize) -> Vec<PlayerId> {
        (1..=n).map(|i| PlayerId(format!("p{i}"))).collect()
    }

    fn engine() -> DrawEngine {
        DrawEngine::new(DrawSettings::default())
    }

    fn all_drawn(games: &[Game<PlayerId>]) -> Vec<PlayerId> {
        games
            .iter()
            .filter(|g| g.date == day())
            .flat_map(|g| g.drawn_players.iter().cloned())
            .collect()
    }

    #[test]
    fn start_draw_marks_master_drawing() {
        let mut games = vec![
            Game::new("g2", day(), at(20)),
            Game::new("g1", day(), at(19)),
        ];
        games[1].registrants = players(3);

        let id = engine().start_draw(day(), &mut games).unwrap();
        assert_eq!(id.as_str(), "g1");
        assert_eq!(games[1].status, GameStatus::Drawing);
        assert_eq!(games[0].status, GameStatus::Open);
        assert!(games[1].drawn_players.is_empty());
    }

    #[test]
    fn closed_master_can_still_be_drawn() {
        let mut games = vec![Game::new("g1", day(), at(19))];
        games[0].registrants = players(2);
        games[0].set_status(GameStatus::Closed).unwrap();

        let id = engine().start_draw(day(), &mut games).unwrap();
        assert_eq!(engine().start_draw(day(), &mut games), Ok(id));
        assert_eq!(games[0].status, GameStatus::Drawing);

        let pool = games[0].registrants.clone();
        let mut rng = StdRng::seed_from_u64(8);
        engine()
            .complete_draw(day(), &mut games, &pool, &mut rng, now())
            .unwrap();
        assert_eq!(games[0].status, GameStatus::Finished);
        assert_eq!(games[0].drawn_players.len(), 2);
    }

    #[test]
    fn start_draw_rejects_empty_pool_and_missing_day() {
        let mut games: Vec<Game<PlayerId>> = vec![Game::new("g1", day(), at(19))];
        assert_eq!(
            engine().start_draw(day(), &mut games),
            Err(DrawError::NoRegistrants { game: "g1".into() })
        );
        let other = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        assert_eq!(
            engine().start_draw(other, &mut games),
            Err(DrawError::NoGamesForDay { day: other })
        );
    }

    #[test]
    fn twenty_five_registrants_fill_master_then_overflow() {
        let mut games = vec![
            Game::new("g1", day(), at(19)),
            Game::new("g2", day(), at(20)),
        ];
        let pool = players(25);
        games[0].registrants = pool.clone();
        let mut rng = StdRng::seed_from_u64(7);

        let outcome = engine()
            .complete_draw(day(), &mut games, &pool, &mut rng, now())
            .unwrap();

        assert_eq!(games[0].drawn_players.len(), 20);
        assert_eq!(games[1].drawn_players.len(), 5);
        assert!(games.iter().all(|g| g.status == GameStatus::Finished));
        let end = now() + TimeDelta::minutes(30);
        assert_eq!(games[0].trading_end_time, Some(end));
        assert_eq!(games[1].trading_end_time, Some(end));
        assert_eq!(outcome.trading_end_time, Some(end));
        assert!(outcome.undrawn.is_empty());
        assert_eq!(outcome.drawn_count(), 25);
    }

    #[test]
    fn no_player_is_drawn_twice_and_none_is_lost() {
        let mut games = vec![
            Game::new("g1", day(), at(19)).with_max_players(10),
            Game::new("g2", day(), at(20)).with_max_players(10),
            Game::new("g3", day(), at(21)).with_max_players(10),
        ];
        let pool = players(34);
        let mut rng = StdRng::seed_from_u64(99);

        let outcome = engine()
            .complete_draw(day(), &mut games, &pool, &mut rng, now())
            .unwrap();

        let drawn = all_drawn(&games);
        let unique: HashSet<_> = drawn.iter().collect();
        assert_eq!(unique.len(), drawn.len());
        assert_eq!(drawn.len(), 30);
        assert_eq!(outcome.undrawn.len(), 4);

        let mut everyone: Vec<PlayerId> = drawn.into_iter().chain(outcome.undrawn).collect();
        everyone.sort();
        let mut expected = pool.clone();
        expected.sort();
        assert_eq!(everyone, expected);
    }

    #[test]
    fn capacity_respected_per_game() {
        let mut games = vec![
            Game::new("g1", day(), at(19)).with_max_players(12),
            Game::new("g2", day(), at(20)),
        ];
        let pool = players(50);
        let mut rng = StdRng::seed_from_u64(1);
        engine()
            .complete_draw(day(), &mut games, &pool, &mut rng, now())
            .unwrap();
        assert_eq!(games[0].drawn_players.len(), 12);
        assert_eq!(games[1].drawn_players.len(), 20);
    }

    #[test]
    fn partial_day_leaves_later_game_untouched_and_no_window() {
        let mut games = vec![
            Game::new("g1", day(), at(19)),
            Game::new("g2", day(), at(20)),
            Game::new("g3", day(), at(21)),
        ];
        let pool = players(25);
        let mut rng = StdRng::seed_from_u64(3);

        let outcome = engine()
            .complete_draw(day(), &mut games, &pool, &mut rng, now())
            .unwrap();

        assert_eq!(games[0].status, GameStatus::Finished);
        assert_eq!(games[1].status, GameStatus::Finished);
        assert_eq!(games[2].status, GameStatus::Open);
        assert!(games[2].drawn_players.is_empty());
        assert!(games.iter().all(|g| g.trading_end_time.is_none()));
        assert!(outcome.trading_end_time.is_none());
        assert_eq!(outcome.assignments.len(), 2);
    }

    #[test]
    fn overflow_follows_start_time_not_list_order() {
        let mut games = vec![
            Game::new("late", day(), at(21)).with_max_players(2),
            Game::new("master", day(), at(18)).with_max_players(2),
            Game::new("mid", day(), at(20)).with_max_players(2),
        ];
        let pool = players(4);
        let mut rng = StdRng::seed_from_u64(11);
        engine()
            .complete_draw(day(), &mut games, &pool, &mut rng, now())
            .unwrap();

        assert_eq!(games[1].drawn_players.len(), 2);
        assert_eq!(games[2].drawn_players.len(), 2);
        assert!(games[0].drawn_players.is_empty());
        assert_eq!(games[0].status, GameStatus::Open);
    }

    #[test]
    fn overflow_preserves_shuffle_order() {
        let mut games = vec![
            Game::new("g1", day(), at(19)).with_max_players(3),
            Game::new("g2", day(), at(20)).with_max_players(3),
        ];
        let pool = players(6);

        let mut expected = pool.clone();
        shuffle_pool(&mut expected, &mut StdRng::seed_from_u64(5));

        engine()
            .complete_draw(day(), &mut games, &pool, &mut StdRng::seed_from_u64(5), now())
            .unwrap();
        assert_eq!(games[0].drawn_players, expected[..3]);
        assert_eq!(games[1].drawn_players, expected[3..]);
    }

    #[test]
    fn duplicate_registrants_are_collapsed() {
        let mut games = vec![Game::new("g1", day(), at(19))];
        let mut pool = players(3);
        pool.push(PlayerId::from("p1"));
        let mut rng = StdRng::seed_from_u64(2);
        engine()
            .complete_draw(day(), &mut games, &pool, &mut rng, now())
            .unwrap();
        assert_eq!(games[0].drawn_players.len(), 3);
    }

    #[test]
    fn empty_pool_finishes_master_with_empty_roster() {
        let mut games: Vec<Game<PlayerId>> = vec![
            Game::new("g1", day(), at(19)),
            Game::new("g2", day(), at(20)),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = engine()
            .complete_draw(day(), &mut games, &[], &mut rng, now())
            .unwrap();
        assert_eq!(games[0].status, GameStatus::Finished);
        assert!(games[0].drawn_players.is_empty());
        assert_eq!(games[1].status, GameStatus::Open);
        assert!(outcome.trading_end_time.is_none());
    }

    #[test]
    fn completing_a_drawn_day_again_is_rejected() {
        let mut games = vec![Game::new("g1", day(), at(19))];
        let pool = players(4);
        let mut rng = StdRng::seed_from_u64(4);
        engine()
            .complete_draw(day(), &mut games, &pool, &mut rng, now())
            .unwrap();
        let before = games.clone();
        assert_eq!(
            engine().complete_draw(day(), &mut games, &pool, &mut rng, now()),
            Err(DrawError::DayAlreadyDrawn { day: day() })
        );
        assert_eq!(games, before);
    }

    #[test]
    fn other_days_are_not_touched() {
        let tomorrow = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let mut games = vec![
            Game::new("g1", day(), at(19)).with_max_players(2),
            Game::new("t1", tomorrow, at(8)),
        ];
        let pool = players(5);
        let mut rng = StdRng::seed_from_u64(8);
        let outcome = engine()
            .complete_draw(day(), &mut games, &pool, &mut rng, now())
            .unwrap();
        assert_eq!(games[1].status, GameStatus::Open);
        assert!(games[1].drawn_players.is_empty());
        assert_eq!(outcome.undrawn.len(), 3);
    }

    #[test]
    fn configured_window_length_is_used() {
        let engine = DrawEngine::new(DrawSettings {
            default_capacity: 20,
            trading_window: TimeDelta::minutes(15),
        });
        let mut games = vec![Game::new("g1", day(), at(19))];
        let pool = players(2);
        let mut rng = StdRng::seed_from_u64(6);
        let outcome = engine
            .complete_draw(day(), &mut games, &pool, &mut rng, now())
            .unwrap();
        assert_eq!(outcome.trading_end_time, Some(now() + TimeDelta::minutes(15)));
    }

    #[test]
    fn shuffle_positions_are_uniform() {
        const N: usize = 6;
        const TRIALS: usize = 60_000;
        let mut rng = StdRng::seed_from_u64(2024);
        let mut counts = [[0usize; N]; N];

        for _ in 0..TRIALS {
            let mut pool: Vec<usize> = (0..N).collect();
            shuffle_pool(&mut pool, &mut rng);
            for (pos, &id) in pool.iter().enumerate() {
                counts[id][pos] += 1;
            }
        }

        // Chi-square over N*N cells, (N-1)^2 = 25 degrees of freedom.
        // 0.999 quantile is ~52.6.
        let expected = TRIALS as f64 / N as f64;
        let chi2: f64 = counts
            .iter()
            .flat_map(|row| row.iter())
            .map(|&c| {
                let d = c as f64 - expected;
                d * d / expected
            })
            .sum();
        assert!(chi2 < 52.6, "chi-square too large: {chi2}");
    }
}
