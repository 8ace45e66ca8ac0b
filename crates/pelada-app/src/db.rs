// SQLite persistence layer for club state and draw history.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use pelada_core::club::ClubSnapshot;
use pelada_core::draw::DrawOutcome;
use pelada_core::model::{GameId, PlayerId};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;

/// Keys of the `club_state` table, one per snapshot collection.
pub const KEY_PLAYERS: &str = "players";
pub const KEY_GAMES: &str = "games";
pub const KEY_CHAMPIONSHIPS: &str = "championships";
pub const KEY_TRADES: &str = "trades";
pub const KEY_INVITATIONS: &str = "invitations";

/// SQLite-backed persistence: a key-value store holding the club snapshot
/// plus an append-only log of draw assignments.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS club_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS draw_log (
                day       TEXT NOT NULL,
                game_id   TEXT NOT NULL,
                seat      INTEGER NOT NULL,
                player_id TEXT NOT NULL,
                drawn_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (game_id, seat)
            );

            CREATE INDEX IF NOT EXISTS idx_draw_log_day ON draw_log(day);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // -----------------------------------------------------------------------
    // Key-value state
    // -----------------------------------------------------------------------

    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str = serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO club_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`. `None` if the key does
    /// not exist.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT value FROM club_state WHERE key = ?1")
            .context("failed to prepare load_state query")?;

        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("failed to query club state")?;

        match rows.next() {
            Some(row_result) => {
                let json_str = row_result.context("failed to read state row")?;
                let value = serde_json::from_str(&json_str)
                    .with_context(|| format!("corrupt state value for key {key}"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Club snapshot
    // -----------------------------------------------------------------------

    /// Persist every collection of `snapshot` in a single transaction.
    pub fn save_club(&self, snapshot: &ClubSnapshot) -> Result<()> {
        let entries = [
            (KEY_PLAYERS, serde_json::to_string(&snapshot.players)),
            (KEY_GAMES, serde_json::to_string(&snapshot.games)),
            (KEY_CHAMPIONSHIPS, serde_json::to_string(&snapshot.championships)),
            (KEY_TRADES, serde_json::to_string(&snapshot.trades)),
            (KEY_INVITATIONS, serde_json::to_string(&snapshot.invitations)),
        ];

        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        for (key, json) in entries {
            let json = json.with_context(|| format!("failed to serialize {key}"))?;
            tx.execute(
                "INSERT OR REPLACE INTO club_state (key, value) VALUES (?1, ?2)",
                params![key, json],
            )
            .with_context(|| format!("failed to save {key}"))?;
        }
        tx.commit().context("failed to commit club snapshot")?;
        Ok(())
    }

    /// Load the club snapshot. `None` when nothing has been saved yet; a
    /// missing collection loads as empty.
    pub fn load_club(&self) -> Result<Option<ClubSnapshot>> {
        let players = self.load_collection(KEY_PLAYERS)?;
        let games = self.load_collection(KEY_GAMES)?;
        let championships = self.load_collection(KEY_CHAMPIONSHIPS)?;
        let trades = self.load_collection(KEY_TRADES)?;
        let invitations = self.load_collection(KEY_INVITATIONS)?;

        if players.is_none()
            && games.is_none()
            && championships.is_none()
            && trades.is_none()
            && invitations.is_none()
        {
            return Ok(None);
        }

        Ok(Some(ClubSnapshot {
            players: players.unwrap_or_default(),
            games: games.unwrap_or_default(),
            championships: championships.unwrap_or_default(),
            trades: trades.unwrap_or_default(),
            invitations: invitations.unwrap_or_default(),
        }))
    }

    fn load_collection<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Vec<T>>> {
        self.load_state(key)?
            .map(|value| {
                serde_json::from_value(value)
                    .with_context(|| format!("failed to decode saved {key}"))
            })
            .transpose()
    }

    // -----------------------------------------------------------------------
    // Draw log
    // -----------------------------------------------------------------------

    /// Append the rosters of a completed draw. Seats follow shuffle order.
    /// Re-recording the same game seat is a no-op.
    pub fn record_draw(&self, day: NaiveDate, outcome: &DrawOutcome<PlayerId>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        let day = day.to_string();
        for (game, roster) in &outcome.assignments {
            for (seat, player) in roster.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO draw_log (day, game_id, seat, player_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![day, game.as_str(), seat as i64, player.as_str()],
                )
                .context("failed to record draw seat")?;
            }
        }
        tx.commit().context("failed to commit draw log")?;
        Ok(())
    }

    /// Draw assignments of `day`, grouped per game in seat order.
    pub fn load_draw(&self, day: NaiveDate) -> Result<Vec<(GameId, Vec<PlayerId>)>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT game_id, player_id FROM draw_log
                 WHERE day = ?1
                 ORDER BY rowid",
            )
            .context("failed to prepare load_draw query")?;

        let rows = stmt
            .query_map(params![day.to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("failed to query draw log")?;

        let mut games: Vec<(GameId, Vec<PlayerId>)> = Vec::new();
        for row in rows {
            let (game, player) = row.context("failed to read draw row")?;
            match games.last_mut() {
                Some((id, roster)) if id.as_str() == game => roster.push(PlayerId(player)),
                _ => games.push((GameId(game), vec![PlayerId(player)])),
            }
        }
        Ok(games)
    }

    /// Wipe the snapshot and the draw log in one transaction.
    pub fn clear(&self) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute("DELETE FROM club_state", [])
            .context("failed to clear club state")?;
        tx.execute("DELETE FROM draw_log", [])
            .context("failed to clear draw log")?;
        tx.commit().context("failed to commit clear")?;
        Ok(())
    }
}
