// Application state and orchestration logic.
//
// The event loop applies front-end commands to the club, persists the result
// after every mutation, and closes trading windows as their deadlines pass.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use pelada_core::club::{Club, ClubError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::protocol::{UiUpdate, UserCommand};

/// How often the loop looks for trading windows that have just closed.
pub const TRADING_CHECK_INTERVAL: Duration = Duration::from_secs(15);

pub struct AppState {
    pub config: Config,
    pub club: Club,
    pub db: Database,
    rng: StdRng,
    /// Days whose trading close has already been announced.
    closed_days: BTreeSet<NaiveDate>,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Self {
        let rng = match config.draw.seed {
            Some(seed) => {
                info!("Draw RNG seeded with {}", seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_os_rng(),
        };
        let club = Club::new(config.draw_settings());

        AppState {
            config,
            club,
            db,
            rng,
            closed_days: BTreeSet::new(),
        }
    }

    /// Apply one command and report what happened. Failures come back as
    /// `UiUpdate::Rejected` and leave the club untouched.
    pub fn handle_command(&mut self, cmd: UserCommand, now: DateTime<Utc>) -> UiUpdate {
        let mutates = cmd.mutates_state();
        match self.apply(cmd, now) {
            Ok(update) => {
                if mutates {
                    self.persist();
                }
                update
            }
            Err(e) => {
                warn!("Command rejected: {}", e);
                UiUpdate::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn apply(&mut self, cmd: UserCommand, now: DateTime<Utc>) -> Result<UiUpdate, ClubError> {
        match cmd {
            UserCommand::Register { player, day } => {
                let registered = self.club.register(&player, day)?;
                Ok(UiUpdate::Registered {
                    player,
                    day,
                    registered,
                })
            }
            UserCommand::Unregister { player, day } => {
                self.club.unregister(&player, day)?;
                Ok(UiUpdate::Registered {
                    player,
                    day,
                    registered: false,
                })
            }
            UserCommand::CloseRegistration { day } => {
                let game = self.club.close_registration(day)?;
                Ok(UiUpdate::RegistrationClosed { day, game })
            }
            UserCommand::StartDraw { day } => {
                let game = self.club.start_draw(day)?;
                Ok(UiUpdate::DrawStarted { day, game })
            }
            UserCommand::CompleteDraw { day } => {
                let outcome = self.club.complete_draw(day, &mut self.rng, now)?;
                if let Err(e) = self.db.record_draw(day, &outcome) {
                    error!("Failed to record draw for {}: {:#}", day, e);
                }
                Ok(UiUpdate::DrawCompleted { day, outcome })
            }
            UserCommand::ProposeTrade { day, from, to } => {
                let proposal = self.club.propose_trade(day, &from, &to, now)?;
                Ok(UiUpdate::TradeProposed { proposal })
            }
            UserCommand::RespondToTrade { trade, response } => {
                match self.club.respond_to_trade(&trade, response, now)? {
                    Some(resolution) => Ok(UiUpdate::TradeResolved { resolution }),
                    None => {
                        debug!("Trade {} was already resolved or unknown", trade);
                        Ok(UiUpdate::Ack)
                    }
                }
            }
            UserCommand::ScheduleGame {
                date,
                time,
                max_players,
            } => {
                let game = self.club.schedule_game(date, time, max_players)?;
                Ok(UiUpdate::GameScheduled { game })
            }
            UserCommand::SetCaptains { game, captains } => {
                self.club.set_captains(&game, captains)?;
                Ok(UiUpdate::Ack)
            }
            UserCommand::RecordGoals { player, goals } => {
                self.club.record_goals(&player, goals)?;
                Ok(UiUpdate::Ack)
            }
            UserCommand::EnrollPlayer { enrollment } => {
                let player = self.club.enroll_player(enrollment)?;
                Ok(UiUpdate::PlayerEnrolled { player })
            }
            UserCommand::ApprovePlayer { player } => {
                self.club.approve_player(&player)?;
                Ok(UiUpdate::Ack)
            }
            UserCommand::RejectPlayer { player } => {
                let removed = self.club.remove_player(&player)?;
                info!("Removed player {} ({})", removed.id, removed.nickname);
                Ok(UiUpdate::PlayerRemoved { player })
            }
            UserCommand::PromoteToAdmin { player } => {
                self.club.promote_to_admin(&player)?;
                Ok(UiUpdate::Ack)
            }
            UserCommand::SendInvite { email } => {
                let invitation = self.club.send_invite(&email, now)?;
                Ok(UiUpdate::InviteSent { invitation })
            }
            UserCommand::RatePlayers { rater, ratings } => {
                let rated = self.club.rate_players(&rater, &ratings)?;
                Ok(UiUpdate::PlayersRated { rater, rated })
            }
            UserCommand::SaveChampionship {
                championship,
                details,
            } => {
                let championship = self
                    .club
                    .save_championship(championship.as_ref(), details)?;
                Ok(UiUpdate::ChampionshipSaved { championship })
            }
            UserCommand::DeleteChampionship { championship } => {
                self.club.delete_championship(&championship)?;
                Ok(UiUpdate::Ack)
            }
            UserCommand::Ranking { metric } => Ok(UiUpdate::Ranking {
                metric,
                entries: self.club.ranking(metric),
            }),
            UserCommand::Profile { player } => Ok(UiUpdate::Profile {
                profile: self.club.player_profile(&player)?,
            }),
            UserCommand::Snapshot => Ok(UiUpdate::StateSnapshot {
                snapshot: self.club.snapshot(),
                at: now,
            }),
            UserCommand::Quit => Ok(UiUpdate::Ack),
        }
    }

    /// Announce every day whose trading window closed by `now`, dropping its
    /// pending proposals. Each day is announced once.
    pub fn close_expired_trading(&mut self, now: DateTime<Utc>) -> Vec<UiUpdate> {
        let closed = self.club.closed_trading_days(now);
        self.closed_days.retain(|day| closed.contains(day));

        let mut updates = Vec::new();
        for day in closed {
            if !self.closed_days.insert(day) {
                continue;
            }
            let expired = self.club.expire_trading(day);
            info!("Trading closed for {}", day);
            updates.push(UiUpdate::TradingClosed { day, expired });
        }
        if updates
            .iter()
            .any(|u| matches!(u, UiUpdate::TradingClosed { expired, .. } if !expired.is_empty()))
        {
            self.persist();
        }
        updates
    }

    fn persist(&self) {
        if let Err(e) = self.db.save_club(&self.club.snapshot()) {
            error!("Failed to persist club state: {:#}", e);
        }
    }
}

/// Run the application event loop until `Quit` arrives or the command
/// channel closes.
pub async fn run(
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    let mut trading_interval = tokio::time::interval(TRADING_CHECK_INTERVAL);
    // The first tick completes immediately; consume it.
    trading_interval.tick().await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => {
                        let update = state.handle_command(cmd, Utc::now());
                        let _ = ui_tx.send(update).await;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            _ = trading_interval.tick() => {
                for update in state.close_expired_trading(Utc::now()) {
                    let _ = ui_tx.send(update).await;
                }
            }
        }
    }

    info!("Application event loop exiting");
    Ok(())
}

/// Restore club state saved by a previous session. Returns `true` when a
/// snapshot was found.
pub fn recover_from_db(state: &mut AppState) -> anyhow::Result<bool> {
    let Some(snapshot) = state.db.load_club()? else {
        info!("No saved club state, starting fresh");
        return Ok(false);
    };

    info!(
        "Restoring {} players, {} games, {} trade proposals, {} invitations",
        snapshot.players.len(),
        snapshot.games.len(),
        snapshot.trades.len(),
        snapshot.invitations.len()
    );
    state.club = Club::from_snapshot(snapshot, state.config.draw_settings());
    Ok(true)
}
