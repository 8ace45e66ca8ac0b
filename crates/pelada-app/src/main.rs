// Pelada entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file; stdout carries protocol messages)
// 2. Load config
// 3. Open database, restore saved club state
// 4. Create mpsc channels
// 5. Spawn app logic task
// 6. Spawn stdout writer for UI updates
// 7. Forward stdin JSON lines as commands until EOF
// 8. Cleanup on exit

use pelada_app::app;
use pelada_app::config;
use pelada_app::db;
use pelada_app::protocol::{UiUpdate, UserCommand};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Pelada starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: club={}, default capacity {}, trading window {} min",
        config.club_name, config.draw.default_max_players, config.draw.trading_window_minutes
    );

    // 3. Open database and restore state
    let db = db::Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    let mut app_state = app::AppState::new(config, db);
    match app::recover_from_db(&mut app_state) {
        Ok(true) => info!("Club state restored from previous session"),
        Ok(false) => info!("Starting with an empty club"),
        Err(e) => {
            error!("Crash recovery failed: {}", e);
            return Err(e.context("crash recovery failed"));
        }
    }

    // 4. Create mpsc channels
    let (cmd_tx, cmd_rx) = mpsc::channel::<UserCommand>(64);
    let (ui_tx, mut ui_rx) = mpsc::channel::<UiUpdate>(256);

    // 5. Spawn app logic task
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(cmd_rx, ui_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    // 6. Spawn stdout writer
    let writer_handle = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(update) = ui_rx.recv().await {
            let line = match serde_json::to_string(&update) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize update: {}", e);
                    continue;
                }
            };
            if let Err(e) = stdout.write_all(format!("{line}\n").as_bytes()).await {
                error!("Failed to write update: {}", e);
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // 7. Forward stdin commands
    info!("Application ready, reading commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<UserCommand>(&line) {
            Ok(cmd) => {
                let quit = cmd == UserCommand::Quit;
                if cmd_tx.send(cmd).await.is_err() || quit {
                    break;
                }
            }
            Err(e) => warn!("Ignoring malformed command: {}", e),
        }
    }

    // 8. Cleanup: closing the command channel stops the app loop, which in
    // turn closes the update channel and lets the writer drain.
    drop(cmd_tx);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
        let _ = writer_handle.await;
    })
    .await;

    info!("Pelada shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file; stdout is reserved for updates.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("pelada.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pelada_app=info,pelada_core=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
