//! Inspect stored chat history.

use anyhow::{Context, Result};
use mora::config::Config;
use mora::history::{create_store, HistoryStore};

fn open(config: &Config) -> Result<std::sync::Arc<dyn HistoryStore>> {
    create_store(&config.history)
        .with_context(|| format!("Failed to open history at {:?}", config.history.path))
}

pub async fn run_history_list(config: &Config) -> Result<()> {
    let store = open(config)?;
    let sessions = store.sessions().await?;

    if sessions.is_empty() {
        println!("No stored sessions.");
        return Ok(());
    }
    println!("{} session(s):", sessions.len());
    for session in sessions {
        println!("  {}", session);
    }
    Ok(())
}

pub async fn run_history_show(
    config: &Config,
    session: &str,
    limit: usize,
    json: bool,
) -> Result<()> {
    let store = open(config)?;
    let turns = store.fetch(session, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&turns)?);
        return Ok(());
    }
    if turns.is_empty() {
        println!("No turns stored for session '{}'.", session);
        return Ok(());
    }
    for turn in turns {
        println!(
            "[{}] {:>5}: {}",
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            turn.role.as_str(),
            turn.message
        );
    }
    Ok(())
}
