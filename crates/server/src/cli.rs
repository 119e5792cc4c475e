//! Command-line dispatch for non-serve maintenance commands.
//!
//! `relay-server` with no arguments serves. `replay` dumps a message's
//! persisted event log as JSON lines; `prune` runs a one-shot TTL sweep
//! over the event store.

use anyhow::Context;

use relay_core::Config;

use crate::event_store::{EventStore, FileEventStore};

/// Dispatch a non-serve subcommand. Returns false when the caller should
/// fall through to `serve`.
pub async fn dispatch(config: &Config, args: &[String]) -> anyhow::Result<bool> {
    match args.get(1).map(String::as_str) {
        Some("replay") => {
            let message_id = args
                .get(2)
                .context("usage: relay-server replay <message_id>")?;
            replay(config, message_id).await?;
            Ok(true)
        }
        Some("prune") => {
            let ttl_s = match args.get(2) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("invalid ttl seconds: {raw}"))?,
                None => config.storage.message_events_ttl_s,
            };
            prune(config, ttl_s).await?;
            Ok(true)
        }
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn print_usage() {
    println!("relay-server — background agent execution and event streaming");
    println!();
    println!("USAGE:");
    println!("  relay-server                      start the HTTP server");
    println!("  relay-server replay <message_id>  dump a message's event log as JSON lines");
    println!("  relay-server prune [ttl_seconds]  delete event logs older than the TTL");
}

async fn replay(config: &Config, message_id: &str) -> anyhow::Result<()> {
    let store = FileEventStore::new(&config.storage.data_dir)?;
    let events = store.read_all(message_id).await?;
    if events.is_empty() {
        eprintln!("no events for message {message_id}");
        return Ok(());
    }
    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }
    eprintln!("{} events", events.len());
    Ok(())
}

async fn prune(config: &Config, ttl_s: u64) -> anyhow::Result<()> {
    if ttl_s == 0 {
        eprintln!("ttl is 0 (disabled) — nothing to prune");
        return Ok(());
    }
    let store = FileEventStore::new(&config.storage.data_dir)?;
    let removed = store
        .prune_expired(std::time::Duration::from_secs(ttl_s))
        .await?;
    eprintln!("pruned {removed} event logs older than {ttl_s}s");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::for_profile("RELAY_CLI_TEST");
        config.storage.data_dir = dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_no_subcommand_falls_through_to_serve() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        assert!(!dispatch(&config, &args(&["relay-server"])).await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_requires_message_id() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let err = dispatch(&config, &args(&["relay-server", "replay"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("usage"));
    }

    #[tokio::test]
    async fn test_prune_handled_even_when_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        assert!(dispatch(&config, &args(&["relay-server", "prune"])).await.unwrap());
        assert!(dispatch(&config, &args(&["relay-server", "prune", "60"]))
            .await
            .unwrap());
        let err = dispatch(&config, &args(&["relay-server", "prune", "soon"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid ttl"));
    }
}
