use super::*;
use crate::phase::{current_phase, init_phase, FilePhaseStore};
use std::{fs, path::PathBuf};

fn scratch_dir(name: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("auction-board-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[test]
fn first_run_persists_paused() -> Result<()> {
    let store = InMemoryPhaseStore::new();
    assert_eq!(store.load()?, None);

    assert_eq!(init_phase(&store)?, AuctionPhase::Paused);
    assert_eq!(store.load_raw()?.as_deref(), Some("paused"));
    Ok(())
}

#[test]
fn init_keeps_an_existing_phase() -> Result<()> {
    let store = InMemoryPhaseStore::new();
    store.store(AuctionPhase::Active)?;

    assert_eq!(init_phase(&store)?, AuctionPhase::Active);
    assert_eq!(current_phase(&store), AuctionPhase::Active);
    Ok(())
}

#[test]
fn unrecognised_values_read_as_not_started() -> Result<()> {
    let store = InMemoryPhaseStore::new();
    for value in ["closed", "", "ACTIVE", "not-started"] {
        store.store_raw(value)?;
        assert_eq!(current_phase(&store), AuctionPhase::NotStarted, "{value:?}");
    }
    Ok(())
}

#[test]
fn file_store_survives_reopening() -> Result<()> {
    let dir = scratch_dir("reopen")?;
    let path = dir.join("status.json");

    let store = FilePhaseStore::new(&path);
    assert_eq!(store.load()?, None);
    store.store(AuctionPhase::Active)?;

    let reopened = FilePhaseStore::new(&path);
    assert_eq!(reopened.load()?, Some(AuctionPhase::Active));

    let persisted: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(persisted["auctionStatus"], "active");

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn unreadable_file_gates_bids_as_paused() -> Result<()> {
    let dir = scratch_dir("garbled")?;
    let path = dir.join("status.json");
    fs::write(&path, "{ not json")?;

    let store = FilePhaseStore::new(&path);
    assert!(store.load().is_err());
    assert_eq!(current_phase(&store), AuctionPhase::Paused);

    fs::remove_dir_all(dir)?;
    Ok(())
}
