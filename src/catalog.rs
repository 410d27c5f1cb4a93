//! Room catalog seeding.
//!
//! Rooms are owned by an external catalog; at startup the server can load a
//! JSON export of it (`[{id, name, capacity, description}]`) and register any
//! room the ledger does not know yet.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::ledger::{Ledger, LedgerError};
use crate::model::{Room, RoomId};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("reading {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Deserialize)]
struct RoomEntry {
    id: RoomId,
    name: String,
    #[serde(default)]
    capacity: u32,
    #[serde(default)]
    description: String,
}

impl From<RoomEntry> for Room {
    fn from(e: RoomEntry) -> Self {
        Room {
            id: e.id,
            name: e.name,
            capacity: e.capacity,
            description: e.description,
        }
    }
}

pub fn parse_rooms(json: &str) -> Result<Vec<Room>, serde_json::Error> {
    let entries: Vec<RoomEntry> = serde_json::from_str(json)?;
    Ok(entries.into_iter().map(Room::from).collect())
}

pub fn load_rooms(path: &Path) -> Result<Vec<Room>, CatalogError> {
    let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rooms(&json).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Register rooms the ledger does not know yet. Returns how many were added.
pub async fn seed_rooms(ledger: &Ledger, rooms: Vec<Room>) -> Result<usize, CatalogError> {
    let mut added = 0;
    for room in rooms {
        match ledger.create_room(room).await {
            Ok(()) => added += 1,
            Err(LedgerError::RoomExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    info!("catalog seed: {added} rooms added, {} total", ledger.room_count());
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerOptions;

    const ROOMS_JSON: &str = r#"[
        {"id": 1, "name": "Atlas", "capacity": 8, "description": "Projector"},
        {"id": 2, "name": "Borealis", "capacity": 4},
        {"id": 3, "name": "Cygnus"}
    ]"#;

    #[test]
    fn parse_fills_defaults() {
        let rooms = parse_rooms(ROOMS_JSON).unwrap();
        assert_eq!(rooms.len(), 3);
        assert_eq!(rooms[0].description, "Projector");
        assert_eq!(rooms[1].description, "");
        assert_eq!(rooms[2].capacity, 0);
    }

    #[test]
    fn parse_rejects_missing_name() {
        assert!(parse_rooms(r#"[{"id": 1}]"#).is_err());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("roomledger_no_such_rooms.json");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(load_rooms(&path), Err(CatalogError::Io { .. })));
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let dir = std::env::temp_dir().join("roomledger_test_catalog");
        std::fs::create_dir_all(&dir).unwrap();
        let wal = dir.join("seed.wal");
        let _ = std::fs::remove_file(&wal);
        let file = dir.join("rooms.json");
        std::fs::write(&file, ROOMS_JSON).unwrap();

        let ledger = Ledger::open(&wal, LedgerOptions::default()).unwrap();
        let rooms = load_rooms(&file).unwrap();
        assert_eq!(seed_rooms(&ledger, rooms.clone()).await.unwrap(), 3);
        assert_eq!(seed_rooms(&ledger, rooms).await.unwrap(), 0);
        assert_eq!(ledger.room_count(), 3);
    }
}
