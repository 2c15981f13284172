//! Drive state persistence.
//!
//! Keeps a simulated drive alive across `nano402` invocations: the drive
//! is snapshotted after each command and restored before the next one.
//! Snapshots are JSON so they can be inspected and edited by hand.

use crate::error::SimError;
use nano402_common::drive::state::PowerState;
use nano402_common::od::OdIndex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One writable object and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectValue {
    pub address: OdIndex,
    pub value: i64,
}

/// Persisted state of one simulated drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveSnapshot {
    /// Format version (for migration)
    pub version: u32,
    /// Unix time of the last save, seconds
    pub saved_at: u64,
    pub node_id: u8,
    pub power_state: PowerState,
    /// Simulated clock
    pub clock_ms: u64,
    pub position_actual: i32,
    /// A reference run has completed
    pub homed: bool,
    /// Writable objects, in address order
    pub objects: Vec<ObjectValue>,
    /// Raw error history, newest first
    pub error_history: Vec<u32>,
}

impl DriveSnapshot {
    pub const CURRENT_VERSION: u32 = 1;
}

/// Snapshot file manager.
pub struct StatePersistence {
    path: PathBuf,
}

impl StatePersistence {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `snapshot`, stamping the save time.
    pub fn save(&self, snapshot: &DriveSnapshot) -> Result<(), SimError> {
        debug!("Saving drive state to {:?}", self.path);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    SimError::Persistence(format!("Failed to create directory: {e}"))
                })?;
            }
        }

        let mut snapshot = snapshot.clone();
        snapshot.saved_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let file = File::create(&self.path)
            .map_err(|e| SimError::Persistence(format!("Failed to create state file: {e}")))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &snapshot)
            .map_err(|e| SimError::Persistence(format!("Failed to serialize state: {e}")))?;

        info!(
            "Saved node {} in {} to {:?}",
            snapshot.node_id, snapshot.power_state, self.path
        );
        Ok(())
    }

    /// Read the snapshot. `None` when there is no file or the file has an
    /// older format.
    pub fn load(&self) -> Result<Option<DriveSnapshot>, SimError> {
        debug!("Loading drive state from {:?}", self.path);

        if !self.path.exists() {
            debug!("State file does not exist, starting fresh");
            return Ok(None);
        }

        let file = File::open(&self.path)
            .map_err(|e| SimError::Persistence(format!("Failed to open state file: {e}")))?;
        let snapshot: DriveSnapshot = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SimError::Persistence(format!("Failed to deserialize state: {e}")))?;

        if snapshot.version != DriveSnapshot::CURRENT_VERSION {
            warn!(
                "State file version {} differs from current {}, starting fresh",
                snapshot.version,
                DriveSnapshot::CURRENT_VERSION
            );
            return Ok(None);
        }

        info!(
            "Loaded node {} in {} from {:?}",
            snapshot.node_id, snapshot.power_state, self.path
        );
        Ok(Some(snapshot))
    }

    pub fn delete(&self) -> Result<(), SimError> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| SimError::Persistence(format!("Failed to delete state file: {e}")))?;
            info!("Deleted state file {:?}", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::drive::SimulatedDrive;
    use nano402_common::od;
    use tempfile::tempdir;

    fn snapshot() -> DriveSnapshot {
        DriveSnapshot {
            version: DriveSnapshot::CURRENT_VERSION,
            saved_at: 0,
            node_id: 1,
            power_state: PowerState::SwitchedOn,
            clock_ms: 1200,
            position_actual: -40,
            homed: true,
            objects: vec![ObjectValue {
                address: od::PROFILE_VELOCITY,
                value: 300,
            }],
            error_history: vec![0x0001_2310],
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let persistence = StatePersistence::new(dir.path().join("drive.json"));
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_stamps_time() {
        let dir = tempdir().unwrap();
        let persistence = StatePersistence::new(dir.path().join("nested/drive.json"));

        persistence.save(&snapshot()).unwrap();
        let loaded = persistence.load().unwrap().unwrap();

        assert!(loaded.saved_at > 0);
        assert_eq!(
            DriveSnapshot {
                saved_at: 0,
                ..loaded
            },
            snapshot()
        );
    }

    #[test]
    fn other_versions_start_fresh() {
        let dir = tempdir().unwrap();
        let persistence = StatePersistence::new(dir.path().join("drive.json"));
        persistence
            .save(&DriveSnapshot {
                version: 0,
                ..snapshot()
            })
            .unwrap();
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drive.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            StatePersistence::new(&path).load(),
            Err(SimError::Persistence(_))
        ));
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempdir().unwrap();
        let persistence = StatePersistence::new(dir.path().join("drive.json"));
        persistence.save(&snapshot()).unwrap();
        persistence.delete().unwrap();
        assert!(!persistence.path().exists());
        persistence.delete().unwrap();
    }

    #[test]
    fn drive_survives_a_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let persistence = StatePersistence::new(dir.path().join("drive.json"));

        let drive = SimulatedDrive::new(SimulationConfig::default());
        drive.restore(&snapshot());
        persistence.save(&drive.snapshot()).unwrap();

        let revived = SimulatedDrive::new(SimulationConfig::default());
        revived.restore(&persistence.load().unwrap().unwrap());

        assert_eq!(revived.power_state(), PowerState::SwitchedOn);
        assert_eq!(revived.value(od::PROFILE_VELOCITY), Some(300));
        assert_eq!(revived.value(od::POSITION_ACTUAL), Some(-40));
        assert_eq!(revived.now(), std::time::Duration::from_millis(1200));
    }
}
