//! Savestate transactions.
//!
//! A savestate is an opaque blob owned by the core. This module only wraps
//! it in a backup/rollback envelope so a corrupt or incompatible state can
//! never leave the live session half-restored.
//!
//! Load protocol:
//! ```text
//! core ──serialize──▶ backup (same medium as target)
//! target ──read──▶ core.deserialize_state()
//!        ok  ──▶ commit
//!        err ──▶ backup ──read──▶ core.deserialize_state()   (rollback)
//! backup discarded on every path
//! ```
//!
//! Targets are either files or in-memory buffers (rewind checkpoints); the
//! transaction logic is written once against [`SavestateTarget`].

use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::core::EmulatorCore;

/// Reserved file name for the pre-load backup, written next to the target.
pub const BACKUP_FILE_NAME: &str = "timewarp.mln";

/// Extension prefix for numbered savestate slots (`game.ml1`, `game.ml2`, ...).
pub const SLOT_EXTENSION_PREFIX: &str = "ml";

/// A medium a savestate can be written to and read back from.
pub trait SavestateTarget {
    /// Human readable description for logs and errors.
    fn describe(&self) -> String;

    /// Replace the target's contents with `data`.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read the whole savestate.
    fn read(&self) -> io::Result<Cow<'_, [u8]>>;

    /// A fresh target in the same medium used to hold the pre-load backup.
    fn backup(&self) -> Box<dyn SavestateTarget>;

    /// Remove the contents (used for transient backups).
    fn discard(&mut self) -> io::Result<()>;

    /// Whether this target occupies the location its own backup would use.
    fn is_backup_location(&self) -> bool {
        false
    }
}

/// Savestate stored in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    path: PathBuf,
}

impl FileTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

}

impl SavestateTarget for FileTarget {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(&self.path)?;
        file.write_all(data)?;
        file.flush()
    }

    fn read(&self) -> io::Result<Cow<'_, [u8]>> {
        fs::read(&self.path).map(Cow::Owned)
    }

    fn backup(&self) -> Box<dyn SavestateTarget> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        Box::new(FileTarget::new(dir.join(BACKUP_FILE_NAME)))
    }

    fn discard(&mut self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn is_backup_location(&self) -> bool {
        self.path.file_name() == Some(OsStr::new(BACKUP_FILE_NAME))
    }
}

/// Savestate stored in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTarget {
    data: Vec<u8>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for MemoryTarget {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl SavestateTarget for MemoryTarget {
    fn describe(&self) -> String {
        format!("memory ({} bytes)", self.data.len())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        // Reuse the existing allocation when a slot is recycled.
        self.data.clear();
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn read(&self) -> io::Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(&self.data))
    }

    fn backup(&self) -> Box<dyn SavestateTarget> {
        Box::new(MemoryTarget::new())
    }

    fn discard(&mut self) -> io::Result<()> {
        self.data = Vec::new();
        Ok(())
    }
}

/// Savestate transaction failures.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("cannot write savestate to {target}: {source}")]
    Open { target: String, source: io::Error },

    #[error("core failed to serialize its state: {0}")]
    Serialize(#[source] io::Error),

    #[error("cannot read savestate from {target}: {source}")]
    Read { target: String, source: io::Error },

    #[error("cannot back up current state before loading: {0}")]
    Backup(#[source] io::Error),

    #[error("savestate {target} is corrupt or incompatible; previous state restored")]
    Corrupt { target: String },

    #[error("savestate {target} failed to load and the backup could not be restored")]
    RollbackFailed { target: String },

    #[error("{target} is reserved for the pre-load backup")]
    ReservedTarget { target: String },
}

/// Discards the backup target however the transaction ends.
struct BackupGuard {
    target: Box<dyn SavestateTarget>,
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if let Err(e) = self.target.discard() {
            warn!("failed to discard savestate backup {}: {}", self.target.describe(), e);
        }
    }
}

/// Runs savestate transactions against a core.
///
/// Holds a scratch buffer so repeated saves (rewind capture every few
/// seconds) do not reallocate a multi-megabyte blob each time.
#[derive(Debug, Default)]
pub struct SavestateManager {
    scratch: Vec<u8>,
}

impl SavestateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the core straight into `target`. The live core is never mutated.
    ///
    /// Returns the number of bytes written.
    pub fn save<C>(
        &mut self,
        core: &mut C,
        target: &mut dyn SavestateTarget,
    ) -> Result<usize, TransactionError>
    where
        C: EmulatorCore + ?Sized,
    {
        check_not_reserved(target)?;

        self.scratch.clear();
        core.serialize_state(&mut self.scratch)
            .map_err(TransactionError::Serialize)?;

        target
            .write(&self.scratch)
            .map_err(|source| TransactionError::Open {
                target: target.describe(),
                source,
            })?;

        debug!("saved {} bytes to {}", self.scratch.len(), target.describe());
        Ok(self.scratch.len())
    }

    /// Load `target` into the core, rolling back to the pre-load state if the
    /// core rejects it.
    pub fn load<C>(
        &mut self,
        core: &mut C,
        target: &dyn SavestateTarget,
    ) -> Result<(), TransactionError>
    where
        C: EmulatorCore + ?Sized,
    {
        check_not_reserved(target)?;

        let mut backup = BackupGuard {
            target: target.backup(),
        };

        self.scratch.clear();
        core.serialize_state(&mut self.scratch)
            .map_err(TransactionError::Backup)?;
        backup
            .target
            .write(&self.scratch)
            .map_err(TransactionError::Backup)?;

        let data = target.read().map_err(|source| TransactionError::Read {
            target: target.describe(),
            source,
        })?;

        if core.deserialize_state(&data) {
            debug!("loaded savestate from {}", target.describe());
            return Ok(());
        }

        warn!(
            "savestate {} rejected by core, restoring backup {}",
            target.describe(),
            backup.target.describe()
        );

        let restored = match backup.target.read() {
            Ok(previous) => core.deserialize_state(&previous),
            Err(e) => {
                error!("backup {} unreadable: {}", backup.target.describe(), e);
                false
            }
        };

        if restored {
            Err(TransactionError::Corrupt {
                target: target.describe(),
            })
        } else {
            error!("rollback after failed load of {} did not succeed", target.describe());
            Err(TransactionError::RollbackFailed {
                target: target.describe(),
            })
        }
    }
}

fn check_not_reserved(target: &dyn SavestateTarget) -> Result<(), TransactionError> {
    if target.is_backup_location() {
        return Err(TransactionError::ReservedTarget {
            target: target.describe(),
        });
    }
    Ok(())
}

/// Path of numbered savestate `slot` for `rom`.
///
/// Slots live next to the ROM unless `dir` overrides the location.
pub fn slot_path(rom: &Path, slot: u8, dir: Option<&Path>) -> PathBuf {
    let stem = rom
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "savestate".to_string());
    let file_name = format!("{stem}.{SLOT_EXTENSION_PREFIX}{slot}");

    match dir {
        Some(dir) => dir.join(file_name),
        None => rom
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(file_name),
    }
}
