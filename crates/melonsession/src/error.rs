//! Session error types.

use melonconf::ConfigError;

use crate::core::CoreError;
use crate::rewind::RewindError;
use crate::savestate::TransactionError;
use crate::session::SessionState;

/// Outcome of `load_rom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRomResult {
    Success,
    /// The main cartridge loaded but the Slot-2 cartridge did not. The
    /// session is usable.
    GbaLoadFailed,
    RomLoadFailed,
    /// Setup needed before the cartridge load (DSi NAND) failed.
    AuxiliarySetupFailed,
}

impl LoadRomResult {
    /// Integer code for hosts that cross an FFI boundary.
    pub fn code(self) -> i32 {
        match self {
            LoadRomResult::Success => 0,
            LoadRomResult::GbaLoadFailed => 1,
            LoadRomResult::RomLoadFailed => 2,
            LoadRomResult::AuxiliarySetupFailed => 3,
        }
    }

    /// Whether a cartridge is now running.
    pub fn is_loaded(self) -> bool {
        matches!(self, LoadRomResult::Success | LoadRomResult::GbaLoadFailed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("configuration failed: {0}")]
    Configuration(#[from] CoreError),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("{0} failed to load")]
    LoadFailure(String),

    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Rewind(#[from] RewindError),

    #[error("no ROM loaded; savestate slots need a ROM path")]
    NoRom,

    #[error("texture holds {len} pixels, a frame needs {needed}")]
    TextureTooSmall { len: usize, needed: usize },
}
