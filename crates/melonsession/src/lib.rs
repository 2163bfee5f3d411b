//! Session lifecycle for a melonDS emulation core.
//!
//! The crate sits between a host application and the core. It does no
//! emulation itself; it owns the session state machine, backup-guarded
//! savestate transactions, a rolling rewind window and the audio endpoints.
//!
//! ```text
//! host ──▶ SessionController ──▶ EmulatorCore (frames, state blobs)
//!              │    │                 │
//!              │    │                 └──▶ AudioSource ──▶ output RT callback
//!              │    └──▶ RewindWindow ──▶ SavestateManager (memory targets)
//!              └──▶ AudioEndpointManager ◀── driver fault queue
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use melonconf::MelonConfig;
//! use melonsession::{RomRequest, SessionController};
//!
//! let config = MelonConfig::load()?;
//! melonsession::telemetry::init(&config.infra.telemetry);
//!
//! let mut session = SessionController::new(core, driver, config.infra.paths.clone());
//! session.configure(config.emulator)?;
//! session.load_rom(RomRequest::new("game.nds", "game.sav"))?;
//! session.start()?;
//! loop {
//!     session.run_frame(&mut texture)?;
//! }
//! ```

pub mod audio;
pub mod core;
pub mod error;
pub mod frame_clock;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod rewind;
pub mod savestate;
pub mod session;
pub mod telemetry;

pub use audio::{AudioDriver, AudioEndpointManager, AudioNotice, AudioStream, StreamParams};
pub use crate::core::{AudioSource, Cheat, CoreError, CoreSetup, EmulatorCore, TEXTURE_PIXELS};
pub use error::{LoadRomResult, SessionError};
pub use frame_clock::FrameClock;
pub use rewind::{RewindEntry, RewindError, RewindPolicy, RewindWindow};
pub use savestate::{
    slot_path, FileTarget, MemoryTarget, SavestateManager, SavestateTarget, TransactionError,
};
pub use session::{RomRequest, RunMode, SessionController, SessionState};
