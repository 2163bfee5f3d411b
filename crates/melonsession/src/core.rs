//! Collaborator seams onto the emulation core.
//!
//! The session never emulates anything itself. Everything it needs from the
//! core (boot, load, run, snapshot) goes through [`EmulatorCore`], and the
//! sample stream the output callback plays comes from an [`AudioSource`]
//! handed out by the core.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use melonconf::{ConsoleType, DsiPaths, FirmwareConfig};

/// Width of one DS screen in pixels.
pub const SCREEN_WIDTH: usize = 256;
/// Height of one DS screen in pixels.
pub const SCREEN_HEIGHT: usize = 192;
/// Pixels in one screen.
pub const SCREEN_PIXELS: usize = SCREEN_WIDTH * SCREEN_HEIGHT;
/// Pixels in the combined top + bottom texture handed to the renderer.
pub const TEXTURE_PIXELS: usize = SCREEN_PIXELS * 2;

/// Native DS refresh rate.
pub const DS_TARGET_FPS: f32 = 59.8261;

/// Everything the core needs to initialise.
#[derive(Debug, Clone, Copy)]
pub struct CoreSetup<'a> {
    pub console: ConsoleType,
    pub firmware: &'a FirmwareConfig,
    pub dsi: &'a DsiPaths,
    /// Directory for firmware user settings.
    pub config_dir: &'a Path,
}

/// Errors raised by the core while initialising.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{asset} is missing or unreadable: {}", path.display())]
    AssetUnreadable { asset: &'static str, path: PathBuf },

    #[error("core initialisation failed: {0}")]
    Init(String),
}

/// One cheat code list entry. Replaces the core's active list wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cheat {
    pub enabled: bool,
    pub code: Vec<u32>,
}

/// Interleaved stereo i16 sample queue filled by the core's sound unit.
///
/// Read from the driver's real-time thread: implementations must not block
/// or allocate.
pub trait AudioSource: Send + Sync {
    /// Fill `out` with as many samples as are queued; returns how many were written.
    fn read_samples(&self, out: &mut [i16]) -> usize;
}

/// The emulation core as seen by the session.
pub trait EmulatorCore {
    /// One-time initialisation with BIOS/firmware assets.
    fn init(&mut self, setup: &CoreSetup<'_>) -> Result<(), CoreError>;

    fn set_console_type(&mut self, console: ConsoleType);

    /// Prepare the DSi NAND image. Called before every DSi cartridge load.
    fn prepare_nand(&mut self, nand: &Path) -> bool;

    fn load_cartridge(&mut self, rom: &Path, sram: &Path, direct: bool) -> bool;

    /// Load a Slot-2 GBA cartridge. Only called on consoles with the slot.
    fn load_gba_cartridge(&mut self, rom: &Path, sram: Option<&Path>) -> bool;

    /// Boot into the firmware menu without a cartridge.
    fn boot_firmware(&mut self) -> bool;

    /// Run exactly one frame, returning the scanline/cycle count for host timing.
    fn run_frame(&mut self) -> u32;

    /// Top and bottom screen of the last completed frame, `SCREEN_PIXELS` each.
    fn screens(&self) -> Option<(&[u32], &[u32])>;

    /// Write the complete core state to `sink`.
    fn serialize_state(&mut self, sink: &mut dyn io::Write) -> io::Result<()>;

    /// Replace the core state from `source`. Returns false on a structural
    /// error, in which case the core state is unspecified until restored.
    fn deserialize_state(&mut self, source: &[u8]) -> bool;

    fn set_cheats(&mut self, cheats: &[Cheat]);

    /// Hand one frame's worth of 44.1 kHz mono microphone samples to the core.
    fn feed_microphone(&mut self, samples: &[i16]);

    /// Shared handle to the core's output sample queue.
    fn audio_source(&self) -> Arc<dyn AudioSource>;

    fn target_fps(&self) -> f32 {
        DS_TARGET_FPS
    }

    fn shutdown(&mut self);
}
