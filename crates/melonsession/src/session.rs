//! Session controller.
//!
//! The single authority over what is running. Only this type calls the core's
//! load, run and reset entry points, and every mutation happens on the thread
//! that owns it (the frame thread). Audio threads talk back only through the
//! endpoint manager's fault queue, drained in [`SessionController::run_frame`]
//! and [`SessionController::poll_events`].
//!
//! ```text
//! Uninitialized ──configure──▶ Configured ──start──▶ Running ⇄ Paused
//!       ▲                                                │
//!       └──────────────────── cleanup ◀──────────────────┘
//! ```
//!
//! `load_rom` and `boot_firmware` are legal from Configured, Running and
//! Paused; reloading mid-session changes what runs, not the lifecycle state.

use std::path::{Path, PathBuf};

use melonconf::{EmulatorConfig, MicSource, PathsConfig};
use tracing::{debug, info, warn};

use crate::audio::{AudioDriver, AudioEndpointManager, AudioNotice, INPUT_SAMPLE_RATE};
use crate::core::{Cheat, CoreSetup, EmulatorCore, SCREEN_PIXELS, TEXTURE_PIXELS};
use crate::error::{LoadRomResult, SessionError};
use crate::frame_clock::FrameClock;
use crate::rewind::{RewindPolicy, RewindWindow};
use crate::savestate::{slot_path, FileTarget, SavestateManager};

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Configured,
    Running,
    Paused,
}

/// Arguments of a cartridge load. Kept so `reset` can replay them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomRequest {
    pub rom: PathBuf,
    pub sram: PathBuf,
    /// Boot straight into the game, skipping the firmware menu.
    pub direct: bool,
    pub gba_rom: Option<PathBuf>,
    pub gba_sram: Option<PathBuf>,
}

impl RomRequest {
    pub fn new(rom: impl Into<PathBuf>, sram: impl Into<PathBuf>) -> Self {
        Self {
            rom: rom.into(),
            sram: sram.into(),
            direct: false,
            gba_rom: None,
            gba_sram: None,
        }
    }

    pub fn direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// Also insert a Slot-2 cartridge, on consoles that have the slot.
    pub fn with_gba(mut self, rom: impl Into<PathBuf>, sram: Option<PathBuf>) -> Self {
        self.gba_rom = Some(rom.into());
        self.gba_sram = sram;
        self
    }
}

/// What the session boots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Nothing loaded yet.
    #[default]
    Idle,
    /// A cartridge, with the arguments of the last successful load.
    Rom(RomRequest),
    /// Firmware menu, no cartridge.
    Firmware,
}

/// Per-session data, owned exclusively by the controller.
#[derive(Debug, Clone, Default)]
struct Session {
    mode: RunMode,
    frame: u64,
}

/// Drives one emulation session against a core and an audio driver.
pub struct SessionController<C: EmulatorCore, D: AudioDriver> {
    state: SessionState,
    core: C,
    audio: AudioEndpointManager<D>,
    paths: PathsConfig,
    config: Option<EmulatorConfig>,
    session: Session,
    savestates: SavestateManager,
    rewind: RewindWindow,
    cheats: Vec<Cheat>,
    clock: FrameClock,
    mic_buffer: Vec<i16>,
    notices: Vec<AudioNotice>,
}

impl<C: EmulatorCore, D: AudioDriver> SessionController<C, D> {
    pub fn new(core: C, driver: D, paths: PathsConfig) -> Self {
        Self {
            state: SessionState::Uninitialized,
            core,
            audio: AudioEndpointManager::new(driver),
            paths,
            config: None,
            session: Session::default(),
            savestates: SavestateManager::new(),
            rewind: RewindWindow::default(),
            cheats: Vec::new(),
            clock: FrameClock::new(),
            mic_buffer: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn run_mode(&self) -> &RunMode {
        &self.session.mode
    }

    /// Frames run since the last load, reset or rewind.
    pub fn frame(&self) -> u64 {
        self.session.frame
    }

    pub fn config(&self) -> Option<&EmulatorConfig> {
        self.config.as_ref()
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    pub fn audio(&self) -> &AudioEndpointManager<D> {
        &self.audio
    }

    pub fn rewind(&self) -> &RewindWindow {
        &self.rewind
    }

    pub fn cheats(&self) -> &[Cheat] {
        &self.cheats
    }

    /// Measured frame rate while running.
    pub fn fps(&self) -> f32 {
        self.clock.fps()
    }

    pub fn target_fps(&self) -> f32 {
        self.core.target_fps()
    }

    /// Initialise the core, audio endpoints and rewind window.
    ///
    /// Fails if the configuration is invalid or the core cannot read its
    /// firmware/BIOS assets. Nothing is retried.
    pub fn configure(&mut self, config: EmulatorConfig) -> Result<(), SessionError> {
        self.expect_state("configure", &[SessionState::Uninitialized])?;
        config.validate()?;

        self.core.set_console_type(config.console);
        self.core.init(&CoreSetup {
            console: config.console,
            firmware: &config.firmware,
            dsi: &config.dsi,
            config_dir: &self.paths.config_dir,
        })?;

        let fps = self.core.target_fps();
        self.audio.set_audio_source(self.core.audio_source());
        self.audio.setup_output(config.audio);
        self.audio.set_mic_source(config.mic_source);

        self.rewind = RewindWindow::new(RewindPolicy::from_config(&config.rewind, fps));
        self.mic_buffer = vec![0; mic_samples_per_frame(fps)];
        self.session = Session::default();

        info!(
            "session configured: {:?}, target {:.4} fps, rewind {}",
            config.console,
            fps,
            if config.rewind.enabled { "on" } else { "off" }
        );

        self.config = Some(config);
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Load a cartridge and record it as the target `reset` replays.
    ///
    /// The Slot-2 cartridge is skipped on consoles without the slot. Only a
    /// load that leaves a cartridge running replaces the recorded target.
    pub fn load_rom(&mut self, request: RomRequest) -> Result<LoadRomResult, SessionError> {
        self.expect_loadable("load_rom")?;

        let result = self.load_cartridge(&request);
        if result.is_loaded() {
            info!("loaded {} ({:?})", request.rom.display(), result);
            // Cheats belong to the previous cartridge.
            self.cheats.clear();
            self.session.mode = RunMode::Rom(request);
            self.session.frame = 0;
            self.rewind.reset();
        } else {
            warn!("failed to load {}: {:?}", request.rom.display(), result);
        }
        Ok(result)
    }

    /// Boot the firmware menu without a cartridge.
    pub fn boot_firmware(&mut self) -> Result<(), SessionError> {
        self.expect_loadable("boot_firmware")?;

        if !self.core.boot_firmware() {
            warn!("firmware failed to boot");
            return Err(SessionError::LoadFailure("firmware".to_string()));
        }

        info!("booted firmware");
        self.session.mode = RunMode::Firmware;
        self.session.frame = 0;
        self.rewind.reset();
        Ok(())
    }

    /// Begin running frames. Also resumes a paused session.
    pub fn start(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Running => Ok(()),
            SessionState::Configured | SessionState::Paused => {
                self.audio.start();
                self.clock.start();
                self.state = SessionState::Running;
                info!("session running");
                Ok(())
            }
            state => Err(SessionError::InvalidState {
                operation: "start",
                state,
            }),
        }
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Paused => Ok(()),
            SessionState::Running => {
                self.audio.pause();
                self.clock.pause();
                self.state = SessionState::Paused;
                info!("session paused at frame {}", self.session.frame);
                Ok(())
            }
            state => Err(SessionError::InvalidState {
                operation: "pause",
                state,
            }),
        }
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.expect_state("resume", &[SessionState::Paused, SessionState::Running])?;
        self.start()
    }

    /// Run exactly one frame and copy both screens into `texture`, top screen
    /// first. Returns the core's scanline count for host-side pacing.
    pub fn run_frame(&mut self, texture: &mut [u32]) -> Result<u32, SessionError> {
        self.expect_state("run_frame", &[SessionState::Running])?;
        if texture.len() < TEXTURE_PIXELS {
            return Err(SessionError::TextureTooSmall {
                len: texture.len(),
                needed: TEXTURE_PIXELS,
            });
        }

        let notices = self.audio.process_events();
        self.notices.extend(notices);

        self.audio.mic_frame(&mut self.mic_buffer);
        self.core.feed_microphone(&self.mic_buffer);

        let lines = self.core.run_frame();

        if let Some((top, bottom)) = self.core.screens() {
            texture[..SCREEN_PIXELS].copy_from_slice(&top[..SCREEN_PIXELS]);
            texture[SCREEN_PIXELS..TEXTURE_PIXELS].copy_from_slice(&bottom[..SCREEN_PIXELS]);
        }

        self.session.frame += 1;
        self.clock.frame();

        let frame = self.session.frame;
        if self.rewind.should_capture(frame) {
            self.rewind
                .capture(&mut self.savestates, &mut self.core, frame, texture);
        }

        Ok(lines)
    }

    /// Restart what is running: replay the last successful `load_rom`, or
    /// reboot the firmware.
    ///
    /// Returns false if nothing is loaded or the reload fails; the frame
    /// counter and rewind history are then left as they were.
    pub fn reset(&mut self) -> bool {
        if self.state == SessionState::Uninitialized {
            return false;
        }

        let ok = match self.session.mode.clone() {
            RunMode::Idle => false,
            RunMode::Rom(request) => {
                let result = self.load_cartridge(&request);
                if result.is_loaded() {
                    self.core.set_cheats(&self.cheats);
                    true
                } else {
                    false
                }
            }
            RunMode::Firmware => self.core.boot_firmware(),
        };

        if ok {
            self.session.frame = 0;
            self.rewind.reset();
            info!("session reset");
        } else {
            warn!("session reset failed");
        }
        ok
    }

    /// Apply audio, microphone and rewind changes without stopping emulation.
    ///
    /// Console and firmware changes only take effect after `cleanup` and a
    /// new `configure`.
    pub fn update_configuration(&mut self, config: EmulatorConfig) -> Result<(), SessionError> {
        self.expect_state(
            "update_configuration",
            &[
                SessionState::Configured,
                SessionState::Running,
                SessionState::Paused,
            ],
        )?;
        config.validate()?;

        let previous_mic = self.config.as_ref().map(|c| c.mic_source);
        if let Some(previous) = &self.config {
            if previous.console != config.console || previous.firmware != config.firmware {
                debug!("console/firmware changes apply at next configure");
            }
        }

        self.audio.reconfigure_output(config.audio);

        if previous_mic != Some(config.mic_source) || self.mic_fell_back(config.mic_source) {
            self.audio.set_mic_source(config.mic_source);
        }

        self.rewind
            .set_policy(RewindPolicy::from_config(&config.rewind, self.core.target_fps()));

        self.config = Some(config);
        Ok(())
    }

    /// Tear down the core and audio endpoints. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        if self.state == SessionState::Uninitialized {
            return;
        }

        self.audio.shutdown();
        self.core.shutdown();
        self.rewind.reset();
        self.session = Session::default();
        self.cheats.clear();
        self.clock.reset();
        self.mic_buffer = Vec::new();
        self.notices.clear();
        self.config = None;
        self.state = SessionState::Uninitialized;
        info!("session cleaned up");
    }

    /// Write a savestate to `path`. Returns the number of bytes written.
    pub fn save_state(&mut self, path: &Path) -> Result<usize, SessionError> {
        self.expect_loadable("save_state")?;
        let mut target = FileTarget::new(path);
        let written = self.savestates.save(&mut self.core, &mut target)?;
        info!("saved state to {}", path.display());
        Ok(written)
    }

    /// Load a savestate from `path`, rolling back if the core rejects it.
    pub fn load_state(&mut self, path: &Path) -> Result<(), SessionError> {
        self.expect_loadable("load_state")?;
        self.savestates.load(&mut self.core, &FileTarget::new(path))?;
        info!("loaded state from {}", path.display());
        Ok(())
    }

    /// Path of numbered slot `slot` for the loaded ROM.
    pub fn slot_path(&self, slot: u8) -> Result<PathBuf, SessionError> {
        match &self.session.mode {
            RunMode::Rom(request) => Ok(slot_path(
                &request.rom,
                slot,
                self.paths.savestate_dir.as_deref(),
            )),
            _ => Err(SessionError::NoRom),
        }
    }

    pub fn save_state_slot(&mut self, slot: u8) -> Result<usize, SessionError> {
        let path = self.slot_path(slot)?;
        self.save_state(&path)
    }

    pub fn load_state_slot(&mut self, slot: u8) -> Result<(), SessionError> {
        let path = self.slot_path(slot)?;
        self.load_state(&path)
    }

    /// Restore rewind entry `index` (0 is the oldest) and drop every newer
    /// entry. Returns the frame the session resumes from.
    pub fn rewind_to(&mut self, index: usize) -> Result<u64, SessionError> {
        self.expect_loadable("rewind_to")?;
        let frame = self
            .rewind
            .restore(&mut self.savestates, &mut self.core, index)?;
        self.session.frame = frame;
        Ok(frame)
    }

    /// Replace the active cheat list.
    pub fn set_cheats(&mut self, cheats: Vec<Cheat>) {
        debug!(
            "applying {} cheats ({} enabled)",
            cheats.len(),
            cheats.iter().filter(|c| c.enabled).count()
        );
        self.core.set_cheats(&cheats);
        self.cheats = cheats;
    }

    /// Handle pending driver faults and return audio notices raised since
    /// the last call. Hosts call this while paused, when `run_frame` is idle.
    pub fn poll_events(&mut self) -> Vec<AudioNotice> {
        let mut notices = std::mem::take(&mut self.notices);
        if self.state != SessionState::Uninitialized {
            notices.extend(self.audio.process_events());
        }
        notices
    }

    fn load_cartridge(&mut self, request: &RomRequest) -> LoadRomResult {
        let Some(config) = &self.config else {
            return LoadRomResult::RomLoadFailed;
        };
        let console = config.console;

        if console.requires_nand() {
            let prepared = config
                .dsi
                .nand
                .as_deref()
                .is_some_and(|nand| self.core.prepare_nand(nand));
            if !prepared {
                return LoadRomResult::AuxiliarySetupFailed;
            }
        }

        if !self
            .core
            .load_cartridge(&request.rom, &request.sram, request.direct)
        {
            return LoadRomResult::RomLoadFailed;
        }

        let Some(gba_rom) = &request.gba_rom else {
            return LoadRomResult::Success;
        };

        if !console.supports_gba_slot() {
            debug!("{:?} has no Slot-2, skipping {}", console, gba_rom.display());
            return LoadRomResult::Success;
        }

        if self
            .core
            .load_gba_cartridge(gba_rom, request.gba_sram.as_deref())
        {
            LoadRomResult::Success
        } else {
            warn!("Slot-2 cartridge {} failed to load", gba_rom.display());
            LoadRomResult::GbaLoadFailed
        }
    }

    /// Host microphone was requested but capture fell back to noise.
    fn mic_fell_back(&self, requested: MicSource) -> bool {
        requested.needs_capture() && self.audio.mic_source() != requested
    }

    fn expect_loadable(&self, operation: &'static str) -> Result<(), SessionError> {
        self.expect_state(
            operation,
            &[
                SessionState::Configured,
                SessionState::Running,
                SessionState::Paused,
            ],
        )
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

impl<C: EmulatorCore, D: AudioDriver> Drop for SessionController<C, D> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Microphone samples the core consumes per frame at 44.1 kHz.
fn mic_samples_per_frame(fps: f32) -> usize {
    if fps <= 0.0 {
        return 0;
    }
    (INPUT_SAMPLE_RATE as f32 / fps).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCore, MockDriver};
    use melonconf::{ConsoleType, RewindConfig};

    type Controller = SessionController<MockCore, MockDriver>;

    fn controller() -> (Controller, MockDriver) {
        let driver = MockDriver::new();
        let controller = SessionController::new(
            MockCore::new(),
            driver.clone(),
            PathsConfig::default(),
        );
        (controller, driver)
    }

    fn running() -> (Controller, MockDriver) {
        let (mut controller, driver) = controller();
        controller.configure(EmulatorConfig::default()).unwrap();
        controller
            .load_rom(RomRequest::new("/roms/a.nds", "/roms/a.sav"))
            .unwrap();
        controller.start().unwrap();
        (controller, driver)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let (mut controller, _driver) = controller();
        assert_eq!(controller.state(), SessionState::Uninitialized);

        controller.configure(EmulatorConfig::default()).unwrap();
        assert_eq!(controller.state(), SessionState::Configured);

        controller.start().unwrap();
        controller.pause().unwrap();
        assert_eq!(controller.state(), SessionState::Paused);
        controller.resume().unwrap();
        assert_eq!(controller.state(), SessionState::Running);

        controller.cleanup();
        assert_eq!(controller.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_configure_twice_rejected() {
        let (mut controller, _driver) = controller();
        controller.configure(EmulatorConfig::default()).unwrap();
        let result = controller.configure(EmulatorConfig::default());
        assert!(matches!(
            result,
            Err(SessionError::InvalidState {
                operation: "configure",
                state: SessionState::Configured
            })
        ));
    }

    #[test]
    fn test_configure_fails_on_unreadable_assets() {
        let (mut controller, driver) = controller();
        controller.core_mut().fail_init(true);

        let result = controller.configure(EmulatorConfig::default());

        assert!(matches!(result, Err(SessionError::Configuration(_))));
        assert_eq!(controller.state(), SessionState::Uninitialized);
        assert_eq!(driver.output_opens(), 0);
    }

    #[test]
    fn test_load_before_configure_rejected() {
        let (mut controller, _driver) = controller();
        let result = controller.load_rom(RomRequest::new("a.nds", "a.sav"));
        assert!(matches!(result, Err(SessionError::InvalidState { .. })));
    }

    #[test]
    fn test_run_frame_copies_screens() {
        let (mut controller, _driver) = running();
        let mut texture = vec![0u32; TEXTURE_PIXELS];

        let lines = controller.run_frame(&mut texture).unwrap();

        assert_eq!(lines, 263);
        assert_eq!(controller.frame(), 1);
        assert!(texture[..SCREEN_PIXELS].iter().all(|&p| p == 1));
        assert!(texture[SCREEN_PIXELS..].iter().all(|&p| p == !1));
    }

    #[test]
    fn test_run_frame_requires_running() {
        let (mut controller, _driver) = controller();
        controller.configure(EmulatorConfig::default()).unwrap();
        let mut texture = vec![0u32; TEXTURE_PIXELS];
        assert!(controller.run_frame(&mut texture).is_err());
    }

    #[test]
    fn test_run_frame_rejects_short_texture() {
        let (mut controller, _driver) = running();
        let mut texture = vec![0u32; SCREEN_PIXELS];
        let result = controller.run_frame(&mut texture);
        assert!(matches!(result, Err(SessionError::TextureTooSmall { .. })));
        assert_eq!(controller.frame(), 0);
    }

    #[test]
    fn test_run_frame_feeds_microphone() {
        let (mut controller, _driver) = running();
        let mut texture = vec![0u32; TEXTURE_PIXELS];
        controller.run_frame(&mut texture).unwrap();

        let fed = controller.core().mic_frames();
        assert_eq!(fed.len(), 1);
        assert_eq!(fed[0].len(), 737);
        assert!(fed[0].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_failed_load_keeps_previous_target() {
        let (mut controller, _driver) = running();
        controller.core_mut().fail_cartridge(true);

        let result = controller
            .load_rom(RomRequest::new("/roms/b.nds", "/roms/b.sav"))
            .unwrap();

        assert_eq!(result, LoadRomResult::RomLoadFailed);
        match controller.run_mode() {
            RunMode::Rom(request) => assert_eq!(request.rom, PathBuf::from("/roms/a.nds")),
            other => panic!("expected rom mode, got {other:?}"),
        }
    }

    #[test]
    fn test_dsi_nand_failure() {
        let (mut controller, _driver) = controller();
        let mut config = EmulatorConfig {
            console: ConsoleType::Dsi,
            ..Default::default()
        };
        config.dsi.nand = Some(PathBuf::from("/dsi/nand.bin"));
        controller.configure(config).unwrap();
        controller.core_mut().fail_nand(true);

        let result = controller
            .load_rom(RomRequest::new("a.nds", "a.sav"))
            .unwrap();

        assert_eq!(result, LoadRomResult::AuxiliarySetupFailed);
        assert!(controller.core().cartridge_loads().is_empty());
    }

    #[test]
    fn test_gba_failure_is_not_fatal() {
        let (mut controller, _driver) = controller();
        controller.configure(EmulatorConfig::default()).unwrap();
        controller.core_mut().fail_gba(true);

        let result = controller
            .load_rom(RomRequest::new("a.nds", "a.sav").with_gba("b.gba", None))
            .unwrap();

        assert_eq!(result, LoadRomResult::GbaLoadFailed);
        assert!(matches!(controller.run_mode(), RunMode::Rom(_)));
    }

    #[test]
    fn test_boot_firmware_and_reset() {
        let (mut controller, _driver) = controller();
        controller.configure(EmulatorConfig::default()).unwrap();
        controller.boot_firmware().unwrap();
        assert_eq!(controller.run_mode(), &RunMode::Firmware);

        assert!(controller.reset());
        assert_eq!(controller.core().firmware_boots(), 2);
    }

    #[test]
    fn test_reset_with_nothing_loaded() {
        let (mut controller, _driver) = controller();
        assert!(!controller.reset());
        controller.configure(EmulatorConfig::default()).unwrap();
        assert!(!controller.reset());
    }

    #[test]
    fn test_failed_reset_keeps_frame_counter() {
        let (mut controller, _driver) = running();
        let mut texture = vec![0u32; TEXTURE_PIXELS];
        controller.run_frame(&mut texture).unwrap();
        controller.run_frame(&mut texture).unwrap();
        let before = controller.core().snapshot();

        controller.core_mut().fail_cartridge(true);
        assert!(!controller.reset());

        assert_eq!(controller.frame(), 2);
        assert_eq!(controller.core().snapshot(), before);
    }

    #[test]
    fn test_reset_reapplies_cheats() {
        let (mut controller, _driver) = running();
        let cheats = vec![Cheat {
            enabled: true,
            code: vec![0x1234_5678, 0x0000_0063],
        }];
        controller.set_cheats(cheats.clone());
        controller.core_mut().set_cheats(&[]);

        assert!(controller.reset());
        assert_eq!(controller.core().cheats(), cheats.as_slice());
    }

    #[test]
    fn test_slot_requires_rom() {
        let (mut controller, _driver) = controller();
        controller.configure(EmulatorConfig::default()).unwrap();
        controller.boot_firmware().unwrap();
        assert!(matches!(controller.save_state_slot(1), Err(SessionError::NoRom)));
    }

    #[test]
    fn test_update_configuration_disables_rewind() {
        let (mut controller, _driver) = controller();
        let mut config = EmulatorConfig::default();
        config.rewind = RewindConfig {
            enabled: true,
            period_seconds: 1,
            window_seconds: 10,
            ..Default::default()
        };
        controller.configure(config.clone()).unwrap();
        controller
            .load_rom(RomRequest::new("a.nds", "a.sav"))
            .unwrap();
        controller.start().unwrap();

        let mut texture = vec![0u32; TEXTURE_PIXELS];
        for _ in 0..180 {
            controller.run_frame(&mut texture).unwrap();
        }
        assert_eq!(controller.rewind().len(), 3);

        config.rewind.enabled = false;
        controller.update_configuration(config).unwrap();
        assert!(controller.rewind().is_empty());
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let (mut controller, driver) = running();
        controller.cleanup();
        controller.cleanup();

        assert_eq!(controller.core().shutdown_calls(), 1);
        assert!(!driver.output_open());
        assert_eq!(controller.run_mode(), &RunMode::Idle);
    }

    #[test]
    fn test_mic_samples_per_frame() {
        assert_eq!(mic_samples_per_frame(60.0), 735);
        assert_eq!(mic_samples_per_frame(0.0), 0);
    }
}
