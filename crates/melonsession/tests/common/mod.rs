//! Shared helpers for integration tests.

#![allow(dead_code)]

use anyhow::Result;
use melonconf::{EmulatorConfig, PathsConfig, RewindConfig};
use melonsession::mock::{MockCore, MockDriver};
use melonsession::{RomRequest, SessionController, TEXTURE_PIXELS};
use tempfile::TempDir;

pub type Controller = SessionController<MockCore, MockDriver>;

/// A session over a mock core running at exactly 60 fps, with config and
/// savestate directories inside a temp dir.
pub struct Harness {
    pub controller: Controller,
    pub driver: MockDriver,
    pub temp: TempDir,
    texture: Vec<u32>,
}

impl Harness {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let paths = PathsConfig {
            config_dir: temp.path().join("config"),
            savestate_dir: Some(temp.path().join("saves")),
        };
        std::fs::create_dir_all(temp.path().join("saves"))?;

        let driver = MockDriver::new();
        let controller =
            SessionController::new(MockCore::new().with_fps(60.0), driver.clone(), paths);

        Ok(Self {
            controller,
            driver,
            temp,
            texture: vec![0; TEXTURE_PIXELS],
        })
    }

    /// Configure, load `a.nds` and start running.
    pub fn running(config: EmulatorConfig) -> Result<Self> {
        let mut harness = Self::new()?;
        harness.controller.configure(config)?;
        harness
            .controller
            .load_rom(RomRequest::new("/roms/a.nds", "/roms/a.sav"))?;
        harness.controller.start()?;
        Ok(harness)
    }

    pub fn run_frames(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.controller.run_frame(&mut self.texture)?;
        }
        Ok(())
    }

    pub fn texture(&self) -> &[u32] {
        &self.texture
    }

    pub fn rewind_frames(&self) -> Vec<u64> {
        self.controller.rewind().entries().map(|e| e.frame()).collect()
    }
}

/// Emulator config with rewind enabled at the given spacing and duration.
pub fn rewind_config(period_seconds: u32, window_seconds: u32) -> EmulatorConfig {
    EmulatorConfig {
        rewind: RewindConfig {
            enabled: true,
            period_seconds,
            window_seconds,
            ..Default::default()
        },
        ..Default::default()
    }
}
