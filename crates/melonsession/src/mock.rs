//! In-process stand-ins for the emulation core and the audio driver.
//!
//! Built for this crate's unit tests and, behind the `test-util` feature,
//! for the integration tests under `tests/`. Neither double touches real hardware; both record every call
//! so tests can assert on what the session asked for.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use melonconf::ConsoleType;

use crate::audio::{
    AudioDriver, AudioStream, Direction, ErrorCallback, InputCallback, OutputCallback,
    StreamError, StreamOpenError, StreamParams,
};
use crate::core::{
    AudioSource, Cheat, CoreError, CoreSetup, EmulatorCore, DS_TARGET_FPS, SCREEN_PIXELS,
};

const STATE_MAGIC: &[u8; 4] = b"MOCK";
const STATE_LEN: usize = 4 + 8 + 8;

/// A cartridge load as the core saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeLoad {
    pub rom: PathBuf,
    pub sram: PathBuf,
    pub direct: bool,
}

/// A Slot-2 load as the core saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GbaLoad {
    pub rom: PathBuf,
    pub sram: Option<PathBuf>,
}

/// Emits a constant sample value.
#[derive(Debug, Default)]
pub struct MockAudioSource {
    level: AtomicI16,
}

impl MockAudioSource {
    pub fn set_level(&self, level: i16) {
        self.level.store(level, Ordering::Relaxed);
    }
}

impl AudioSource for MockAudioSource {
    fn read_samples(&self, out: &mut [i16]) -> usize {
        out.fill(self.level.load(Ordering::Relaxed));
        out.len()
    }
}

/// Deterministic core whose whole observable state is two counters.
///
/// `run_frame` bumps both; `serialize_state` writes them behind a magic tag.
/// A blob without the tag is rejected and, like a real core, leaves the state
/// scrambled until someone restores it.
#[derive(Debug)]
pub struct MockCore {
    value: u64,
    frames: u64,
    console: Option<ConsoleType>,
    fps: f32,
    top: Vec<u32>,
    bottom: Vec<u32>,

    init_calls: usize,
    shutdown_calls: usize,
    deserialize_calls: usize,
    firmware_boots: usize,
    cartridge_loads: Vec<CartridgeLoad>,
    gba_loads: Vec<GbaLoad>,
    nand_preparations: Vec<PathBuf>,
    cheats: Vec<Cheat>,
    mic_frames: Vec<Vec<i16>>,

    fail_init: bool,
    fail_serialize: bool,
    fail_cartridge: bool,
    fail_gba: bool,
    fail_nand: bool,
    fail_firmware: bool,
    reject_loads: usize,

    audio: Arc<MockAudioSource>,
}

impl Default for MockCore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCore {
    pub fn new() -> Self {
        Self {
            value: 0,
            frames: 0,
            console: None,
            fps: DS_TARGET_FPS,
            top: vec![0; SCREEN_PIXELS],
            bottom: vec![0; SCREEN_PIXELS],
            init_calls: 0,
            shutdown_calls: 0,
            deserialize_calls: 0,
            firmware_boots: 0,
            cartridge_loads: Vec::new(),
            gba_loads: Vec::new(),
            nand_preparations: Vec::new(),
            cheats: Vec::new(),
            mic_frames: Vec::new(),
            fail_init: false,
            fail_serialize: false,
            fail_cartridge: false,
            fail_gba: false,
            fail_nand: false,
            fail_firmware: false,
            reject_loads: 0,
            audio: Arc::new(MockAudioSource::default()),
        }
    }

    /// Override the frame rate reported through `target_fps`.
    pub fn with_fps(mut self, fps: f32) -> Self {
        self.fps = fps;
        self
    }

    pub fn set_state_value(&mut self, value: u64) {
        self.value = value;
    }

    pub fn state_value(&self) -> u64 {
        self.value
    }

    /// Everything observable about the core, for before/after comparisons.
    pub fn snapshot(&self) -> Vec<u8> {
        self.encode()
    }

    pub fn console(&self) -> Option<ConsoleType> {
        self.console
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls
    }

    pub fn deserialize_calls(&self) -> usize {
        self.deserialize_calls
    }

    pub fn firmware_boots(&self) -> usize {
        self.firmware_boots
    }

    pub fn cartridge_loads(&self) -> &[CartridgeLoad] {
        &self.cartridge_loads
    }

    pub fn gba_loads(&self) -> &[GbaLoad] {
        &self.gba_loads
    }

    pub fn nand_preparations(&self) -> &[PathBuf] {
        &self.nand_preparations
    }

    pub fn cheats(&self) -> &[Cheat] {
        &self.cheats
    }

    pub fn mic_frames(&self) -> &[Vec<i16>] {
        &self.mic_frames
    }

    pub fn audio(&self) -> &Arc<MockAudioSource> {
        &self.audio
    }

    pub fn fail_init(&mut self, fail: bool) {
        self.fail_init = fail;
    }

    pub fn fail_serialize(&mut self, fail: bool) {
        self.fail_serialize = fail;
    }

    pub fn fail_cartridge(&mut self, fail: bool) {
        self.fail_cartridge = fail;
    }

    pub fn fail_gba(&mut self, fail: bool) {
        self.fail_gba = fail;
    }

    pub fn fail_nand(&mut self, fail: bool) {
        self.fail_nand = fail;
    }

    pub fn fail_firmware(&mut self, fail: bool) {
        self.fail_firmware = fail;
    }

    /// Reject the next `count` deserializations even if the blob is valid.
    pub fn reject_next_loads(&mut self, count: usize) {
        self.reject_loads = count;
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(STATE_LEN);
        out.extend_from_slice(STATE_MAGIC);
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.frames.to_le_bytes());
        out
    }

    fn decode(source: &[u8]) -> Option<(u64, u64)> {
        if source.len() != STATE_LEN || &source[..4] != STATE_MAGIC {
            return None;
        }
        let value = u64::from_le_bytes(source[4..12].try_into().ok()?);
        let frames = u64::from_le_bytes(source[12..20].try_into().ok()?);
        Some((value, frames))
    }

    fn scramble(&mut self) {
        self.value = u64::MAX;
        self.frames = u64::MAX;
    }

    fn paint_screens(&mut self) {
        let top = self.frames as u32;
        self.top.fill(top);
        self.bottom.fill(!top);
    }
}

impl EmulatorCore for MockCore {
    fn init(&mut self, setup: &CoreSetup<'_>) -> Result<(), CoreError> {
        self.init_calls += 1;
        if self.fail_init {
            return Err(CoreError::AssetUnreadable {
                asset: "bios7",
                path: setup.config_dir.join("bios7.bin"),
            });
        }
        self.console = Some(setup.console);
        Ok(())
    }

    fn set_console_type(&mut self, console: ConsoleType) {
        self.console = Some(console);
    }

    fn prepare_nand(&mut self, nand: &Path) -> bool {
        self.nand_preparations.push(nand.to_path_buf());
        !self.fail_nand
    }

    fn load_cartridge(&mut self, rom: &Path, sram: &Path, direct: bool) -> bool {
        self.cartridge_loads.push(CartridgeLoad {
            rom: rom.to_path_buf(),
            sram: sram.to_path_buf(),
            direct,
        });
        if self.fail_cartridge {
            return false;
        }
        self.value = 0;
        self.frames = 0;
        true
    }

    fn load_gba_cartridge(&mut self, rom: &Path, sram: Option<&Path>) -> bool {
        self.gba_loads.push(GbaLoad {
            rom: rom.to_path_buf(),
            sram: sram.map(Path::to_path_buf),
        });
        !self.fail_gba
    }

    fn boot_firmware(&mut self) -> bool {
        self.firmware_boots += 1;
        if self.fail_firmware {
            return false;
        }
        self.value = 0;
        self.frames = 0;
        true
    }

    fn run_frame(&mut self) -> u32 {
        self.frames += 1;
        self.value = self.value.wrapping_add(1);
        self.paint_screens();
        263
    }

    fn screens(&self) -> Option<(&[u32], &[u32])> {
        Some((&self.top, &self.bottom))
    }

    fn serialize_state(&mut self, sink: &mut dyn io::Write) -> io::Result<()> {
        if self.fail_serialize {
            return Err(io::Error::other("serialization disabled"));
        }
        sink.write_all(&self.encode())
    }

    fn deserialize_state(&mut self, source: &[u8]) -> bool {
        self.deserialize_calls += 1;
        if self.reject_loads > 0 {
            self.reject_loads -= 1;
            self.scramble();
            return false;
        }
        match Self::decode(source) {
            Some((value, frames)) => {
                self.value = value;
                self.frames = frames;
                true
            }
            None => {
                self.scramble();
                false
            }
        }
    }

    fn set_cheats(&mut self, cheats: &[Cheat]) {
        self.cheats = cheats.to_vec();
    }

    fn feed_microphone(&mut self, samples: &[i16]) {
        self.mic_frames.push(samples.to_vec());
    }

    fn audio_source(&self) -> Arc<dyn AudioSource> {
        self.audio.clone()
    }

    fn target_fps(&self) -> f32 {
        self.fps
    }

    fn shutdown(&mut self) {
        self.shutdown_calls += 1;
    }
}

struct OpenOutput {
    id: u64,
    params: StreamParams,
    data: OutputCallback,
    on_error: ErrorCallback,
}

struct OpenInput {
    id: u64,
    params: StreamParams,
    data: InputCallback,
    on_error: ErrorCallback,
}

#[derive(Default)]
struct DriverState {
    next_id: u64,
    output_opens: usize,
    output_closes: usize,
    input_opens: usize,
    input_closes: usize,
    fail_output: bool,
    fail_input: bool,
    output: Option<OpenOutput>,
    input: Option<OpenInput>,
    output_running: bool,
    input_running: bool,
}

/// Audio driver double. Clones share state, so a test keeps one handle
/// while the session owns another.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<DriverState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_output(&self, fail: bool) {
        self.lock().fail_output = fail;
    }

    pub fn set_fail_input(&self, fail: bool) {
        self.lock().fail_input = fail;
    }

    pub fn output_opens(&self) -> usize {
        self.lock().output_opens
    }

    pub fn output_closes(&self) -> usize {
        self.lock().output_closes
    }

    pub fn input_opens(&self) -> usize {
        self.lock().input_opens
    }

    pub fn input_closes(&self) -> usize {
        self.lock().input_closes
    }

    pub fn output_open(&self) -> bool {
        self.lock().output.is_some()
    }

    pub fn input_open(&self) -> bool {
        self.lock().input.is_some()
    }

    pub fn output_running(&self) -> bool {
        self.lock().output_running
    }

    pub fn input_running(&self) -> bool {
        self.lock().input_running
    }

    pub fn output_params(&self) -> Option<StreamParams> {
        self.lock().output.as_ref().map(|o| o.params)
    }

    pub fn input_params(&self) -> Option<StreamParams> {
        self.lock().input.as_ref().map(|i| i.params)
    }

    /// Run the output data callback for `len` samples, as the RT thread would.
    pub fn pull_output(&self, len: usize) -> Option<Vec<i16>> {
        let mut state = self.lock();
        let output = state.output.as_mut()?;
        let mut buffer = vec![0; len];
        (output.data)(&mut buffer);
        Some(buffer)
    }

    /// Run the input data callback with captured `samples`.
    pub fn push_input(&self, samples: &[i16]) -> bool {
        let mut state = self.lock();
        match state.input.as_mut() {
            Some(input) => {
                (input.data)(samples);
                true
            }
            None => false,
        }
    }

    /// Report an unrecoverable fault on the open output stream.
    pub fn inject_output_fault(&self) -> bool {
        let state = self.lock();
        match state.output.as_ref() {
            Some(output) => {
                (output.on_error)(StreamError::Disconnected);
                true
            }
            None => false,
        }
    }

    /// Report an unrecoverable fault on the open input stream.
    pub fn inject_input_fault(&self) -> bool {
        let state = self.lock();
        match state.input.as_ref() {
            Some(input) => {
                (input.on_error)(StreamError::Disconnected);
                true
            }
            None => false,
        }
    }
}

impl AudioDriver for MockDriver {
    type Stream = MockStream;

    fn open_output(
        &mut self,
        params: StreamParams,
        data: OutputCallback,
        on_error: ErrorCallback,
    ) -> Result<MockStream, StreamOpenError> {
        let mut state = self.lock();
        if state.fail_output {
            return Err(StreamOpenError::Unavailable("mock output disabled".to_string()));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.output_opens += 1;
        state.output_running = false;
        state.output = Some(OpenOutput {
            id,
            params,
            data,
            on_error,
        });
        Ok(MockStream {
            id,
            direction: Direction::Output,
            state: self.state.clone(),
        })
    }

    fn open_input(
        &mut self,
        params: StreamParams,
        data: InputCallback,
        on_error: ErrorCallback,
    ) -> Result<MockStream, StreamOpenError> {
        let mut state = self.lock();
        if state.fail_input {
            return Err(StreamOpenError::Unavailable("mock input disabled".to_string()));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.input_opens += 1;
        state.input_running = false;
        state.input = Some(OpenInput {
            id,
            params,
            data,
            on_error,
        });
        Ok(MockStream {
            id,
            direction: Direction::Input,
            state: self.state.clone(),
        })
    }
}

/// Handle returned by [`MockDriver`]. Dropping it closes the stream.
pub struct MockStream {
    id: u64,
    direction: Direction,
    state: Arc<Mutex<DriverState>>,
}

impl MockStream {
    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_running(&self, running: bool) {
        let mut state = self.lock();
        match self.direction {
            Direction::Output if state.output.as_ref().is_some_and(|o| o.id == self.id) => {
                state.output_running = running;
            }
            Direction::Input if state.input.as_ref().is_some_and(|i| i.id == self.id) => {
                state.input_running = running;
            }
            _ => {}
        }
    }
}

impl AudioStream for MockStream {
    fn start(&mut self) -> Result<(), StreamError> {
        self.set_running(true);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), StreamError> {
        self.set_running(false);
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        let mut state = self.lock();
        match self.direction {
            Direction::Output => {
                state.output_closes += 1;
                if state.output.as_ref().is_some_and(|o| o.id == self.id) {
                    state.output = None;
                    state.output_running = false;
                }
            }
            Direction::Input => {
                state.input_closes += 1;
                if state.input.as_ref().is_some_and(|i| i.id == self.id) {
                    state.input = None;
                    state.input_running = false;
                }
            }
        }
    }
}
