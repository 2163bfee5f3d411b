//! Audio driver seam.
//!
//! A driver opens one stream per direction, calls the data callback on its
//! own real-time thread and reports unrecoverable faults through the error
//! callback. Dropping a stream handle closes it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use melonconf::LatencyClass;

pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;
pub const OUTPUT_CHANNELS: u16 = 2;
pub const INPUT_SAMPLE_RATE: u32 = 44_100;
pub const INPUT_CHANNELS: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Output,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    I16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceMode {
    None,
    LowLatency,
    PowerSaving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingMode {
    Shared,
    Exclusive,
}

/// Everything a driver needs to open a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub direction: Direction,
    pub channels: u16,
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub performance: PerformanceMode,
    pub sharing: SharingMode,
}

impl StreamParams {
    /// 16-bit stereo 48 kHz playback at the requested latency class.
    pub fn output(latency: LatencyClass) -> Self {
        let (performance, sharing) = match latency {
            LatencyClass::LowLatency => (PerformanceMode::LowLatency, SharingMode::Exclusive),
            LatencyClass::Balanced => (PerformanceMode::None, SharingMode::Shared),
            LatencyClass::PowerSaving => (PerformanceMode::PowerSaving, SharingMode::Shared),
        };
        Self {
            direction: Direction::Output,
            channels: OUTPUT_CHANNELS,
            format: SampleFormat::I16,
            sample_rate: OUTPUT_SAMPLE_RATE,
            performance,
            sharing,
        }
    }

    /// 16-bit mono 44.1 kHz capture.
    pub fn input() -> Self {
        Self {
            direction: Direction::Input,
            channels: INPUT_CHANNELS,
            format: SampleFormat::I16,
            sample_rate: INPUT_SAMPLE_RATE,
            performance: PerformanceMode::LowLatency,
            sharing: SharingMode::Shared,
        }
    }
}

/// Fills an interleaved output buffer. Runs on the driver's RT thread.
pub type OutputCallback = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

/// Receives captured samples. Runs on the driver's RT thread.
pub type InputCallback = Box<dyn FnMut(&[i16]) + Send + 'static>;

/// Invoked by the driver when a stream dies.
pub type ErrorCallback = Box<dyn Fn(StreamError) + Send + Sync + 'static>;

/// Failure to open a stream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamOpenError {
    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported stream parameters: {0}")]
    Unsupported(String),

    #[error("failed to spawn audio thread: {0}")]
    ThreadSpawn(String),
}

/// Failure on a live stream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    #[error("audio device disconnected")]
    Disconnected,

    #[error("stream error: {0}")]
    Backend(String),
}

/// An open stream. Dropping it closes the stream.
pub trait AudioStream: Send {
    fn start(&mut self) -> Result<(), StreamError>;
    fn pause(&mut self) -> Result<(), StreamError>;
}

/// Platform audio backend.
pub trait AudioDriver {
    type Stream: AudioStream;

    fn open_output(
        &mut self,
        params: StreamParams,
        data: OutputCallback,
        on_error: ErrorCallback,
    ) -> Result<Self::Stream, StreamOpenError>;

    fn open_input(
        &mut self,
        params: StreamParams,
        data: InputCallback,
        on_error: ErrorCallback,
    ) -> Result<Self::Stream, StreamOpenError>;
}

/// Counters updated from the RT callbacks.
#[derive(Debug, Default)]
pub struct StreamStats {
    pub callbacks: AtomicU64,
    pub samples: AtomicU64,
    /// Output: callbacks the core could not fill. Input: callbacks that
    /// found the ring full.
    pub xruns: AtomicU64,
    /// Don't count xruns until the first full callback.
    pub warmed_up: AtomicBool,
}

impl StreamStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            xruns: self.xruns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub callbacks: u64,
    pub samples: u64,
    pub xruns: u64,
}
