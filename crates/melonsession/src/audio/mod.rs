//! Audio endpoints: the driver seam and the manager that owns the streams.

pub mod driver;
pub mod endpoints;
#[cfg(feature = "pipewire")]
pub mod pipewire_driver;

pub use driver::{
    AudioDriver, AudioStream, Direction, ErrorCallback, InputCallback, OutputCallback,
    PerformanceMode, SampleFormat, SharingMode, StatsSnapshot, StreamError, StreamOpenError,
    StreamParams, StreamStats, INPUT_CHANNELS, INPUT_SAMPLE_RATE, OUTPUT_CHANNELS,
    OUTPUT_SAMPLE_RATE,
};
pub use endpoints::{AudioEndpointManager, AudioNotice, Endpoint, MIC_RING_CAPACITY};
#[cfg(feature = "pipewire")]
pub use pipewire_driver::{PipeWireDriver, PipeWireStream};
