//! Output and microphone endpoint lifecycle.
//!
//! ```text
//!  core AudioSource ──▶ output callback (driver RT thread) ──▶ speaker
//!  mic ──▶ input callback (driver RT thread) ──▶ rtrb ring ──▶ mic_frame() (frame thread)
//!  driver error callback ──▶ mpsc ──▶ process_events() (frame thread) ──▶ reopen
//! ```
//!
//! A live stream never has its parameters changed. Any change closes the
//! stream and opens a new one, so the RT callbacks only ever read values
//! captured when they were built.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use melonconf::{AudioConfig, MicSource, MAX_VOLUME};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use super::driver::{
    AudioDriver, AudioStream, ErrorCallback, InputCallback, OutputCallback, StatsSnapshot,
    StreamError, StreamOpenError, StreamParams, StreamStats,
};
use crate::core::AudioSource;

/// Capacity of the microphone ring, in samples (about 90 ms at 44.1 kHz).
pub const MIC_RING_CAPACITY: usize = 4096;

const NOISE_SEED: u64 = 0x6d65_6c6f_6e44_5321;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Output,
    Input,
}

/// Message posted by a driver thread to the frame thread.
#[derive(Debug)]
struct DriverFault {
    endpoint: Endpoint,
    generation: u64,
    error: StreamError,
}

/// Degradations the host may want to surface. A driver fault that is
/// recovered by reopening the stream raises none.
#[derive(Debug, Clone)]
pub enum AudioNotice {
    /// The output could not be opened; sound is muted.
    OutputLost(StreamOpenError),
    /// Host microphone unavailable; the mic now hears synthetic noise.
    MicrophoneFallback(StreamOpenError),
}

/// Owns one output stream and at most one input stream.
pub struct AudioEndpointManager<D: AudioDriver> {
    driver: D,
    source: Option<Arc<dyn AudioSource>>,

    output: Option<D::Stream>,
    output_config: Option<AudioConfig>,
    output_generation: u64,
    output_stats: Arc<StreamStats>,

    input: Option<D::Stream>,
    input_generation: u64,
    input_stats: Arc<StreamStats>,
    mic_ring: Option<rtrb::Consumer<i16>>,
    mic_source: MicSource,
    noise: Pcg32,

    playing: bool,
    faults_tx: UnboundedSender<DriverFault>,
    faults_rx: UnboundedReceiver<DriverFault>,
    notices: Vec<AudioNotice>,
}

impl<D: AudioDriver> AudioEndpointManager<D> {
    pub fn new(driver: D) -> Self {
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        Self {
            driver,
            source: None,
            output: None,
            output_config: None,
            output_generation: 0,
            output_stats: Arc::new(StreamStats::default()),
            input: None,
            input_generation: 0,
            input_stats: Arc::new(StreamStats::default()),
            mic_ring: None,
            mic_source: MicSource::Silence,
            noise: Pcg32::seed_from_u64(NOISE_SEED),
            playing: false,
            faults_tx,
            faults_rx,
            notices: Vec::new(),
        }
    }

    /// Sample queue the output callback pulls from.
    pub fn set_audio_source(&mut self, source: Arc<dyn AudioSource>) {
        self.source = Some(source);
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    /// Last configuration applied to the output, whether or not it opened.
    pub fn output_config(&self) -> Option<AudioConfig> {
        self.output_config
    }

    /// The microphone source in effect after any fallback.
    pub fn mic_source(&self) -> MicSource {
        self.mic_source
    }

    pub fn output_stats(&self) -> StatsSnapshot {
        self.output_stats.snapshot()
    }

    pub fn input_stats(&self) -> StatsSnapshot {
        self.input_stats.snapshot()
    }

    /// Open the output stream for `config`.
    ///
    /// An open failure is logged and leaves the output absent; the session
    /// carries on muted. Returns whether a stream is now open.
    pub fn setup_output(&mut self, config: AudioConfig) -> bool {
        self.close_output();
        self.output_config = Some(config);

        if !config.enabled {
            info!("audio output disabled");
            return false;
        }

        let Some(source) = self.source.clone() else {
            warn!("no audio source attached, output stays closed");
            return false;
        };

        self.output_stats = Arc::new(StreamStats::default());

        let params = StreamParams::output(config.latency);
        let data = output_callback(source, config.volume, self.output_stats.clone());
        let on_error = self.error_callback(Endpoint::Output, self.output_generation);

        match self.driver.open_output(params, data, on_error) {
            Ok(mut stream) => {
                info!(
                    "audio output open: {} Hz x{} {:?} (volume {})",
                    params.sample_rate, params.channels, config.latency, config.volume
                );
                if self.playing {
                    if let Err(e) = stream.start() {
                        warn!("audio output failed to start: {}", e);
                    }
                }
                self.output = Some(stream);
                true
            }
            Err(e) => {
                warn!("audio output unavailable, continuing muted: {}", e);
                self.notices.push(AudioNotice::OutputLost(e));
                false
            }
        }
    }

    /// Apply a new output configuration.
    ///
    /// Does nothing when neither the latency class, the volume nor the enabled
    /// flag changed; otherwise the stream is closed and reopened. Returns
    /// whether the stream was rebuilt.
    pub fn reconfigure_output(&mut self, config: AudioConfig) -> bool {
        if let Some(current) = self.output_config {
            if current.latency == config.latency
                && current.volume == config.volume
                && current.enabled == config.enabled
            {
                debug!("audio output config unchanged");
                return false;
            }
        }

        info!(
            "reconfiguring audio output: {:?} -> {:?}",
            self.output_config, config
        );
        self.setup_output(config);
        true
    }

    /// Reopen the output with the last applied configuration and resume it if
    /// the session is playing.
    fn recover_output(&mut self) {
        let Some(config) = self.output_config else {
            return;
        };

        if self.setup_output(config) {
            info!("audio output recovered");
        } else {
            error!("audio output recovery failed, sound muted");
        }
    }

    /// Apply a microphone source, opening or closing the capture stream as
    /// needed. Returns the source actually in effect.
    pub fn set_mic_source(&mut self, requested: MicSource) -> MicSource {
        if requested.needs_capture() {
            if self.input.is_none() {
                self.setup_input();
            }
        } else {
            self.teardown_input();
            self.mic_source = requested;
        }
        self.mic_source
    }

    /// Open the host microphone. Falls back to synthetic noise if it cannot
    /// be opened.
    pub fn setup_input(&mut self) -> bool {
        self.teardown_input();

        let (producer, consumer) = rtrb::RingBuffer::new(MIC_RING_CAPACITY);
        self.input_stats = Arc::new(StreamStats::default());

        let data = input_callback(producer, self.input_stats.clone());
        let on_error = self.error_callback(Endpoint::Input, self.input_generation);

        match self.driver.open_input(StreamParams::input(), data, on_error) {
            Ok(mut stream) => {
                info!("microphone capture open");
                if self.playing {
                    if let Err(e) = stream.start() {
                        warn!("microphone failed to start: {}", e);
                    }
                }
                self.input = Some(stream);
                self.mic_ring = Some(consumer);
                self.mic_source = MicSource::HostMicrophone;
                true
            }
            Err(e) => {
                warn!("microphone unavailable, using synthetic noise: {}", e);
                self.mic_source = MicSource::SyntheticNoise;
                self.notices.push(AudioNotice::MicrophoneFallback(e));
                false
            }
        }
    }

    pub fn teardown_input(&mut self) {
        // Faults already queued by the old stream no longer match.
        self.input_generation += 1;
        if self.input.take().is_some() {
            info!("microphone capture closed");
        }
        self.mic_ring = None;
    }

    /// Fill `out` with one frame of microphone samples for the core.
    pub fn mic_frame(&mut self, out: &mut [i16]) {
        match self.mic_source {
            MicSource::Silence => out.fill(0),
            MicSource::SyntheticNoise => {
                for sample in out.iter_mut() {
                    *sample = self.noise.random();
                }
            }
            MicSource::HostMicrophone => {
                let read = match self.mic_ring.as_mut() {
                    Some(ring) => drain_ring(ring, out),
                    None => 0,
                };
                out[read..].fill(0);
            }
        }
    }

    /// Start both endpoints.
    pub fn start(&mut self) {
        self.playing = true;
        for stream in self.output.iter_mut().chain(self.input.iter_mut()) {
            if let Err(e) = stream.start() {
                warn!("audio stream failed to start: {}", e);
            }
        }
    }

    /// Pause both endpoints.
    pub fn pause(&mut self) {
        self.playing = false;
        for stream in self.output.iter_mut().chain(self.input.iter_mut()) {
            if let Err(e) = stream.pause() {
                warn!("audio stream failed to pause: {}", e);
            }
        }
    }

    /// Handle faults posted by driver threads since the last call. Faults
    /// from streams that have already been replaced are ignored.
    ///
    /// Returns notices raised since the last call, including those from
    /// setup.
    pub fn process_events(&mut self) -> Vec<AudioNotice> {
        while let Ok(fault) = self.faults_rx.try_recv() {
            match fault.endpoint {
                Endpoint::Output if fault.generation == self.output_generation => {
                    error!("audio output fault: {}", fault.error);
                    self.recover_output();
                }
                Endpoint::Input
                    if fault.generation == self.input_generation && self.input.is_some() =>
                {
                    error!("microphone fault: {}", fault.error);
                    self.setup_input();
                }
                _ => debug!(
                    "ignoring stale {:?} fault (generation {})",
                    fault.endpoint, fault.generation
                ),
            }
        }
        std::mem::take(&mut self.notices)
    }

    /// Close everything and forget the applied configuration.
    pub fn shutdown(&mut self) {
        self.playing = false;
        self.close_output();
        self.teardown_input();
        self.output_config = None;
        self.mic_source = MicSource::Silence;
        self.source = None;
        while self.faults_rx.try_recv().is_ok() {}
        self.notices.clear();
    }

    fn close_output(&mut self) {
        self.output_generation += 1;
        if self.output.take().is_some() {
            debug!("audio output closed");
        }
    }

    fn error_callback(&self, endpoint: Endpoint, generation: u64) -> ErrorCallback {
        let tx = self.faults_tx.clone();
        Box::new(move |error| {
            // Receiver gone means the manager was dropped.
            let _ = tx.send(DriverFault {
                endpoint,
                generation,
                error,
            });
        })
    }
}

fn output_callback(
    source: Arc<dyn AudioSource>,
    volume: u16,
    stats: Arc<StreamStats>,
) -> OutputCallback {
    let gain = i32::from(volume.min(MAX_VOLUME));
    Box::new(move |out: &mut [i16]| {
        stats.callbacks.fetch_add(1, Ordering::Relaxed);

        let filled = source.read_samples(out).min(out.len());
        out[filled..].fill(0);

        if filled < out.len() {
            if stats.warmed_up.load(Ordering::Relaxed) {
                stats.xruns.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            stats.warmed_up.store(true, Ordering::Relaxed);
        }

        if gain != i32::from(MAX_VOLUME) {
            for sample in &mut out[..filled] {
                *sample = ((i32::from(*sample) * gain) >> 8) as i16;
            }
        }

        stats.samples.fetch_add(filled as u64, Ordering::Relaxed);
    })
}

fn input_callback(mut producer: rtrb::Producer<i16>, stats: Arc<StreamStats>) -> InputCallback {
    Box::new(move |samples: &[i16]| {
        stats.callbacks.fetch_add(1, Ordering::Relaxed);

        let mut written = 0;
        for &sample in samples {
            if producer.push(sample).is_err() {
                break;
            }
            written += 1;
        }
        stats.samples.fetch_add(written as u64, Ordering::Relaxed);

        if written < samples.len() {
            stats.xruns.fetch_add(1, Ordering::Relaxed);
        }
    })
}

fn drain_ring(ring: &mut rtrb::Consumer<i16>, out: &mut [i16]) -> usize {
    let n = ring.slots().min(out.len());
    let Ok(chunk) = ring.read_chunk(n) else {
        return 0;
    };
    let (first, second) = chunk.as_slices();
    out[..first.len()].copy_from_slice(first);
    out[first.len()..first.len() + second.len()].copy_from_slice(second);
    chunk.commit_all();
    n
}
