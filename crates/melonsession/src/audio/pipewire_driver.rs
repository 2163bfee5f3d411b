//! PipeWire backend for [`AudioDriver`].
//!
//! Each stream runs its own PipeWire main loop on a dedicated thread:
//!
//! ```text
//! open_output() ──spawn──▶ "pipewire-output" thread
//!      │                        │ connect stream
//!      ◀──── ready / error ─────┤
//!                               │ process callback ──▶ OutputCallback(&mut [i16])
//!                               │ state_changed(Error) ──▶ ErrorCallback
//! drop(stream) ── running=false ▶ timer quits main loop, thread joined
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use super::driver::{
    AudioDriver, AudioStream, Direction, ErrorCallback, InputCallback, OutputCallback,
    PerformanceMode, SharingMode, StreamError, StreamOpenError, StreamParams,
};

/// Largest buffer handled per callback, in frames. Scratch space is
/// allocated once at this size so the RT path never allocates.
const MAX_FRAMES: usize = 8192;

const SAMPLE_SIZE: usize = std::mem::size_of::<i16>();

/// Node latency hint for each performance class, in frames.
fn latency_frames(performance: PerformanceMode) -> u32 {
    match performance {
        PerformanceMode::LowLatency => 256,
        PerformanceMode::None => 512,
        PerformanceMode::PowerSaving => 2048,
    }
}

/// Opens PipeWire playback and capture streams.
#[derive(Debug, Clone)]
pub struct PipeWireDriver {
    name: String,
}

impl PipeWireDriver {
    pub fn new(name: impl Into<String>) -> Self {
        pipewire::init();
        Self { name: name.into() }
    }
}

impl Default for PipeWireDriver {
    fn default() -> Self {
        Self::new("melonds")
    }
}

impl AudioDriver for PipeWireDriver {
    type Stream = PipeWireStream;

    fn open_output(
        &mut self,
        params: StreamParams,
        data: OutputCallback,
        on_error: ErrorCallback,
    ) -> Result<PipeWireStream, StreamOpenError> {
        PipeWireStream::spawn(format!("{}-output", self.name), params, StreamIo::Output(data), on_error)
    }

    fn open_input(
        &mut self,
        params: StreamParams,
        data: InputCallback,
        on_error: ErrorCallback,
    ) -> Result<PipeWireStream, StreamOpenError> {
        PipeWireStream::spawn(format!("{}-mic", self.name), params, StreamIo::Input(data), on_error)
    }
}

enum StreamIo {
    Output(OutputCallback),
    Input(InputCallback),
}

/// State moved into the PipeWire listener.
struct ListenerState {
    io: StreamIo,
    on_error: ErrorCallback,
    active: Arc<AtomicBool>,
    scratch: Vec<i16>,
    channels: usize,
}

/// Handle to a stream thread. Paused until [`AudioStream::start`].
pub struct PipeWireStream {
    running: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    name: String,
}

impl PipeWireStream {
    fn spawn(
        name: String,
        params: StreamParams,
        io: StreamIo,
        on_error: ErrorCallback,
    ) -> Result<Self, StreamOpenError> {
        let running = Arc::new(AtomicBool::new(true));
        let active = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let thread_name = match params.direction {
            Direction::Output => "pipewire-output",
            Direction::Input => "pipewire-input",
        };

        let running_for_thread = Arc::clone(&running);
        let active_for_thread = Arc::clone(&active);
        let name_for_thread = name.clone();

        let thread_handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                let state = ListenerState {
                    io,
                    on_error,
                    active: active_for_thread,
                    scratch: vec![0; MAX_FRAMES * params.channels as usize],
                    channels: params.channels as usize,
                };
                if let Err(e) =
                    run_stream_loop(&name_for_thread, params, state, running_for_thread, &ready_tx)
                {
                    error!("PipeWire stream {} failed: {}", name_for_thread, e);
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| StreamOpenError::ThreadSpawn(e.to_string()))?;

        let mut stream = Self {
            running,
            active,
            thread_handle: Some(thread_handle),
            name,
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    "PipeWire stream {} connected: {} Hz x{}",
                    stream.name, params.sample_rate, params.channels
                );
                Ok(stream)
            }
            Ok(Err(e)) => {
                stream.stop();
                Err(e)
            }
            Err(_) => {
                stream.stop();
                Err(StreamOpenError::Unavailable(
                    "PipeWire thread exited before connecting".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            debug!("waiting for PipeWire stream {} to stop", self.name);
            let _ = handle.join();
            info!("PipeWire stream {} stopped", self.name);
        }
    }
}

impl AudioStream for PipeWireStream {
    fn start(&mut self) -> Result<(), StreamError> {
        if self.thread_handle.as_ref().is_some_and(|h| h.is_finished()) {
            return Err(StreamError::Disconnected);
        }
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), StreamError> {
        self.active.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for PipeWireStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unavailable(what: &str, e: impl std::fmt::Display) -> StreamOpenError {
    StreamOpenError::Unavailable(format!("{what}: {e}"))
}

fn run_stream_loop(
    name: &str,
    params: StreamParams,
    state: ListenerState,
    running: Arc<AtomicBool>,
    ready: &std_mpsc::Sender<Result<(), StreamOpenError>>,
) -> Result<(), StreamOpenError> {
    use pipewire as pw;
    use pw::spa::pod::Pod;
    use pw::{properties::properties, spa};
    use spa::param::audio::{AudioFormat, AudioInfoRaw};

    let mainloop =
        pw::main_loop::MainLoopRc::new(None).map_err(|e| unavailable("main loop", e))?;
    let context =
        pw::context::ContextRc::new(&mainloop, None).map_err(|e| unavailable("context", e))?;
    let core = context
        .connect_rc(None)
        .map_err(|e| unavailable("connect", e))?;

    let (category, direction) = match params.direction {
        Direction::Output => ("Playback", spa::utils::Direction::Output),
        Direction::Input => ("Capture", spa::utils::Direction::Input),
    };

    let mut props = properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_ROLE => "Game",
        *pw::keys::MEDIA_CATEGORY => category,
        *pw::keys::AUDIO_CHANNELS => params.channels.to_string(),
    };
    let latency = format!("{}/{}", latency_frames(params.performance), params.sample_rate);
    props.insert("node.latency", latency.as_str());
    if params.sharing == SharingMode::Exclusive {
        props.insert("node.exclusive", "true");
    }
    debug!("PipeWire stream {} requesting latency {}", name, latency);

    let stream = pw::stream::StreamBox::new(&core, name, props)
        .map_err(|e| unavailable("stream", e))?;

    let stride = SAMPLE_SIZE * params.channels as usize;

    let _listener = stream
        .add_local_listener_with_user_data(state)
        .state_changed(|_stream, state, _old, new| {
            if let pw::stream::StreamState::Error(message) = new {
                (state.on_error)(StreamError::Backend(message));
            }
        })
        .process(move |stream, state| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };
            let requested = buffer.requested() as usize;
            let datas = buffer.datas_mut();
            let Some(data) = datas.first_mut() else {
                return;
            };

            let active = state.active.load(Ordering::Acquire);
            let channels = state.channels;

            match &mut state.io {
                StreamIo::Output(fill) => {
                    let Some(slice) = data.data() else {
                        return;
                    };
                    let max_frames = slice.len() / stride;
                    let n_frames = if requested > 0 {
                        requested.min(max_frames)
                    } else {
                        max_frames
                    }
                    .min(MAX_FRAMES);
                    let samples = &mut state.scratch[..n_frames * channels];

                    if active {
                        fill(samples);
                    } else {
                        samples.fill(0);
                    }

                    for (i, sample) in samples.iter().enumerate() {
                        let start = i * SAMPLE_SIZE;
                        slice[start..start + SAMPLE_SIZE].copy_from_slice(&sample.to_le_bytes());
                    }

                    let chunk = data.chunk_mut();
                    *chunk.offset_mut() = 0;
                    *chunk.stride_mut() = stride as i32;
                    *chunk.size_mut() = (stride * n_frames) as u32;
                }
                StreamIo::Input(deliver) => {
                    let size = data.chunk().size() as usize;
                    let Some(slice) = data.data() else {
                        return;
                    };
                    let n_samples = (size.min(slice.len()) / SAMPLE_SIZE).min(state.scratch.len());
                    if n_samples == 0 || !active {
                        return;
                    }

                    let samples = &mut state.scratch[..n_samples];
                    for (i, sample) in samples.iter_mut().enumerate() {
                        let start = i * SAMPLE_SIZE;
                        *sample = i16::from_le_bytes([slice[start], slice[start + 1]]);
                    }
                    deliver(samples);
                }
            }
        })
        .register()
        .map_err(|e| unavailable("listener", e))?;

    let mut audio_info = AudioInfoRaw::new();
    audio_info.set_format(AudioFormat::S16LE);
    audio_info.set_rate(params.sample_rate);
    audio_info.set_channels(u32::from(params.channels));

    let mut position = [0u32; spa::param::audio::MAX_CHANNELS];
    if params.channels == 1 {
        position[0] = spa::sys::SPA_AUDIO_CHANNEL_MONO;
    } else {
        position[0] = spa::sys::SPA_AUDIO_CHANNEL_FL;
        position[1] = spa::sys::SPA_AUDIO_CHANNEL_FR;
    }
    audio_info.set_position(position);

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(spa::pod::Object {
            type_: spa::sys::SPA_TYPE_OBJECT_Format,
            id: spa::sys::SPA_PARAM_EnumFormat,
            properties: audio_info.into(),
        }),
    )
    .map_err(|e| StreamOpenError::Unsupported(format!("format: {e:?}")))?
    .0
    .into_inner();

    let mut pod_params = [Pod::from_bytes(&values)
        .ok_or_else(|| StreamOpenError::Unsupported("format pod".to_string()))?];

    stream
        .connect(
            direction,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut pod_params,
        )
        .map_err(|e| unavailable("connect stream", e))?;

    let mainloop_weak = mainloop.downgrade();
    let timer = mainloop.loop_().add_timer(move |_| {
        if !running.load(Ordering::Acquire) {
            if let Some(ml) = mainloop_weak.upgrade() {
                ml.quit();
            }
        }
    });
    timer
        .update_timer(
            Some(Duration::from_millis(50)),
            Some(Duration::from_millis(50)),
        )
        .into_result()
        .map_err(|e| unavailable("timer", e))?;

    let _ = ready.send(Ok(()));
    mainloop.run();

    debug!("PipeWire main loop for {} exited", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_hints_ordered() {
        assert!(latency_frames(PerformanceMode::LowLatency) < latency_frames(PerformanceMode::None));
        assert!(latency_frames(PerformanceMode::None) < latency_frames(PerformanceMode::PowerSaving));
    }
}
