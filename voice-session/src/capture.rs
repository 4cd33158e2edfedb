/// Capture source module
///
/// Abstracts where capture frames come from: the default microphone via
/// cpal, a scripted frame sequence for tests, or a mono WAV file for
/// offline runs. Device acquisition failures are typed so callers can tell
/// a permission problem from a missing device.

use async_trait::async_trait;
use cache_padded::CachePadded;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Samples per frame when replaying a WAV file
pub const FILE_FRAME_SAMPLES: usize = 1024;

/// Interval at which the capture thread forwards buffered samples
const FORWARD_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("No capture device found: {0}")]
    DeviceNotFound(String),

    #[error("Unsupported capture format: {0}")]
    UnsupportedFormat(String),

    #[error("Capture device error: {0}")]
    Device(String),

    #[error("Audio file error: {0}")]
    File(String),
}

/// Source of capture frames
///
/// A frame is a block of mono f32 samples at the source's native rate.
/// `next_frame` returning None marks the end of the stream.
#[async_trait]
pub trait CaptureSource: Send {
    /// Native sample rate of the delivered frames
    fn sample_rate(&self) -> u32;

    /// Await the next frame; None once the stream has ended
    async fn next_frame(&mut self) -> Option<Vec<f32>>;

    /// Stop producing frames and release the device
    fn stop(&mut self);
}

type RingBuffer = HeapRb<f32>;
type RingProducer = <RingBuffer as Split>::Prod;
type RingConsumer = <RingBuffer as Split>::Cons;

/// Microphone capture via the default cpal input device
///
/// The realtime callback pushes samples into a lock-free ring buffer; a
/// dedicated thread owns the cpal stream and forwards buffered samples as
/// frames, so the source itself can cross task boundaries freely.
pub struct MicrophoneSource {
    sample_rate: u32,
    frames: mpsc::UnboundedReceiver<Vec<f32>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneSource {
    /// Acquire the default input device and start capturing
    pub fn open() -> Result<Self, CaptureError> {
        let (init_tx, init_rx) = std::sync::mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);

        let worker = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || capture_thread(init_tx, frame_tx, thread_shutdown))
            .map_err(|e| CaptureError::Device(format!("failed to spawn capture thread: {e}")))?;

        match init_rx.recv() {
            Ok(Ok(sample_rate)) => {
                info!("Microphone capture started at {} Hz", sample_rate);
                Ok(Self {
                    sample_rate,
                    frames: frame_rx,
                    shutdown,
                    worker: Some(worker),
                })
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(CaptureError::Device(
                    "capture thread exited during startup".to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl CaptureSource for MicrophoneSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn next_frame(&mut self) -> Option<Vec<f32>> {
        if self.shutdown.load(Ordering::SeqCst) {
            return None;
        }
        self.frames.recv().await
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            debug!("Microphone capture stopped");
        }
        self.frames.close();
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the capture thread: owns the cpal stream for its whole life
fn capture_thread(
    init_tx: std::sync::mpsc::Sender<Result<u32, CaptureError>>,
    frame_tx: mpsc::UnboundedSender<Vec<f32>>,
    shutdown: Arc<AtomicBool>,
) {
    let overflow = Arc::new(AtomicUsize::new(0));

    match open_stream(Arc::clone(&overflow)) {
        Ok((stream, sample_rate, consumer)) => {
            if init_tx.send(Ok(sample_rate)).is_err() {
                return;
            }
            forward_frames(consumer, frame_tx, shutdown, overflow);
            drop(stream);
        }
        Err(e) => {
            let _ = init_tx.send(Err(e));
        }
    }
}

fn open_stream(
    overflow: Arc<AtomicUsize>,
) -> Result<(cpal::Stream, u32, CachePadded<RingConsumer>), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceNotFound("no input device available".to_string()))?;

    let supported = device
        .default_input_config()
        .map_err(map_config_error)?;

    if supported.sample_format() != SampleFormat::F32 {
        return Err(CaptureError::UnsupportedFormat(format!(
            "device produces {:?}, expected f32",
            supported.sample_format()
        )));
    }

    let config: cpal::StreamConfig = supported.config();
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    debug!(
        "Input device {:?}: {} Hz, {} channel(s)",
        device.name().unwrap_or_default(),
        sample_rate,
        channels
    );

    // One second of headroom between the realtime callback and forwarding
    let ring = RingBuffer::new(sample_rate as usize);
    let (producer, consumer) = ring.split();
    let mut producer = CachePadded::new(producer);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels <= 1 {
                    let pushed = producer.push_slice(data);
                    if pushed < data.len() {
                        overflow.fetch_add(data.len() - pushed, Ordering::Relaxed);
                    }
                } else {
                    // Mix interleaved channels down to mono in place
                    for frame in data.chunks_exact(channels) {
                        let avg = frame.iter().sum::<f32>() / channels as f32;
                        if producer.try_push(avg).is_err() {
                            overflow.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            },
            |err| {
                error!("Audio capture error: {}", err);
            },
            None,
        )
        .map_err(map_build_error)?;

    stream.play().map_err(map_play_error)?;

    Ok((stream, sample_rate, CachePadded::new(consumer)))
}

fn forward_frames(
    mut consumer: CachePadded<RingConsumer>,
    frame_tx: mpsc::UnboundedSender<Vec<f32>>,
    shutdown: Arc<AtomicBool>,
    overflow: Arc<AtomicUsize>,
) {
    let mut scratch = vec![0.0f32; 4096];

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(FORWARD_INTERVAL);

        let dropped = overflow.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!("Capture ring buffer full, dropped {} samples", dropped);
        }

        while consumer.occupied_len() > 0 {
            let read = consumer.pop_slice(&mut scratch);
            if read == 0 {
                break;
            }
            if frame_tx.send(scratch[..read].to_vec()).is_err() {
                // Receiver gone; nothing left to capture for
                return;
            }
        }
    }
}

fn map_config_error(err: cpal::DefaultStreamConfigError) -> CaptureError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceNotFound("input device disappeared".to_string())
        }
        cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
            CaptureError::UnsupportedFormat("no supported input stream type".to_string())
        }
        cpal::DefaultStreamConfigError::BackendSpecific { err } => classify_backend(err.description),
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceNotFound("input device disappeared".to_string())
        }
        cpal::BuildStreamError::StreamConfigNotSupported => {
            CaptureError::UnsupportedFormat("input config rejected by device".to_string())
        }
        cpal::BuildStreamError::BackendSpecific { err } => classify_backend(err.description),
        other => CaptureError::Device(other.to_string()),
    }
}

fn map_play_error(err: cpal::PlayStreamError) -> CaptureError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => {
            CaptureError::DeviceNotFound("input device disappeared".to_string())
        }
        cpal::PlayStreamError::BackendSpecific { err } => classify_backend(err.description),
    }
}

/// Sort backend-specific failures into the permission bucket when the
/// message says so; OS backends report denied microphone access this way.
fn classify_backend(description: String) -> CaptureError {
    let lowered = description.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("not authorized")
    {
        CaptureError::PermissionDenied(description)
    } else {
        CaptureError::Device(description)
    }
}

/// Scripted frame source for tests and deterministic runs
pub struct ScriptedSource {
    sample_rate: u32,
    frames: VecDeque<Vec<f32>>,
    frame_interval: Duration,
    stopped: bool,
}

impl ScriptedSource {
    /// Create a source that yields the given frames back to back
    pub fn new(sample_rate: u32, frames: Vec<Vec<f32>>) -> Self {
        Self::with_interval(sample_rate, frames, Duration::ZERO)
    }

    /// Create a source that paces frames at a fixed interval
    pub fn with_interval(sample_rate: u32, frames: Vec<Vec<f32>>, frame_interval: Duration) -> Self {
        Self {
            sample_rate,
            frames: frames.into(),
            frame_interval,
            stopped: false,
        }
    }

    /// Frames not yet delivered
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl CaptureSource for ScriptedSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn next_frame(&mut self) -> Option<Vec<f32>> {
        if self.stopped {
            return None;
        }

        if self.frame_interval.is_zero() {
            // Give other pipeline work a chance between instant frames
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.frame_interval).await;
        }

        self.frames.pop_front()
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.frames.clear();
    }
}

/// Frame source replaying a WAV file at its native rate
pub struct WavFileSource {
    inner: ScriptedSource,
}

impl WavFileSource {
    /// Open a WAV file; multi-channel audio is mixed down to mono
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let mut reader =
            hound::WavReader::open(&path).map_err(|e| CaptureError::File(e.to_string()))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| CaptureError::File(e.to_string()))?,
            hound::SampleFormat::Int => match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| f32::from(v) / 32768.0))
                    .collect::<Result<_, _>>()
                    .map_err(|e| CaptureError::File(e.to_string()))?,
                bits => {
                    return Err(CaptureError::UnsupportedFormat(format!(
                        "{bits}-bit integer WAV"
                    )))
                }
            },
        };

        let mono: Vec<f32> = if channels > 1 {
            samples
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        } else {
            samples
        };

        info!(
            "Loaded WAV source: {} Hz, {} samples after mixdown",
            spec.sample_rate,
            mono.len()
        );

        let frames = mono
            .chunks(FILE_FRAME_SAMPLES)
            .map(|chunk| chunk.to_vec())
            .collect();

        Ok(Self {
            inner: ScriptedSource::new(spec.sample_rate, frames),
        })
    }
}

#[async_trait]
impl CaptureSource for WavFileSource {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    async fn next_frame(&mut self) -> Option<Vec<f32>> {
        self.inner.next_frame().await
    }

    fn stop(&mut self) {
        self.inner.stop();
    }
}
