use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tracing::{debug, info, warn};
use webrtc::track::track_remote::TrackRemote;

use crate::error::{Error, Result};
use crate::media::MediaOutput;

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u16 = 2;
// 120 ms, the longest Opus frame.
const MAX_FRAME_SAMPLES: usize = 5_760;
// Half a second of interleaved stereo.
const MAX_BUFFERED: usize = SAMPLE_RATE as usize;

type SampleBuffer = Arc<Mutex<VecDeque<f32>>>;

/// Plays Opus payloads on the default output device. The cpal stream lives on
/// its own thread; dropping the playback stops it.
pub struct AudioPlayback {
    payloads: mpsc::Sender<Vec<u8>>,
}

impl AudioPlayback {
    pub fn start(muted: Arc<AtomicBool>) -> Result<Self> {
        let (payload_tx, payload_rx) = mpsc::channel::<Vec<u8>>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                let buffer: SampleBuffer = Arc::new(Mutex::new(VecDeque::new()));
                let stream = match open_output(buffer.clone(), muted) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let mut decoder = match opus::Decoder::new(SAMPLE_RATE, opus::Channels::Stereo) {
                    Ok(decoder) => decoder,
                    Err(e) => {
                        let _ = ready_tx.send(Err(Error::Audio(format!(
                            "failed to create Opus decoder: {e:?}"
                        ))));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let mut pcm = vec![0f32; MAX_FRAME_SAMPLES * CHANNELS as usize];
                while let Ok(payload) = payload_rx.recv() {
                    match decoder.decode_float(&payload, &mut pcm, false) {
                        Ok(frames) => {
                            let mut buffer = buffer.lock().unwrap_or_else(|p| p.into_inner());
                            enqueue(&mut buffer, &pcm[..frames * CHANNELS as usize]);
                        }
                        Err(e) => debug!("dropping undecodable Opus packet: {e:?}"),
                    }
                }
                drop(stream);
                debug!("audio playback stopped");
            })
            .map_err(|e| Error::Audio(format!("failed to spawn audio thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("audio thread exited during setup".into()))??;

        Ok(Self {
            payloads: payload_tx,
        })
    }

    pub fn push(&self, payload: &[u8]) -> Result<()> {
        self.payloads
            .send(payload.to_vec())
            .map_err(|_| Error::Audio("audio thread is gone".into()))
    }
}

pub fn is_opus(mime_type: &str) -> bool {
    mime_type.eq_ignore_ascii_case("audio/opus")
}

/// Reads the remote audio track until it ends, feeding playback when the
/// track is Opus and an output device is available.
pub async fn play_track(track: Arc<TrackRemote>, output: MediaOutput) {
    let mime_type = track.codec().capability.mime_type;
    let playback = if !is_opus(&mime_type) {
        warn!("no decoder for {mime_type}, audio track {} will not be played", track.id());
        None
    } else {
        let muted = output.muted_flag();
        match tokio::task::spawn_blocking(move || AudioPlayback::start(muted)).await {
            Ok(Ok(playback)) => {
                let muted = if output.is_muted() { " (muted)" } else { "" };
                info!("playing audio track {}{muted}", track.id());
                Some(playback)
            }
            Ok(Err(e)) => {
                warn!("audio output unavailable, track will be discarded: {e}");
                None
            }
            Err(e) => {
                warn!("audio setup task failed: {e}");
                None
            }
        }
    };

    while let Ok((packet, _)) = track.read_rtp().await {
        if let Some(playback) = &playback {
            if playback.push(&packet.payload).is_err() {
                break;
            }
        }
    }
    info!("audio track {} ended", track.id());
}

fn enqueue(buffer: &mut VecDeque<f32>, samples: &[f32]) {
    buffer.extend(samples.iter().copied());
    if buffer.len() > MAX_BUFFERED {
        let excess = buffer.len() - MAX_BUFFERED;
        buffer.drain(..excess);
    }
}

fn open_output(buffer: SampleBuffer, muted: Arc<AtomicBool>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".into()))?;

    let supported = output_config(&device)?;
    info!("audio output config: {:?}", supported);

    let config = supported.config();
    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_output_stream::<f32>(&device, &config, buffer, muted)?,
        SampleFormat::I16 => build_output_stream::<i16>(&device, &config, buffer, muted)?,
        SampleFormat::U16 => build_output_stream::<u16>(&device, &config, buffer, muted)?,
        sample_format => {
            return Err(Error::Audio(format!(
                "unsupported sample format: {sample_format:?}"
            )))
        }
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

fn output_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig> {
    let configs = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?;
    pick_config(configs).ok_or_else(|| {
        Error::Audio(format!("output device has no {SAMPLE_RATE} Hz mode"))
    })
}

/// Decoded audio is always 48 kHz, so only configs that can run at that rate
/// qualify. Stereo wins; other channel counts are mapped by `write_frames`.
fn pick_config<I>(configs: I) -> Option<cpal::SupportedStreamConfig>
where
    I: IntoIterator<Item = cpal::SupportedStreamConfigRange>,
{
    let mut usable: Vec<_> = configs
        .into_iter()
        .filter(|c| {
            c.min_sample_rate().0 <= SAMPLE_RATE && c.max_sample_rate().0 >= SAMPLE_RATE
        })
        .collect();
    usable.sort_by_key(|c| c.channels() != CHANNELS);
    usable
        .into_iter()
        .next()
        .map(|c| c.with_sample_rate(cpal::SampleRate(SAMPLE_RATE)))
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: SampleBuffer,
    muted: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let err_fn = |err| warn!("audio output stream error: {}", err);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let silent = muted.load(Ordering::Relaxed);
                let mut buffer = buffer.lock().unwrap_or_else(|p| p.into_inner());
                write_frames(data, channels, &mut buffer, silent);
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))
}

/// Moves interleaved stereo samples into a device buffer with `channels`
/// channels. Muted output still consumes samples so latency stays bounded.
fn write_frames<T>(data: &mut [T], channels: usize, buffer: &mut VecDeque<f32>, silent: bool)
where
    T: Sample + FromSample<f32>,
{
    let gain = if silent { 0.0 } else { 1.0 };
    for frame in data.chunks_mut(channels.max(1)) {
        let left = buffer.pop_front().unwrap_or(0.0);
        let right = buffer.pop_front().unwrap_or(left);
        let mono = (left + right) * 0.5;

        for (channel, out) in frame.iter_mut().enumerate() {
            let value = match (channels, channel) {
                (1, _) => mono,
                (_, 0) => left,
                (_, 1) => right,
                _ => mono,
            };
            *out = T::from_sample(value * gain);
        }
    }
}
