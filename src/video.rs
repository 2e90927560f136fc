//! Video rendering: RTP depacketization, H.264 decoding and the frame slot
//! the UI paints from.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use openh264::decoder::Decoder;
use tracing::{debug, info, warn};
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::rtp::packet::Packet;
use webrtc::track::track_remote::TrackRemote;

use crate::error::{Error, Result};
use crate::media::MediaOutput;
use crate::session::EventSender;
use crate::viewer::ViewerEvent;

const H264_CLOCK_RATE: u32 = 90_000;
const MAX_LATE: u16 = 512;
const JPEG_QUALITY: u8 = 80;
const PLI_INTERVAL: Duration = Duration::from_secs(2);

pub fn is_h264(mime_type: &str) -> bool {
    mime_type.eq_ignore_ascii_case("video/h264")
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB, three bytes per pixel.
    pub rgb: Vec<u8>,
}

impl VideoFrame {
    pub fn to_jpeg_data_url(&self) -> Result<String> {
        let mut jpeg = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
            .write_image(&self.rgb, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| Error::Video(format!("JPEG encoding failed: {e}")))?;
        Ok(format!(
            "data:image/jpeg;base64,{}",
            STANDARD.encode(jpeg.into_inner())
        ))
    }
}

/// Latest decoded picture, overwritten by every new one. Readers ask for
/// anything newer than the sequence number they last saw.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<(u64, Option<Arc<VideoFrame>>)>>,
}

impl FrameSlot {
    pub fn publish(&self, frame: VideoFrame) {
        let mut slot = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        slot.0 += 1;
        slot.1 = Some(Arc::new(frame));
    }

    pub fn newer_than(&self, seen: u64) -> Option<(u64, Arc<VideoFrame>)> {
        let slot = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match &slot.1 {
            Some(frame) if slot.0 > seen => Some((slot.0, frame.clone())),
            _ => None,
        }
    }
}

/// Reassembles RTP packets into Annex B access units.
pub struct H264Depacketizer {
    builder: SampleBuilder<H264Packet>,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self {
            builder: SampleBuilder::new(MAX_LATE, H264Packet::default(), H264_CLOCK_RATE),
        }
    }

    pub fn push(&mut self, packet: Packet) -> Vec<Vec<u8>> {
        self.builder.push(packet);
        let mut units = Vec::new();
        while let Some(sample) = self.builder.pop() {
            if !sample.data.is_empty() {
                units.push(sample.data.to_vec());
            }
        }
        units
    }
}

pub struct H264Decoder {
    decoder: Decoder,
}

impl H264Decoder {
    pub fn new() -> Result<Self> {
        let decoder =
            Decoder::new().map_err(|e| Error::Video(format!("failed to create decoder: {e}")))?;
        Ok(Self { decoder })
    }

    /// Returns a picture once the decoder has one to show.
    pub fn decode(&mut self, access_unit: &[u8]) -> Result<Option<VideoFrame>> {
        let Some(yuv) = self
            .decoder
            .decode(access_unit)
            .map_err(|e| Error::Video(format!("decode failed: {e}")))?
        else {
            return Ok(None);
        };

        let (width, height) = yuv.dimension_rgb();
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let mut rgb = vec![0u8; width * height * 3];
        yuv.write_rgb8(&mut rgb);

        Ok(Some(VideoFrame {
            width: width as u32,
            height: height as u32,
            rgb,
        }))
    }
}

/// Decodes access units on its own thread and publishes the pictures. The
/// first picture the decoder produces is reported as `RenderingStarted`.
pub struct VideoRenderer {
    units: mpsc::Sender<Vec<u8>>,
    rendered: Arc<AtomicBool>,
}

impl VideoRenderer {
    pub fn start(frames: FrameSlot, events: EventSender) -> Result<Self> {
        let (unit_tx, unit_rx) = mpsc::channel::<Vec<u8>>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let rendered = Arc::new(AtomicBool::new(false));
        let first_picture = rendered.clone();

        thread::Builder::new()
            .name("video-decoder".into())
            .spawn(move || {
                let mut decoder = match H264Decoder::new() {
                    Ok(decoder) => decoder,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Ok(unit) = unit_rx.recv() {
                    match decoder.decode(&unit) {
                        Ok(Some(frame)) => {
                            let (width, height) = (frame.width, frame.height);
                            frames.publish(frame);
                            if !first_picture.swap(true, Ordering::SeqCst) {
                                info!("first video frame decoded ({width}x{height})");
                                let _ = events.send(ViewerEvent::RenderingStarted);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => debug!("dropping access unit: {e}"),
                    }
                }
                debug!("video decoder stopped");
            })
            .map_err(|e| Error::Video(format!("failed to spawn decoder thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Video("decoder thread exited during setup".into()))??;

        Ok(Self {
            units: unit_tx,
            rendered,
        })
    }

    pub fn push(&self, access_unit: Vec<u8>) -> Result<()> {
        self.units
            .send(access_unit)
            .map_err(|_| Error::Video("decoder thread is gone".into()))
    }

    pub fn has_rendered(&self) -> bool {
        self.rendered.load(Ordering::SeqCst)
    }
}

/// Reads the remote video track until it ends. Key frames are requested
/// with PLI until the decoder shows the first picture.
pub async fn watch_video(
    track: Arc<TrackRemote>,
    events: EventSender,
    pc: Weak<RTCPeerConnection>,
    output: MediaOutput,
) {
    let mime_type = track.codec().capability.mime_type;
    if !is_h264(&mime_type) {
        warn!("no decoder for {mime_type}, video track {} will not be shown", track.id());
        while track.read_rtp().await.is_ok() {}
        return;
    }

    let frames = output.frames();
    let renderer = match tokio::task::spawn_blocking(move || VideoRenderer::start(frames, events))
        .await
    {
        Ok(Ok(renderer)) => renderer,
        Ok(Err(e)) => {
            warn!("video decoder unavailable, track will be discarded: {e}");
            while track.read_rtp().await.is_ok() {}
            return;
        }
        Err(e) => {
            warn!("video setup task failed: {e}");
            return;
        }
    };

    let media_ssrc = track.ssrc();
    let mut depacketizer = H264Depacketizer::new();
    let mut pli = tokio::time::interval(PLI_INTERVAL);

    loop {
        tokio::select! {
            read = track.read_rtp() => {
                let Ok((packet, _)) = read else { break };
                for unit in depacketizer.push(packet) {
                    if renderer.push(unit).is_err() {
                        return;
                    }
                }
            }
            _ = pli.tick(), if !renderer.has_rendered() => {
                let Some(pc) = pc.upgrade() else { break };
                let request = PictureLossIndication { sender_ssrc: 0, media_ssrc };
                if let Err(e) = pc.write_rtcp(&[Box::new(request)]).await {
                    debug!("key frame request failed: {e}");
                }
            }
        }
    }
    info!("video track {} ended", track.id());
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::Bytes;
    use openh264::encoder::{Encoder, EncoderConfig};
    use openh264::formats::YUVBuffer;
    use tokio::sync::mpsc::unbounded_channel;
    use webrtc::rtp::codecs::h264::H264Payloader;
    use webrtc::rtp::header::Header;
    use webrtc::rtp::packetizer::Payloader;

    pub(crate) const WIDTH: usize = 64;
    pub(crate) const HEIGHT: usize = 48;

    /// A blank picture encoded as SPS, PPS and IDR. Each copy decodes on its
    /// own, so tests repeat it instead of relying on encoder skip frames.
    pub(crate) fn idr_frame() -> Vec<u8> {
        let mut encoder =
            Encoder::with_config(EncoderConfig::new(WIDTH as u32, HEIGHT as u32)).unwrap();
        let yuv = YUVBuffer::new(WIDTH, HEIGHT);
        encoder.encode(&yuv).unwrap().to_vec()
    }

    fn packetize(frames: &[Vec<u8>]) -> Vec<Packet> {
        let mut payloader = H264Payloader::default();
        let mut packets = Vec::new();
        let mut seq = 1000u16;
        for (i, frame) in frames.iter().enumerate() {
            let payloads = payloader.payload(1200, &Bytes::from(frame.clone())).unwrap();
            let last = payloads.len().saturating_sub(1);
            for (j, payload) in payloads.into_iter().enumerate() {
                packets.push(Packet {
                    header: Header {
                        sequence_number: seq,
                        timestamp: 3000 * i as u32,
                        marker: j == last,
                        payload_type: 102,
                        ..Default::default()
                    },
                    payload,
                });
                seq = seq.wrapping_add(1);
            }
        }
        packets
    }

    #[test]
    fn mime_check_is_case_insensitive() {
        assert!(is_h264("video/H264"));
        assert!(!is_h264("video/VP8"));
    }

    #[test]
    fn decoder_shows_encoded_frame() {
        let mut decoder = H264Decoder::new().unwrap();
        let frame = decoder.decode(&idr_frame()).unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (WIDTH as u32, HEIGHT as u32));
        assert_eq!(frame.rgb.len(), WIDTH * HEIGHT * 3);
    }

    #[test]
    fn bare_idr_header_is_not_a_picture() {
        let mut decoder = H264Decoder::new().unwrap();
        let shown = decoder.decode(&[0, 0, 0, 1, 0x65]).ok().flatten();
        assert!(shown.is_none());
    }

    #[test]
    fn depacketized_units_decode() {
        let idr = idr_frame();
        let frames = vec![idr.clone(), idr.clone(), idr];
        let mut depacketizer = H264Depacketizer::new();
        let units: Vec<Vec<u8>> = packetize(&frames)
            .into_iter()
            .flat_map(|packet| depacketizer.push(packet))
            .collect();
        assert!(!units.is_empty());

        let mut decoder = H264Decoder::new().unwrap();
        let decoded = units
            .iter()
            .filter_map(|unit| decoder.decode(unit).ok().flatten())
            .count();
        assert!(decoded >= 1);
    }

    #[test]
    fn slot_hands_out_only_newer_frames() {
        let slot = FrameSlot::default();
        assert!(slot.newer_than(0).is_none());

        slot.publish(VideoFrame {
            width: 1,
            height: 1,
            rgb: vec![0, 0, 0],
        });
        let (seq, frame) = slot.newer_than(0).unwrap();
        assert_eq!(frame.width, 1);
        assert!(slot.newer_than(seq).is_none());
    }

    #[test]
    fn frame_encodes_to_jpeg_data_url() {
        let frame = VideoFrame {
            width: 2,
            height: 2,
            rgb: vec![255; 12],
        };
        let url = frame.to_jpeg_data_url().unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[tokio::test]
    async fn rendering_starts_only_after_a_decoded_picture() {
        let (tx, mut rx) = unbounded_channel();
        let slot = FrameSlot::default();
        let renderer = VideoRenderer::start(slot.clone(), tx).unwrap();

        renderer.push(vec![0, 0, 0, 1, 0x65]).unwrap();
        let early = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(early.is_err(), "undecodable data reported as rendered");
        assert!(!renderer.has_rendered());

        renderer.push(idr_frame()).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(ViewerEvent::RenderingStarted));
        assert!(renderer.has_rendered());
        assert!(slot.newer_than(0).is_some());
    }
}
