use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use crate::video::FrameSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn from_codec_type(kind: RTPCodecType) -> Option<Self> {
        match kind {
            RTPCodecType::Audio => Some(MediaKind::Audio),
            RTPCodecType::Video => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub stream_id: String,
    pub kind: MediaKind,
    pub mime_type: String,
}

/// Every inbound track ever received on the connection. Tracks are only
/// appended; nothing is deduplicated or removed while the connection lives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteStream {
    tracks: Vec<TrackInfo>,
}

impl RemoteStream {
    pub fn add_track(&mut self, track: TrackInfo) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

}

/// Render-side state shared between the UI and the track readers: the mute
/// switch and the slot holding the latest decoded picture.
#[derive(Debug, Clone)]
pub struct MediaOutput {
    muted: Arc<AtomicBool>,
    frames: FrameSlot,
}

impl MediaOutput {
    /// Output always starts muted so playback can begin without user input.
    pub fn new() -> Self {
        Self {
            muted: Arc::new(AtomicBool::new(true)),
            frames: FrameSlot::default(),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub(crate) fn muted_flag(&self) -> Arc<AtomicBool> {
        self.muted.clone()
    }

    pub fn frames(&self) -> FrameSlot {
        self.frames.clone()
    }
}

impl Default for MediaOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_starts_muted() {
        let output = MediaOutput::new();
        assert!(output.is_muted());
        output.set_muted(false);
        assert!(!output.clone().is_muted());
    }

    #[test]
    fn stream_accumulates_tracks_in_arrival_order() {
        let mut stream = RemoteStream::default();
        for kind in [MediaKind::Video, MediaKind::Audio, MediaKind::Video] {
            stream.add_track(TrackInfo {
                id: format!("{kind}"),
                stream_id: "stream".into(),
                kind,
                mime_type: String::new(),
            });
        }
        assert_eq!(stream.tracks().len(), 3);
        assert_eq!(stream.tracks()[1].kind, MediaKind::Audio);
        assert_eq!(stream.tracks()[2].kind, MediaKind::Video);
    }
}
