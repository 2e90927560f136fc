use thiserror::Error;
use webrtc::Error as WebRTCError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("WebRTC error: {0}")]
    WebRTC(#[from] WebRTCError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("signaling endpoint answered with status {0}")]
    Status(u16),

    #[error("signaling endpoint returned an empty answer")]
    EmptyAnswer,

    #[error("offer was already sent for this session")]
    OfferAlreadySent,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("video error: {0}")]
    Video(String),

    #[error("fullscreen request refused: {0}")]
    Fullscreen(String),
}

pub type Result<T> = std::result::Result<T, Error>;
