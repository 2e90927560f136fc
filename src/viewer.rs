//! Viewer state and the event dispatcher that drives it.
//!
//! Everything the UI shows is derived from [`ViewerState`], which only
//! changes through [`ViewerState::handle`]. Side effects the state asks for
//! come back as a [`Command`] and are carried out by [`execute`].

use tracing::{info, warn};

use crate::connection::PeerState;
use crate::error::Result;
use crate::media::{MediaOutput, RemoteStream, TrackInfo};

pub const STATUS_STARTING: &str = "Connecting to media server...";
pub const STATUS_CONNECTING: &str = "Connecting...";
pub const STATUS_WAITING_FOR_VIDEO: &str = "Connection established. Waiting for video...";
pub const STATUS_FAILED: &str = "Connection failed. Is mediamtx running?";
pub const STATUS_LOST: &str = "Connection lost.";

pub const MUTED_ICON: &str = include_str!("../public/icons/muted.svg");
pub const UNMUTED_ICON: &str = include_str!("../public/icons/unmuted.svg");

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    NegotiationStarted,
    NegotiationFailed(String),
    StateChanged(PeerState),
    TrackAdded(TrackInfo),
    /// The decoder produced its first picture.
    RenderingStarted,
    UserToggledMute,
    UserToggledFullscreen,
    FullscreenChanged(bool),
    FullscreenFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleFullscreen,
    SetMuted(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Connecting,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    phase: Phase,
    /// The peer connection reported `connected`.
    negotiated: bool,
    /// A video frame is on screen. Distinct from `negotiated`: a connected
    /// session may not have delivered a decodable frame yet.
    rendering: bool,
    failed: bool,
    lost: bool,
    muted: bool,
    fullscreen: bool,
    stream: RemoteStream,
}

impl ViewerState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Starting,
            negotiated: false,
            rendering: false,
            failed: false,
            lost: false,
            muted: true,
            fullscreen: false,
            stream: RemoteStream::default(),
        }
    }

    pub fn handle(&mut self, event: ViewerEvent) -> Option<Command> {
        match event {
            ViewerEvent::NegotiationStarted => {
                self.phase = Phase::Starting;
                None
            }
            ViewerEvent::NegotiationFailed(reason) => {
                warn!("negotiation failed: {reason}");
                self.failed = true;
                None
            }
            ViewerEvent::StateChanged(state) => {
                match state {
                    state if state.is_terminal() => self.lost = true,
                    PeerState::Connecting => self.phase = Phase::Connecting,
                    PeerState::Connected => self.negotiated = true,
                    _ => {}
                }
                None
            }
            ViewerEvent::TrackAdded(track) => {
                self.stream.add_track(track);
                None
            }
            ViewerEvent::RenderingStarted => {
                self.rendering = true;
                None
            }
            ViewerEvent::UserToggledMute => {
                self.muted = !self.muted;
                Some(Command::SetMuted(self.muted))
            }
            ViewerEvent::UserToggledFullscreen => Some(Command::ToggleFullscreen),
            ViewerEvent::FullscreenChanged(fullscreen) => {
                self.fullscreen = fullscreen;
                None
            }
            ViewerEvent::FullscreenFailed(reason) => {
                warn!("error attempting to enable fullscreen mode: {reason}");
                None
            }
        }
    }

    /// Overlay text, or `None` when the overlay is hidden.
    pub fn status(&self) -> Option<&'static str> {
        if self.failed {
            Some(STATUS_FAILED)
        } else if self.lost {
            Some(STATUS_LOST)
        } else if self.rendering {
            None
        } else if self.negotiated {
            Some(STATUS_WAITING_FOR_VIDEO)
        } else {
            Some(match self.phase {
                Phase::Starting => STATUS_STARTING,
                Phase::Connecting => STATUS_CONNECTING,
            })
        }
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn stream(&self) -> &RemoteStream {
        &self.stream
    }

    /// Tooltip for the mute button: the action a click performs.
    pub fn mute_label(&self) -> &'static str {
        if self.muted {
            "Unmute"
        } else {
            "Mute"
        }
    }

    pub fn mute_icon(&self) -> &'static str {
        if self.muted {
            MUTED_ICON
        } else {
            UNMUTED_ICON
        }
    }
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that can show the video full screen.
pub trait FullscreenSurface {
    fn is_fullscreen(&self) -> bool;
    fn request_fullscreen(&self) -> Result<()>;
    fn exit_fullscreen(&self);
}

/// Performs a command and returns the event describing its outcome.
pub fn execute<S>(command: Command, surface: &S, output: &MediaOutput) -> Option<ViewerEvent>
where
    S: FullscreenSurface + ?Sized,
{
    match command {
        Command::SetMuted(muted) => {
            output.set_muted(muted);
            info!("audio {}", if muted { "muted" } else { "unmuted" });
            None
        }
        Command::ToggleFullscreen => {
            if !surface.is_fullscreen() {
                match surface.request_fullscreen() {
                    Ok(()) => Some(ViewerEvent::FullscreenChanged(true)),
                    Err(e) => Some(ViewerEvent::FullscreenFailed(e.to_string())),
                }
            } else {
                surface.exit_fullscreen();
                Some(ViewerEvent::FullscreenChanged(false))
            }
        }
    }
}

/// Applies an event and any follow-up events its command produces.
pub fn dispatch<S>(
    state: &mut ViewerState,
    event: ViewerEvent,
    surface: &S,
    output: &MediaOutput,
) where
    S: FullscreenSurface + ?Sized,
{
    let mut next = Some(event);
    while let Some(event) = next.take() {
        next = state
            .handle(event)
            .and_then(|command| execute(command, surface, output));
    }
}
