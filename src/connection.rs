use std::fmt;

use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Peer connection state as reported by the WebRTC engine. The viewer only
/// observes these transitions, it never drives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    /// States after which the viewer considers the connection lost for good.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PeerState::Disconnected | PeerState::Failed | PeerState::Closed
        )
    }
}

impl From<RTCPeerConnectionState> for PeerState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => PeerState::New,
            RTCPeerConnectionState::Connecting => PeerState::Connecting,
            RTCPeerConnectionState::Connected => PeerState::Connected,
            RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
            RTCPeerConnectionState::Failed => PeerState::Failed,
            RTCPeerConnectionState::Closed => PeerState::Closed,
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerState::New => write!(f, "new"),
            PeerState::Connecting => write!(f, "connecting"),
            PeerState::Connected => write!(f, "connected"),
            PeerState::Disconnected => write!(f, "disconnected"),
            PeerState::Failed => write!(f, "failed"),
            PeerState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_engine_states() {
        assert_eq!(
            PeerState::from(RTCPeerConnectionState::Unspecified),
            PeerState::New
        );
        assert_eq!(
            PeerState::from(RTCPeerConnectionState::Connected),
            PeerState::Connected
        );
        assert_eq!(
            PeerState::from(RTCPeerConnectionState::Failed),
            PeerState::Failed
        );
    }

    #[test]
    fn only_loss_states_are_terminal() {
        assert!(!PeerState::New.is_terminal());
        assert!(!PeerState::Connecting.is_terminal());
        assert!(!PeerState::Connected.is_terminal());
        assert!(PeerState::Disconnected.is_terminal());
        assert!(PeerState::Failed.is_terminal());
        assert!(PeerState::Closed.is_terminal());
    }
}
