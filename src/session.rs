use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Url;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use crate::audio;
use crate::config::ViewerConfig;
use crate::connection::PeerState;
use crate::error::{Error, Result};
use crate::media::{MediaKind, MediaOutput, TrackInfo};
use crate::signaling::{SignalingTransport, WhepSignaling};
use crate::video;
use crate::viewer::ViewerEvent;

pub type EventSender = UnboundedSender<ViewerEvent>;

/// Owns the one peer connection of a viewing session. Built receive-only for
/// video and audio; the offer is sent at most once.
pub struct ViewerSession {
    pub peer_connection: Arc<RTCPeerConnection>,
    offer_sent: AtomicBool,
}

impl ViewerSession {
    pub async fn new(events: EventSender, output: MediaOutput) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        // The media server often runs on the same machine as the viewer.
        let mut setting_engine = SettingEngine::default();
        setting_engine.set_include_loopback_candidate(true);

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build();

        let peer_connection = Arc::new(api.new_peer_connection(RTCConfiguration::default()).await?);

        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            peer_connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }

        let track_events = events.clone();
        let pc = Arc::downgrade(&peer_connection);
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                let events = track_events.clone();
                let output = output.clone();
                let pc = pc.clone();
                Box::pin(async move {
                    let Some(kind) = MediaKind::from_codec_type(track.kind()) else {
                        warn!("ignoring track {} of unknown kind", track.id());
                        return;
                    };
                    let info = TrackInfo {
                        id: track.id(),
                        stream_id: track.stream_id(),
                        kind,
                        mime_type: track.codec().capability.mime_type,
                    };
                    info!("received {} track {} ({})", info.kind, info.id, info.mime_type);
                    let _ = events.send(ViewerEvent::TrackAdded(info));

                    match kind {
                        MediaKind::Video => {
                            tokio::spawn(video::watch_video(track, events, pc, output));
                        }
                        MediaKind::Audio => {
                            tokio::spawn(audio::play_track(track, output));
                        }
                    }
                })
            },
        ));

        let state_events = events;
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let state = PeerState::from(s);
                info!("peer connection state changed to {state}");
                let _ = state_events.send(ViewerEvent::StateChanged(state));
                Box::pin(async {})
            },
        ));

        Ok(Self {
            peer_connection,
            offer_sent: AtomicBool::new(false),
        })
    }

    /// Runs the offer/answer exchange. The offer carries all gathered
    /// candidates since nothing is trickled after the single POST.
    pub async fn negotiate<T>(&self, transport: &T, endpoint: &Url) -> Result<()>
    where
        T: SignalingTransport + ?Sized,
    {
        if self.offer_sent.swap(true, Ordering::SeqCst) {
            return Err(Error::OfferAlreadySent);
        }

        let offer = self.peer_connection.create_offer(None).await?;
        let mut gather_complete = self.peer_connection.gathering_complete_promise().await;
        self.peer_connection.set_local_description(offer).await?;
        let _ = gather_complete.recv().await;

        let local = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::Config("local description missing after commit".into()))?;

        let answer_sdp = transport.post_offer(endpoint, &local.sdp).await?;
        let answer = RTCSessionDescription::answer(answer_sdp)?;
        self.peer_connection.set_remote_description(answer).await?;

        debug!("remote description applied");
        Ok(())
    }

    /// Negotiates and closes the peer connection if that fails, so a failed
    /// session holds no sockets or gathering tasks.
    pub async fn connect<T>(&self, transport: &T, endpoint: &Url) -> Result<()>
    where
        T: SignalingTransport + ?Sized,
    {
        let result = self.negotiate(transport, endpoint).await;
        if result.is_err() {
            if let Err(e) = self.close().await {
                warn!("failed to close peer connection after negotiation error: {e}");
            }
        }
        result
    }

    pub async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Builds the session and negotiates with the configured WHEP endpoint. Any
/// failure is logged and reported once as `NegotiationFailed`.
pub async fn start(
    config: &ViewerConfig,
    events: EventSender,
    output: MediaOutput,
) -> Option<Arc<ViewerSession>> {
    start_with(config, &WhepSignaling::new(), events, output).await
}

pub async fn start_with<T>(
    config: &ViewerConfig,
    transport: &T,
    events: EventSender,
    output: MediaOutput,
) -> Option<Arc<ViewerSession>>
where
    T: SignalingTransport + ?Sized,
{
    let _ = events.send(ViewerEvent::NegotiationStarted);

    let result = async {
        let endpoint = config.whep_endpoint()?;
        let session = Arc::new(ViewerSession::new(events.clone(), output).await?);
        session.connect(transport, &endpoint).await?;
        Ok::<_, Error>(session)
    }
    .await;

    match result {
        Ok(session) => Some(session),
        Err(e) => {
            error!("connection failed: {e}");
            let _ = events.send(ViewerEvent::NegotiationFailed(e.to_string()));
            None
        }
    }
}
