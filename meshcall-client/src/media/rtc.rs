use crate::media::{
    AudioLevel, LocalMedia, MediaConnection, MediaConnectionFactory, MediaEvent, PeerConnectionState,
    RemoteTrack, SignalingState, TrackKind,
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use meshcall_core::{ConnectionId, IceCandidate, IceServerConfig, SdpKind, SessionDescription};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};
use webrtc::api::API;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpHeaderExtensionCapability, RTPCodecType,
};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

const AUDIO_LEVEL_URI: &str = "urn:ietf:params:rtp-hdrext:ssrc-audio-level";

/// A remote track that delivers no RTP for this long is reported muted.
const MUTE_AFTER: Duration = Duration::from_millis(1500);

/// Builds webrtc-rs peer connections sharing one media engine setup.
///
/// Remote tracks are read by the connection itself: audio energy comes from
/// the RTP audio-level header extension, and a track that stops delivering
/// packets is reported muted until packets resume.
pub struct RtcConnectionFactory {
    api: API,
}

impl RtcConnectionFactory {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        media_engine
            .register_header_extension(
                RTCRtpHeaderExtensionCapability {
                    uri: AUDIO_LEVEL_URI.to_owned(),
                },
                RTPCodecType::Audio,
                None,
            )
            .context("Failed to register audio level extension")?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

#[async_trait]
impl MediaConnectionFactory for RtcConnectionFactory {
    async fn create(
        &self,
        remote: ConnectionId,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Arc<dyn MediaConnection>> {
        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(self.api.new_peer_connection(rtc_config).await?);
        let connection = RtcMediaConnection::wire(remote, peer_connection, events);
        Ok(Arc::new(connection))
    }
}

/// One webrtc-rs peer connection reporting into a session's event channel.
pub struct RtcMediaConnection {
    remote: ConnectionId,
    peer_connection: Arc<RTCPeerConnection>,
}

impl RtcMediaConnection {
    fn wire(
        remote: ConnectionId,
        peer_connection: Arc<RTCPeerConnection>,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Self {
        let state_tx = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                Box::pin(async move {
                    info!("Peer connection state changed for {}: {:?}", remote, s);
                    let _ = tx.send(MediaEvent::ConnectionState(map_connection_state(s)));
                })
            },
        ));

        let ice_tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx.send(MediaEvent::LocalCandidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                }));
            })
        }));

        let negotiation_tx = events.clone();
        peer_connection.on_negotiation_needed(Box::new(move || {
            let tx = negotiation_tx.clone();
            Box::pin(async move {
                let _ = tx.send(MediaEvent::NegotiationNeeded);
            })
        }));

        let track_tx = events;
        peer_connection.on_track(Box::new(move |track, receiver, _transceiver| {
            let tx = track_tx.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    other => {
                        debug!("Ignoring remote track of kind {:?} from {}", other, remote);
                        return;
                    }
                };

                let (level, level_ext) = match kind {
                    TrackKind::Audio => {
                        let ext = receiver
                            .get_parameters()
                            .await
                            .header_extensions
                            .iter()
                            .find(|ext| ext.uri == AUDIO_LEVEL_URI)
                            .map(|ext| ext.id as u8);
                        (Some(Arc::new(RtpAudioLevel::default())), ext)
                    }
                    TrackKind::Video => (None, None),
                };

                let _ = tx.send(MediaEvent::Track(RemoteTrack {
                    id: track.id(),
                    kind,
                    enabled: true,
                    audio_level: level
                        .clone()
                        .map(|level| level as Arc<dyn AudioLevel>),
                }));

                tokio::spawn(read_remote_track(remote, track, kind, level, level_ext, tx));
            })
        }));

        Self {
            remote,
            peer_connection,
        }
    }

    async fn rollback(&self) -> Result<()> {
        let pending = match self.peer_connection.pending_local_description().await {
            Some(desc) => desc,
            None => self
                .peer_connection
                .local_description()
                .await
                .ok_or_else(|| anyhow!("nothing to roll back"))?,
        };

        let mut desc = RTCSessionDescription::default();
        desc.sdp_type = RTCSdpType::Rollback;
        desc.sdp = pending.sdp;
        self.peer_connection.set_local_description(desc).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaConnection for RtcMediaConnection {
    async fn add_local_tracks(&self, media: &LocalMedia) -> Result<()> {
        for track in media.tracks() {
            let mime_type = match track.kind {
                TrackKind::Audio => MIME_TYPE_OPUS,
                TrackKind::Video => MIME_TYPE_VP8,
            };
            let sample_track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: mime_type.to_owned(),
                    ..Default::default()
                },
                track.id.clone(),
                track.stream_id.clone(),
            ));

            self.peer_connection
                .add_track(sample_track as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .with_context(|| format!("Failed to add {:?} track for {}", track.kind, self.remote))?;
        }

        Ok(())
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        let options = RTCOfferOptions {
            ice_restart,
            ..Default::default()
        };
        let offer = self
            .peer_connection
            .create_offer(Some(options))
            .await
            .context("Failed to create offer")?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .context("Failed to create answer")?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let rtc_desc = match desc.kind {
            SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
            SdpKind::Rollback => return self.rollback().await,
        };
        self.peer_connection
            .set_local_description(rtc_desc)
            .await
            .context("Failed to set local description")?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let rtc_desc = match desc.kind {
            SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
            SdpKind::Rollback => return Err(anyhow!("remote rollback is not supported")),
        };
        self.peer_connection
            .set_remote_description(rtc_desc)
            .await
            .context("Failed to set remote description")?;
        Ok(())
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: None,
            })
            .await
            .context("Failed to add ICE candidate")?;
        Ok(())
    }

    async fn signaling_state(&self) -> SignalingState {
        match self.peer_connection.signaling_state() {
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
                SignalingState::HaveLocalOffer
            }
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
                SignalingState::HaveRemoteOffer
            }
            RTCSignalingState::Closed => SignalingState::Closed,
            _ => SignalingState::Stable,
        }
    }

    async fn has_remote_description(&self) -> bool {
        self.peer_connection.remote_description().await.is_some()
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Latest energy carried by a remote audio track's RTP packets.
#[derive(Default)]
struct RtpAudioLevel(AtomicU8);

impl RtpAudioLevel {
    fn set(&self, energy: u8) {
        self.0.store(energy, Ordering::Relaxed);
    }
}

impl AudioLevel for RtpAudioLevel {
    fn energy(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Maps an RFC 6464 level (0 loudest, 127 silent, in -dBov) onto the
/// 0..=255 energy scale, with -100 dBov and below reading as silence.
fn energy_from_dbov(dbov: u8) -> u8 {
    let loudness = 100u32.saturating_sub(u32::from(dbov & 0x7f));
    (loudness * 255 / 70).min(255) as u8
}

/// Drains a remote track until it ends, tracking its level and mute state.
async fn read_remote_track(
    remote: ConnectionId,
    track: Arc<TrackRemote>,
    kind: TrackKind,
    level: Option<Arc<RtpAudioLevel>>,
    level_ext: Option<u8>,
    events: mpsc::UnboundedSender<MediaEvent>,
) {
    let mut muted = false;

    loop {
        match timeout(MUTE_AFTER, track.read_rtp()).await {
            Ok(Ok((packet, _))) => {
                if muted {
                    muted = false;
                    if events.send(MediaEvent::TrackMuted { kind, muted }).is_err() {
                        return;
                    }
                }
                if let (Some(level), Some(id)) = (&level, level_ext) {
                    if let Some(ext) = packet.header.get_extension(id) {
                        if let Some(&dbov) = ext.first() {
                            level.set(energy_from_dbov(dbov));
                        }
                    }
                }
            }
            Ok(Err(e)) => {
                debug!("{:?} track from {} ended: {}", kind, remote, e);
                return;
            }
            Err(_) => {
                if let Some(level) = &level {
                    level.set(0);
                }
                if !muted {
                    muted = true;
                    if events.send(MediaEvent::TrackMuted { kind, muted }).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn map_connection_state(state: RTCPeerConnectionState) -> PeerConnectionState {
    match state {
        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
        _ => PeerConnectionState::New,
    }
}
