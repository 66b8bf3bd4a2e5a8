//! Multi-peer call coordination.
//!
//! Drives one room session: who we hold a connection to, in which class
//! (camera/mic or screen share), and where each offer/answer exchange
//! stands. Media capture, the peer-connection primitive and the signaling
//! transport are injected through the traits in [`media`], [`connection`]
//! and [`signaling`].

pub mod connection;
pub mod identity;
pub mod media;
pub mod registry;
pub mod session;
pub mod signaling;

#[cfg(test)]
mod testing;

pub use connection::{
    ConnectionError, ConnectionEvent, ConnectionEvents, ConnectionFactory, ConnectionSignal,
    ConnectionState, PeerConnection, RtcConfiguration,
};
pub use identity::LocalIdentity;
pub use media::{
    acquire_local_media, DisplayConstraints, LocalStream, LocalTrack, MediaConstraints,
    MediaError, MediaSourceProvider, RemoteStream, TrackKind,
};
pub use registry::{
    ConnectionClass, ConnectionKey, ConnectionRegistry, InFlightSet, NegotiationState, Origin,
    PeerConnectionRecord, RegistryError,
};
pub use session::{CallConfig, CallError, CallEvent, CallSession, RemovalReason};
pub use signaling::{SignalingChannel, SignalingError, WsSignalingClient};
