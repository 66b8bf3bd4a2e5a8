pub mod errors;
pub mod id;
pub mod signal;

pub use errors::{ConfigError, HuddleError};
pub use id::{new_id, PeerId, RoomId};
pub use signal::{CandidatePayload, IceCandidate, SdpKind, SdpPayload, SessionDescription, SignalMessage};
