use huddle_common::PeerId;
use serde::{Deserialize, Serialize};

/// The local participant. Generated once and persisted by the embedding
/// application; the call layer only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub user_id: PeerId,
}

impl LocalIdentity {
    pub fn generate() -> Self {
        Self {
            user_id: PeerId::generate(),
        }
    }

    /// Restore an identity persisted by a previous run.
    pub fn from_persisted(user_id: impl Into<String>) -> Self {
        Self {
            user_id: PeerId::new(user_id),
        }
    }
}
