use thiserror::Error;

use crate::model::MatchKind;
use crate::platform::PlatformError;
use crate::settings::SettingsError;
use crate::store::StoreError;

/// Failures of the queue and match lifecycle operations.
///
/// `NotFound`, `NotPending` and `AlreadyFinished` are informational: they are
/// shown to whoever pressed the button and nothing else happens.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The referenced match is not (or no longer) active.
    #[error("no active match found for `{0}`")]
    NotFound(String),

    /// A result was submitted for a match that is not waiting for one.
    #[error("match `{0}` is not waiting for a result; use Finish Match first")]
    NotPending(String),

    #[error("match `{0}` is already waiting for a result")]
    AlreadyFinished(String),

    /// The voice channel pool for this kind of match is empty.
    #[error("no voice channels are configured for {0} matches")]
    NoChannels(MatchKind),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl QueueError {
    /// Whether the error is a rejected request rather than a failure.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            QueueError::NotFound(_) | QueueError::NotPending(_) | QueueError::AlreadyFinished(_)
        )
    }
}
