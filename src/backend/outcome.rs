use std::sync::Arc;

/// Outcome of syncing a canonical source-library identity with the backend.
///
/// A conflict means the identity already exists server-side; callers continue without an
/// identity handle rather than treating the run as failed.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// The identity was registered or already known, and a handle was returned.
    Synced {
        key_uuid: String,
    },

    /// The backend reported an expected conflict for this descriptor.
    Conflict,

    /// A genuine failure occurred during the operation.
    Failed(Arc<ohno::AppError>),
}

impl SyncOutcome {
    /// Returns the identity handle for a successful sync.
    #[must_use]
    pub fn key_uuid(&self) -> Option<&str> {
        match self {
            Self::Synced { key_uuid } => Some(key_uuid),
            _ => None,
        }
    }

    /// Returns a string describing the status of this outcome.
    #[must_use]
    pub const fn status_str(&self) -> &'static str {
        match self {
            Self::Synced { .. } => "Synced",
            Self::Conflict => "Conflict",
            Self::Failed(_) => "Failed",
        }
    }
}

/// Outcome of a source-file reassignment call.
#[derive(Debug, Clone)]
pub enum ReassignOutcome {
    /// The backend accepted the reassignment.
    Applied,

    /// The backend reported an expected conflict; the files keep their current attribution.
    Conflict,

    /// A genuine failure occurred during the operation.
    Failed(Arc<ohno::AppError>),
}

impl ReassignOutcome {
    /// Returns `true` if the reassignment was accepted.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Returns a string describing the status of this outcome.
    #[must_use]
    pub const fn status_str(&self) -> &'static str {
        match self {
            Self::Applied => "Applied",
            Self::Conflict => "Conflict",
            Self::Failed(_) => "Failed",
        }
    }
}
