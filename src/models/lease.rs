//! Lease sub-state shared by containers and blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lease state for containers and blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LeaseState {
    #[default]
    Available,
    Leased,
    Expired,
    Breaking,
    Broken,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseState::Available => "available",
            LeaseState::Leased => "leased",
            LeaseState::Expired => "expired",
            LeaseState::Breaking => "breaking",
            LeaseState::Broken => "broken",
        }
    }
}

/// Lease status for containers and blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LeaseStatus {
    #[default]
    Unlocked,
    Locked,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Unlocked => "unlocked",
            LeaseStatus::Locked => "locked",
        }
    }
}

/// Lease duration: infinite, or fixed in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseDuration {
    Infinite,
    Fixed(u32),
}

impl LeaseDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseDuration::Infinite => "infinite",
            LeaseDuration::Fixed(_) => "fixed",
        }
    }
}

/// Lease fields stored on a container or blob.
///
/// `id` is retained while Expired so a renew with the last-held id can
/// revive the lease; it is never reported to clients in that state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LeaseProperties {
    pub state: LeaseState,
    pub id: Option<String>,
    pub duration: Option<LeaseDuration>,
    pub expiry: Option<DateTime<Utc>>,
    pub break_time: Option<DateTime<Utc>>,
}

impl LeaseProperties {
    /// Locked while a lease is held or breaking.
    pub fn status(&self) -> LeaseStatus {
        match self.state {
            LeaseState::Leased | LeaseState::Breaking => LeaseStatus::Locked,
            _ => LeaseStatus::Unlocked,
        }
    }

    /// Whether writes must present the lease id.
    pub fn is_active(&self) -> bool {
        self.status() == LeaseStatus::Locked
    }

    /// The lease id as reported to clients.
    pub fn reported_id(&self) -> Option<&str> {
        match self.state {
            LeaseState::Leased | LeaseState::Breaking | LeaseState::Broken => self.id.as_deref(),
            _ => None,
        }
    }

    /// The lease duration as reported to clients (only while leased).
    pub fn reported_duration(&self) -> Option<LeaseDuration> {
        match self.state {
            LeaseState::Leased => self.duration,
            _ => None,
        }
    }
}
