//! Lease state machine for containers and blobs.
//!
//! Time-based transitions (Leased → Expired, Breaking → Broken) are never
//! driven by a timer. Every entry point reconciles the stored lease against
//! `now` before branching on its state, so callers only need to persist the
//! returned lease.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::{LeaseDuration, LeaseProperties, LeaseState};

/// Shortest fixed lease, in seconds.
pub const MIN_LEASE_DURATION: u32 = 15;
/// Longest fixed lease, in seconds.
pub const MAX_LEASE_DURATION: u32 = 60;
/// Longest break period, in seconds.
pub const MAX_BREAK_PERIOD: u32 = 60;

/// A parsed `x-ms-lease-action` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAction {
    Acquire {
        duration: LeaseDuration,
        proposed_id: Option<String>,
    },
    Renew {
        lease_id: String,
    },
    Release {
        lease_id: String,
    },
    Break {
        break_period: Option<u32>,
    },
    Change {
        lease_id: String,
        proposed_id: String,
    },
}

impl LeaseAction {
    /// Builds an action from the raw lease headers.
    pub fn parse(
        action: &str,
        lease_id: Option<&str>,
        proposed_id: Option<&str>,
        duration: Option<&str>,
        break_period: Option<&str>,
    ) -> StorageResult<Self> {
        let required_id = |value: Option<&str>, header: &str| {
            value.map(String::from).ok_or_else(|| {
                StorageError::with_message(
                    ErrorCode::MissingRequiredHeader,
                    format!("A required header was not specified: {}", header),
                )
            })
        };

        match action.to_ascii_lowercase().as_str() {
            "acquire" => Ok(LeaseAction::Acquire {
                duration: parse_lease_duration(duration)?,
                proposed_id: proposed_id
                    .map(|id| validate_lease_id(id, "x-ms-proposed-lease-id"))
                    .transpose()?,
            }),
            "renew" => Ok(LeaseAction::Renew {
                lease_id: required_id(lease_id, "x-ms-lease-id")?,
            }),
            "release" => Ok(LeaseAction::Release {
                lease_id: required_id(lease_id, "x-ms-lease-id")?,
            }),
            "break" => Ok(LeaseAction::Break {
                break_period: parse_break_period(break_period)?,
            }),
            "change" => {
                let lease_id = required_id(lease_id, "x-ms-lease-id")?;
                let proposed = required_id(proposed_id, "x-ms-proposed-lease-id")?;
                Ok(LeaseAction::Change {
                    lease_id,
                    proposed_id: validate_lease_id(&proposed, "x-ms-proposed-lease-id")?,
                })
            }
            _ => Err(StorageError::invalid_header("x-ms-lease-action", action)),
        }
    }
}

/// Parses `x-ms-lease-duration`: `-1` for infinite, or 15..=60 seconds.
fn parse_lease_duration(value: Option<&str>) -> StorageResult<LeaseDuration> {
    let Some(raw) = value else {
        return Ok(LeaseDuration::Infinite);
    };
    match raw.trim().parse::<i64>() {
        Ok(-1) => Ok(LeaseDuration::Infinite),
        Ok(secs) if (MIN_LEASE_DURATION as i64..=MAX_LEASE_DURATION as i64).contains(&secs) => {
            Ok(LeaseDuration::Fixed(secs as u32))
        }
        _ => Err(StorageError::invalid_header("x-ms-lease-duration", raw)),
    }
}

/// Parses `x-ms-lease-break-period`: 0..=60 seconds.
fn parse_break_period(value: Option<&str>) -> StorageResult<Option<u32>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    match raw.trim().parse::<u32>() {
        Ok(secs) if secs <= MAX_BREAK_PERIOD => Ok(Some(secs)),
        _ => Err(StorageError::invalid_header("x-ms-lease-break-period", raw)),
    }
}

/// Lease ids are GUIDs.
fn validate_lease_id(id: &str, header: &str) -> StorageResult<String> {
    uuid::Uuid::parse_str(id)
        .map(|_| id.to_string())
        .map_err(|_| StorageError::invalid_header(header, id))
}

/// Result of a successful lease operation.
#[derive(Debug, Clone)]
pub struct LeaseTransition {
    /// The lease to persist.
    pub lease: LeaseProperties,
    /// Reported in `x-ms-lease-id` (acquire, renew, change).
    pub lease_id: Option<String>,
    /// Reported in `x-ms-lease-time` (break).
    pub lease_time: Option<u32>,
}

/// Applies the time-based transitions that are due at `now`.
pub fn reconcile(lease: &LeaseProperties, now: DateTime<Utc>) -> LeaseProperties {
    let mut lease = lease.clone();
    match lease.state {
        LeaseState::Leased => {
            if matches!(lease.expiry, Some(expiry) if expiry <= now) {
                lease.state = LeaseState::Expired;
                lease.expiry = None;
            }
        }
        LeaseState::Breaking => {
            if lease.break_time.map_or(true, |t| t <= now) {
                lease.state = LeaseState::Broken;
                lease.break_time = None;
                lease.expiry = None;
            }
        }
        _ => {}
    }
    lease
}

/// Runs `action` against `lease`.
pub fn apply(
    lease: &LeaseProperties,
    action: &LeaseAction,
    now: DateTime<Utc>,
) -> StorageResult<LeaseTransition> {
    let current = reconcile(lease, now);
    let transition = match action {
        LeaseAction::Acquire {
            duration,
            proposed_id,
        } => acquire(&current, *duration, proposed_id.as_deref(), now),
        LeaseAction::Renew { lease_id } => renew(&current, lease_id, now),
        LeaseAction::Release { lease_id } => release(&current, lease_id),
        LeaseAction::Break { break_period } => break_lease(&current, *break_period, now),
        LeaseAction::Change {
            lease_id,
            proposed_id,
        } => change(&current, lease_id, proposed_id),
    }?;

    debug!(
        from = current.state.as_str(),
        to = transition.lease.state.as_str(),
        "lease transition"
    );
    Ok(transition)
}

fn held_id_matches(lease: &LeaseProperties, lease_id: &str) -> bool {
    lease.id.as_deref() == Some(lease_id)
}

fn mismatch() -> StorageError {
    StorageError::new(ErrorCode::LeaseIdMismatchWithLeaseOperation)
}

fn not_present() -> StorageError {
    StorageError::new(ErrorCode::LeaseNotPresentWithLeaseOperation)
}

fn leased(id: String, duration: LeaseDuration, now: DateTime<Utc>) -> LeaseProperties {
    let expiry = match duration {
        LeaseDuration::Infinite => None,
        LeaseDuration::Fixed(secs) => Some(now + Duration::seconds(secs as i64)),
    };
    LeaseProperties {
        state: LeaseState::Leased,
        id: Some(id),
        duration: Some(duration),
        expiry,
        break_time: None,
    }
}

fn acquire(
    lease: &LeaseProperties,
    duration: LeaseDuration,
    proposed_id: Option<&str>,
    now: DateTime<Utc>,
) -> StorageResult<LeaseTransition> {
    let proposed_matches = proposed_id.map_or(false, |id| held_id_matches(lease, id));

    match lease.state {
        LeaseState::Leased if !proposed_matches => {
            return Err(StorageError::new(ErrorCode::LeaseAlreadyPresent))
        }
        LeaseState::Breaking if proposed_matches => {
            return Err(StorageError::new(ErrorCode::LeaseIsBreakingAndCannotBeAcquired))
        }
        LeaseState::Breaking => return Err(StorageError::new(ErrorCode::LeaseAlreadyPresent)),
        _ => {}
    }

    let id = proposed_id
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let lease = leased(id.clone(), duration, now);
    Ok(LeaseTransition {
        lease,
        lease_id: Some(id),
        lease_time: None,
    })
}

fn renew(lease: &LeaseProperties, lease_id: &str, now: DateTime<Utc>) -> StorageResult<LeaseTransition> {
    if lease.state == LeaseState::Available || !held_id_matches(lease, lease_id) {
        return Err(mismatch());
    }

    match lease.state {
        LeaseState::Leased | LeaseState::Expired => {
            let duration = lease.duration.unwrap_or(LeaseDuration::Infinite);
            Ok(LeaseTransition {
                lease: leased(lease_id.to_string(), duration, now),
                lease_id: Some(lease_id.to_string()),
                lease_time: None,
            })
        }
        _ => Err(StorageError::new(ErrorCode::LeaseIsBrokenAndCannotBeRenewed)),
    }
}

fn release(lease: &LeaseProperties, lease_id: &str) -> StorageResult<LeaseTransition> {
    if lease.state == LeaseState::Available || !held_id_matches(lease, lease_id) {
        return Err(mismatch());
    }
    Ok(LeaseTransition {
        lease: LeaseProperties::default(),
        lease_id: None,
        lease_time: None,
    })
}

fn change(lease: &LeaseProperties, lease_id: &str, proposed_id: &str) -> StorageResult<LeaseTransition> {
    match lease.state {
        LeaseState::Leased => {
            if !held_id_matches(lease, lease_id) && !held_id_matches(lease, proposed_id) {
                return Err(mismatch());
            }
            let mut changed = lease.clone();
            changed.id = Some(proposed_id.to_string());
            Ok(LeaseTransition {
                lease: changed,
                lease_id: Some(proposed_id.to_string()),
                lease_time: None,
            })
        }
        LeaseState::Breaking
            if held_id_matches(lease, lease_id) || held_id_matches(lease, proposed_id) =>
        {
            Err(StorageError::new(ErrorCode::LeaseIsBreakingAndCannotBeChanged))
        }
        LeaseState::Breaking => Err(mismatch()),
        _ => Err(not_present()),
    }
}

fn break_lease(
    lease: &LeaseProperties,
    break_period: Option<u32>,
    now: DateTime<Utc>,
) -> StorageResult<LeaseTransition> {
    let requested = break_period.map(|secs| Duration::seconds(secs as i64));

    let break_after = match lease.state {
        LeaseState::Available | LeaseState::Expired => return Err(not_present()),
        LeaseState::Broken => Duration::zero(),
        LeaseState::Leased => match (lease.duration, lease.expiry) {
            (Some(LeaseDuration::Fixed(_)), Some(expiry)) => {
                let remaining = expiry - now;
                requested.map_or(remaining, |r| r.min(remaining))
            }
            _ => requested.unwrap_or_else(Duration::zero),
        },
        LeaseState::Breaking => {
            let remaining = lease.break_time.map_or(Duration::zero(), |t| t - now);
            requested.map_or(remaining, |r| r.min(remaining))
        }
    };

    let mut broken = lease.clone();
    let lease_time = if break_after <= Duration::zero() {
        broken.state = LeaseState::Broken;
        broken.break_time = None;
        broken.expiry = None;
        0
    } else {
        broken.state = LeaseState::Breaking;
        broken.break_time = Some(now + break_after);
        ceil_seconds(break_after)
    };

    Ok(LeaseTransition {
        lease: broken,
        lease_id: None,
        lease_time: Some(lease_time),
    })
}

/// Whole seconds, rounded up.
fn ceil_seconds(duration: Duration) -> u32 {
    let millis = duration.num_milliseconds().max(0);
    ((millis + 999) / 1000) as u32
}

/// Which resource a lease-guarded request targets; selects the error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseScope {
    Container,
    Blob,
}

/// Checks a request's `x-ms-lease-id` against the resource's lease.
///
/// Writes pass `require_id`, so an active lease demands the held id. Reads
/// and optional-id writes may omit it, but an id they do send must match.
/// Presenting an id when no lease is active fails.
pub fn check_lease_access(
    lease: &LeaseProperties,
    provided_id: Option<&str>,
    scope: LeaseScope,
    require_id: bool,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    let lease = reconcile(lease, now);
    let (mismatch_code, not_present_code) = match scope {
        LeaseScope::Container => (
            ErrorCode::LeaseIdMismatchWithContainerOperation,
            ErrorCode::LeaseNotPresentWithContainerOperation,
        ),
        LeaseScope::Blob => (
            ErrorCode::LeaseIdMismatchWithBlobOperation,
            ErrorCode::LeaseNotPresentWithBlobOperation,
        ),
    };

    match (lease.is_active(), provided_id) {
        (true, Some(id)) if held_id_matches(&lease, id) => Ok(()),
        (true, Some(_)) => Err(StorageError::new(mismatch_code)),
        (true, None) if require_id => Err(StorageError::new(ErrorCode::LeaseIdMissing)),
        (true, None) => Ok(()),
        (false, Some(_)) => Err(StorageError::new(not_present_code)),
        (false, None) => Ok(()),
    }
}
