//! Render target pool error types.

use thiserror::Error;

use crate::backend::BackendError;
use crate::targets::{SharedMemoryBank, Slot};

/// Errors that can occur while allocating, binding or resolving render targets.
///
/// Public pass entry points never return these. They are routed through
/// [`report`], which logs them and fires a debug assertion for protocol
/// violations, so release builds degrade to "render with the effect missing".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// An operation needed the principal size before `allocate` ever ran.
    #[error("render target pool is not configured: principal size is 0x0")]
    NotConfigured,
    /// The slot is disabled for the current platform or feature set.
    #[error("render target {0} is not available on this platform")]
    UnsupportedSlot(Slot),
    /// A pass began on a slot that is already bound.
    #[error("render target {slot} is already bound, cannot begin {pass}")]
    ReentrantBind { slot: Slot, pass: &'static str },
    /// A pass finished on a slot that is not bound.
    #[error("render target {slot} is not bound, cannot finish {pass}")]
    NotBound { slot: Slot, pass: &'static str },
    /// Two members of the same shared-memory bank were live at once.
    #[error("{incoming} was bound while {live} was live in shared bank {bank:?}")]
    AliasingViolation {
        bank: SharedMemoryBank,
        live: Slot,
        incoming: Slot,
    },
    /// A configuration value was rejected.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The backend failed to create a resource.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type PoolResult<T> = Result<T, PoolError>;

impl PoolError {
    /// Programmer errors that must stop a debug build.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            PoolError::NotConfigured
                | PoolError::ReentrantBind { .. }
                | PoolError::NotBound { .. }
                | PoolError::AliasingViolation { .. }
                | PoolError::InvalidParameter(_)
        )
    }
}

/// Log an error at the severity its kind deserves.
///
/// Protocol violations additionally trip a `debug_assert!`.
pub(crate) fn report(err: PoolError) {
    match &err {
        PoolError::UnsupportedSlot(_) => log::trace!("{err}"),
        PoolError::Backend(_) => log::warn!("{err}"),
        _ => {
            log::error!("{err}");
            debug_assert!(!err.is_protocol_violation(), "{err}");
        }
    }
}
