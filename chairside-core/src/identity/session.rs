// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Local Session Lock
//!
//! PIN-gated session lock with bounded retries and a timed lockout.
//! The PIN hash is kept in the secret vault; lock state is in-memory only.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::vault::{DeviceSecretStore, SecretContext};
use crate::crypto::pin::{hash_pin, verify_pin, PinError};
use crate::storage::StorageError;

/// Session lock error types.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("PIN must be at least {0} characters")]
    PinTooShort(usize),

    #[error("No PIN has been set")]
    NoPinSet,

    #[error("Invalid PIN ({attempts_remaining} attempts remaining)")]
    InvalidPin { attempts_remaining: u32 },

    #[error("Locked out for {remaining_secs} more seconds")]
    LockedOut { remaining_secs: u64 },

    #[error("PIN hashing error: {0}")]
    Pin(#[from] PinError),

    #[error("Vault error: {0}")]
    Vault(#[from] StorageError),
}

/// Why the session is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    Manual,
    Inactivity,
    TooManyAttempts,
}

/// Retry and lockout policy.
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
    pub min_pin_len: usize,
}

impl Default for LockPolicy {
    fn default() -> Self {
        LockPolicy {
            max_attempts: 5,
            lockout: Duration::from_secs(15 * 60),
            min_pin_len: 4,
        }
    }
}

#[derive(Debug)]
struct LockState {
    is_locked: bool,
    failed_attempts: u32,
    locked_at: Option<Instant>,
    lock_reason: Option<LockReason>,
}

impl LockState {
    fn unlocked() -> Self {
        LockState {
            is_locked: false,
            failed_attempts: 0,
            locked_at: None,
            lock_reason: None,
        }
    }
}

/// PIN-gated session lock.
pub struct SessionLock {
    vault: Arc<DeviceSecretStore>,
    context: SecretContext,
    policy: LockPolicy,
    state: Mutex<LockState>,
}

impl SessionLock {
    pub fn new(vault: Arc<DeviceSecretStore>, context: SecretContext) -> Self {
        Self::with_policy(vault, context, LockPolicy::default())
    }

    pub fn with_policy(
        vault: Arc<DeviceSecretStore>,
        context: SecretContext,
        policy: LockPolicy,
    ) -> Self {
        SessionLock {
            vault,
            context,
            policy,
            state: Mutex::new(LockState::unlocked()),
        }
    }

    /// Returns true if a PIN has been configured.
    pub fn has_pin(&self) -> Result<bool, LockError> {
        Ok(self.vault.load_local_pin(&self.context)?.is_some())
    }

    /// Sets (or replaces) the PIN. Requires length >= the policy minimum.
    pub fn set_pin(&self, pin: &str) -> Result<(), LockError> {
        if pin.len() < self.policy.min_pin_len {
            return Err(LockError::PinTooShort(self.policy.min_pin_len));
        }
        let hash = hash_pin(pin)?;
        self.vault.save_local_pin(&self.context, &hash)?;
        Ok(())
    }

    /// Removes the PIN and resets the lock state.
    pub fn clear_pin(&self) -> Result<(), LockError> {
        self.vault.clear_local_pin(&self.context)?;
        *self.state.lock().expect("lock state poisoned") = LockState::unlocked();
        Ok(())
    }

    /// Forces the locked state.
    pub fn lock(&self, reason: LockReason) {
        let mut state = self.state.lock().expect("lock state poisoned");
        state.is_locked = true;
        state.locked_at = Some(Instant::now());
        state.lock_reason = Some(reason);
    }

    /// Attempts to unlock with a PIN.
    ///
    /// During an active too-many-attempts lockout the attempt is rejected
    /// with the remaining time, without consuming a verification. The 5th
    /// consecutive failure transitions into the lockout.
    pub fn unlock(&self, pin: &str) -> Result<(), LockError> {
        let mut state = self.state.lock().expect("lock state poisoned");

        if state.lock_reason == Some(LockReason::TooManyAttempts) {
            if let Some(locked_at) = state.locked_at {
                let elapsed = locked_at.elapsed();
                if elapsed < self.policy.lockout {
                    let remaining = self.policy.lockout - elapsed;
                    return Err(LockError::LockedOut {
                        remaining_secs: remaining.as_secs().max(1),
                    });
                }
                // Lockout has expired; the attempt budget is fresh.
                *state = LockState::unlocked();
            }
        }

        let hash = self
            .vault
            .load_local_pin(&self.context)?
            .ok_or(LockError::NoPinSet)?;

        if verify_pin(pin, &hash)? {
            *state = LockState::unlocked();
            return Ok(());
        }

        state.failed_attempts += 1;
        if state.failed_attempts >= self.policy.max_attempts {
            state.is_locked = true;
            state.locked_at = Some(Instant::now());
            state.lock_reason = Some(LockReason::TooManyAttempts);
            return Err(LockError::LockedOut {
                remaining_secs: self.policy.lockout.as_secs(),
            });
        }

        Err(LockError::InvalidPin {
            attempts_remaining: self.policy.max_attempts - state.failed_attempts,
        })
    }

    /// Returns whether the session is locked.
    ///
    /// An expired too-many-attempts lockout auto-unlocks and resets the
    /// attempt counter.
    pub fn is_locked(&self) -> bool {
        let mut state = self.state.lock().expect("lock state poisoned");

        if state.lock_reason == Some(LockReason::TooManyAttempts) {
            if let Some(locked_at) = state.locked_at {
                if locked_at.elapsed() >= self.policy.lockout {
                    *state = LockState::unlocked();
                    return false;
                }
            }
        }

        state.is_locked
    }

    /// Current consecutive failed attempts.
    pub fn failed_attempts(&self) -> u32 {
        self.state.lock().expect("lock state poisoned").failed_attempts
    }

    /// Why the session is locked, if it is.
    pub fn lock_reason(&self) -> Option<LockReason> {
        self.state.lock().expect("lock state poisoned").lock_reason
    }
}
