//! Per-thread correlation slot carrying an intercepted cleartext password.
//!
//! The host hashes a password and dispatches the matching admin event on the
//! same request thread, in sequence. The hash interceptor deposits the
//! cleartext here and the event observer drains it moments later. Keeping the
//! slot thread-local and time-bounded makes the hand-off safe without any
//! global locking and immune to replay across unrelated requests.

use std::{
    cell::RefCell,
    time::{Duration, Instant},
};

use zeroize::Zeroizing;

/// Default staleness bound for a deposited password.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5);

/// A deposited cleartext plus the instant it arrived.
struct Deposit {
    cleartext: Zeroizing<String>,
    deposited_at: Instant,
}

thread_local! {
    /// At most one live deposit per thread. The thread-local destructor wipes
    /// the slot on thread exit, unwinding included.
    static SLOT: RefCell<Option<Deposit>> = const { RefCell::new(None) };
}

/// Deposit a cleartext password into the current thread's slot.
///
/// Replaces any value already present. Empty input is a no-op, so callers do
/// not have to special-case blank credentials.
pub fn deposit(cleartext: &str) {
    if cleartext.is_empty() {
        return;
    }
    SLOT.with(|slot| {
        *slot.borrow_mut() = Some(Deposit {
            cleartext: Zeroizing::new(cleartext.to_string()),
            deposited_at: Instant::now(),
        });
    });
}

/// Atomically read and clear the current thread's slot.
///
/// Returns `None` when the slot is empty or the deposit is older than
/// `max_age`. A stale deposit is dropped as a side effect, so the slot is
/// empty after any call.
pub fn take(max_age: Duration) -> Option<Zeroizing<String>> {
    SLOT.with(|slot| {
        let deposit = slot.borrow_mut().take()?;
        if deposit.deposited_at.elapsed() > max_age {
            return None;
        }
        Some(deposit.cleartext)
    })
}

/// Drop any deposit held by the current thread.
pub fn clear() {
    SLOT.with(|slot| {
        *slot.borrow_mut() = None;
    });
}
