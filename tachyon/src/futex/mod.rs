//! Kernel wait/wake-on-address wrappers.
//!
//! A 32-bit aligned word in shared memory doubles as a wait queue: a thread
//! parks on the word's physical location, so waiters and wakers do not have
//! to be in the same process. There is no glibc wrapper for these calls, so
//! the syscalls are made manually.

use std::io;
use std::ptr;
use std::sync::atomic::AtomicU32;

/// Pass to [`wake`] to release every waiter on a word.
pub const WAKE_ALL: u32 = u32::MAX;

unsafe fn futex_call(word: *const AtomicU32, futex_op: libc::c_int, val: u32) -> libc::c_long {
    libc::syscall(
        libc::SYS_futex,
        word,
        futex_op,
        val,
        ptr::null::<libc::timespec>(),
    )
}

/// Parks the calling thread on `word` until a wake arrives, provided the word
/// still holds `expected` at wait entry.
///
/// Returns true if the thread parked and was released (possibly spuriously),
/// false if the word no longer held `expected`. Callers must re-check their
/// predicate either way. Any failure other than a value mismatch or an
/// interrupting signal is fatal.
pub fn wait(word: &AtomicU32, expected: u32) -> bool {
    let rc = unsafe { futex_call(word, libc::FUTEX_WAIT, expected) };
    if rc == 0 {
        return true;
    }

    match io::Error::last_os_error().raw_os_error() {
        Some(libc::EAGAIN) => false,
        // A signal landed while parked; treat it like a spurious wake.
        Some(libc::EINTR) => true,
        err => panic!("futex(FUTEX_WAIT) failed unexpectedly: {:?}", err),
    }
}

/// Wakes up to `count` threads parked on `word`. Returns how many were woken.
pub fn wake(word: &AtomicU32, count: u32) -> u32 {
    let count = count.min(i32::MAX as u32);
    let rc = unsafe { futex_call(word, libc::FUTEX_WAKE, count) };
    assert!(rc >= 0, "futex(FUTEX_WAKE) failed unexpectedly: {}", rc);
    rc as u32
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn wait_returns_false_on_value_mismatch() {
        let word = AtomicU32::new(7);
        assert!(!wait(&word, 8));
    }

    #[test]
    fn wake_with_no_waiters_wakes_nobody() {
        let word = AtomicU32::new(0);
        assert_eq!(wake(&word, WAKE_ALL), 0);
    }

    #[test]
    fn wake_releases_a_parked_thread() {
        let word = Arc::new(AtomicU32::new(0));
        let parked = Arc::clone(&word);
        let waiter = thread::spawn(move || {
            while parked.load(Ordering::Acquire) == 0 {
                wait(&parked, 0);
            }
        });

        // Give the waiter a chance to actually park before releasing it.
        thread::sleep(Duration::from_millis(50));
        word.store(1, Ordering::Release);
        wake(&word, 1);
        waiter.join().unwrap();
    }
}
