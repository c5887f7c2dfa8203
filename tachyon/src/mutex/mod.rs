//! A low-level mutex that lives in shared memory.
//!
//! The whole lock is one 32-bit word: 0 means free, 1 means held with nobody
//! waiting, and 2 means held with waiters probably parked in the kernel. An
//! uncontended acquire or release is a single compare-and-swap and never
//! leaves userspace.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::futex;

const FREE: u32 = 0;
const HELD: u32 = 1;
const CONTENDED: u32 = 2;

/// Must be placed in shared memory by whatever uses it, and initialized
/// exactly once per segment lifetime with [`Mutex::init`].
#[repr(C)]
pub struct Mutex {
    state: AtomicU32,
}

impl Mutex {
    pub fn init(&self) {
        self.state.store(FREE, Ordering::Release);
    }

    /// Acquires the lock, parking in the kernel under contention.
    pub fn lock(&self) -> MutexGuard<'_> {
        if self
            .state
            .compare_exchange(FREE, HELD, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            loop {
                // Assume the lock is still taken and advertise contention, so
                // whoever releases knows to wake us.
                if self.state.load(Ordering::Relaxed) == CONTENDED
                    || self
                        .state
                        .compare_exchange(HELD, CONTENDED, Ordering::Acquire, Ordering::Relaxed)
                        .is_ok()
                {
                    futex::wait(&self.state, CONTENDED);
                }
                // A contended acquire always publishes state 2, since more
                // waiters may still be parked.
                if self
                    .state
                    .compare_exchange(FREE, CONTENDED, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    break;
                }
            }
        }

        MutexGuard { mutex: self }
    }

    fn unlock(&self) {
        if self
            .state
            .compare_exchange(HELD, FREE, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }

        // The state only goes up while the lock is held, so it must be 2 now.
        let released = self
            .state
            .compare_exchange(CONTENDED, FREE, Ordering::Release, Ordering::Relaxed)
            .is_ok();
        assert!(released, "released a mutex that was not held (double release?)");

        futex::wake(&self.state, 1);
    }

    #[cfg(test)]
    pub(crate) fn raw_state(&self) -> u32 {
        self.state.load(Ordering::SeqCst)
    }
}

/// Releases the lock on drop.
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn new_mutex() -> Mutex {
        let mutex = Mutex {
            state: AtomicU32::new(u32::MAX),
        };
        mutex.init();
        mutex
    }

    #[test]
    fn lock_and_unlock_walk_the_state_word() {
        let mutex = new_mutex();
        assert_eq!(FREE, mutex.raw_state());

        let guard = mutex.lock();
        assert_eq!(HELD, mutex.raw_state());
        drop(guard);
        assert_eq!(FREE, mutex.raw_state());
    }

    #[test]
    fn contended_increments_stay_consistent() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 1000;

        struct Shared {
            mutex: Mutex,
            counter: std::cell::UnsafeCell<usize>,
        }
        unsafe impl Sync for Shared {}

        let shared = Arc::new(Shared {
            mutex: new_mutex(),
            counter: std::cell::UnsafeCell::new(0),
        });

        let mut workers = Vec::new();
        for _ in 0..THREADS {
            let shared = Arc::clone(&shared);
            workers.push(thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let _guard = shared.mutex.lock();
                    unsafe { *shared.counter.get() += 1 };
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(THREADS * ROUNDS, unsafe { *shared.counter.get() });
        assert_eq!(FREE, shared.mutex.raw_state());
    }
}
