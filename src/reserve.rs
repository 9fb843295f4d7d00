use std::sync::{Arc, Condvar, Mutex};

/// Counting gate decoupling "how many jobs compute" from "how many may touch
/// a scarce resource" (disk, GPU-adjacent prep). Workers block briefly on
/// `acquire`; the returned guard releases the slot on every exit path,
/// including unwinds.
#[derive(Clone)]
pub struct ReservationPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    capacity: usize,
    available: Mutex<usize>,
    released: Condvar,
}

impl ReservationPool {
    /// A capacity of zero disables the gate entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                available: Mutex::new(capacity),
                released: Condvar::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn acquire(&self) -> Reservation {
        if self.inner.capacity == 0 {
            return Reservation { inner: None };
        }
        let mut available = self.inner.available.lock().unwrap();
        while *available == 0 {
            available = self.inner.released.wait(available).unwrap();
        }
        *available -= 1;
        Reservation {
            inner: Some(self.inner.clone()),
        }
    }

    pub fn available(&self) -> usize {
        if self.inner.capacity == 0 {
            return usize::MAX;
        }
        *self.inner.available.lock().unwrap()
    }
}

/// RAII slot in a [`ReservationPool`].
pub struct Reservation {
    inner: Option<Arc<PoolInner>>,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let mut available = inner.available.lock().unwrap();
            *available += 1;
            inner.released.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_and_drop_restore_capacity() {
        let pool = ReservationPool::new(2);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.available(), 0);
        drop(a);
        assert_eq!(pool.available(), 1);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn zero_capacity_never_blocks() {
        let pool = ReservationPool::new(0);
        let _a = pool.acquire();
        let _b = pool.acquire();
        let _c = pool.acquire();
    }

    #[test]
    fn blocked_acquire_wakes_on_release() {
        let pool = ReservationPool::new(1);
        let held = pool.acquire();

        let pool2 = pool.clone();
        let waiter = thread::spawn(move || {
            let _slot = pool2.acquire();
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        drop(held);
        waiter.join().unwrap();
    }

    #[test]
    fn slot_released_even_when_holder_panics() {
        let pool = ReservationPool::new(1);
        let pool2 = pool.clone();
        let result = thread::spawn(move || {
            let _slot = pool2.acquire();
            panic!("holder died");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(pool.available(), 1);
    }
}
