//! Per-room single-writer discipline.
//!
//! The fetch → mutate → persist sequence of one room must never interleave
//! with another update to the same room, otherwise two writers read the same
//! base document and one silently overwrites the other. Each room gets its
//! own async mutex; rooms never wait on each other.
//!
//! ```text
//! locks: room-a ─► Arc<Mutex<()>>   (held by 1 body, 2 waiters)
//!        room-b ─► Arc<Mutex<()>>   (held by 1 body)
//! ```
//!
//! An entry lives exactly as long as somebody holds or waits on its lock.
//! New clones of the `Arc` are only taken while the map is locked, so if
//! the map and the departing caller hold the only two references, nobody
//! else can reach the entry and it is safe to drop. The check runs from a
//! guard's `Drop`, so a caller that is cancelled or panics releases its
//! entry too.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, MutexGuard, PoisonError};

use tokio::sync::Mutex;

use crate::registry::RoomId;

type LockMap = HashMap<RoomId, Arc<Mutex<()>>>;

#[derive(Default)]
pub struct UpdateSerializer {
    // Only ever held briefly and never across an await.
    locks: std::sync::Mutex<LockMap>,
}

impl UpdateSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `body` while holding the room's lock.
    ///
    /// Waiters are admitted in arrival order (tokio's mutex is fair).
    pub async fn with_room<F, Fut, T>(&self, room: &str, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let entry = self.acquire(room);
        let _guard = entry.lock.lock().await;
        body().await
    }

    fn acquire<'a>(&'a self, room: &'a str) -> RoomEntry<'a> {
        let lock = self.map().entry(room.to_string()).or_default().clone();
        RoomEntry {
            serializer: self,
            room,
            lock,
        }
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        // The map holds no invariant a panicking holder could break.
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of rooms with a body running or waiting.
    pub fn active_rooms(&self) -> usize {
        self.map().len()
    }
}

/// A caller's reference to a room lock; dropping it releases the map entry
/// once no other caller holds or waits on it.
struct RoomEntry<'a> {
    serializer: &'a UpdateSerializer,
    room: &'a str,
    lock: Arc<Mutex<()>>,
}

impl Drop for RoomEntry<'_> {
    fn drop(&mut self) {
        let mut locks = self.serializer.map();
        // Two references left: the map's and ours.
        if locks
            .get(self.room)
            .is_some_and(|lock| Arc::strong_count(lock) == 2)
        {
            locks.remove(self.room);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;
    use tokio::time::{timeout, Duration};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mutual_exclusion_within_room() {
        let serializer = Arc::new(UpdateSerializer::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let serializer = serializer.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            tasks.push(tokio::spawn(async move {
                serializer
                    .with_room("doc", || async {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_lost_update_on_read_modify_write() {
        let serializer = Arc::new(UpdateSerializer::new());
        let shared = Arc::new(std::sync::Mutex::new(0u64));

        let mut tasks = Vec::new();
        for _ in 0..100 {
            let serializer = serializer.clone();
            let shared = shared.clone();
            tasks.push(tokio::spawn(async move {
                serializer
                    .with_room("counter", || async {
                        let read = *shared.lock().unwrap();
                        // Suspend between read and write, as a real fetch/persist would.
                        tokio::task::yield_now().await;
                        *shared.lock().unwrap() = read + 1;
                    })
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(*shared.lock().unwrap(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rooms_run_in_parallel() {
        let serializer = Arc::new(UpdateSerializer::new());
        // Both bodies must be inside at once to pass the barrier.
        let barrier = Arc::new(Barrier::new(2));

        let a = {
            let serializer = serializer.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                serializer.with_room("a", || async { barrier.wait().await; }).await
            })
        };
        let b = {
            let serializer = serializer.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                serializer.with_room("b", || async { barrier.wait().await; }).await
            })
        };

        let joined = timeout(Duration::from_secs(2), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await;
        assert!(joined.is_ok(), "different rooms must not block each other");
    }

    #[tokio::test]
    async fn test_returns_body_result() {
        let serializer = UpdateSerializer::new();
        let value = serializer.with_room("doc", || async { 41 + 1 }).await;
        assert_eq!(value, 42);

        let err: Result<(), &str> = serializer.with_room("doc", || async { Err("nope") }).await;
        assert_eq!(err, Err("nope"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_entries_are_released() {
        let serializer = Arc::new(UpdateSerializer::new());

        let mut tasks = Vec::new();
        for i in 0..64 {
            let serializer = serializer.clone();
            tasks.push(tokio::spawn(async move {
                let room = format!("room-{}", i % 5);
                serializer
                    .with_room(&room, || async { tokio::task::yield_now().await })
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(serializer.active_rooms(), 0);
    }

    #[tokio::test]
    async fn test_entry_visible_while_running() {
        let serializer = Arc::new(UpdateSerializer::new());
        let observed = serializer
            .with_room("doc", || {
                let serializer = serializer.clone();
                async move { serializer.active_rooms() }
            })
            .await;
        assert_eq!(observed, 1);
        assert_eq!(serializer.active_rooms(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_body_releases_entry() {
        let serializer = UpdateSerializer::new();
        let result = timeout(
            Duration::from_millis(20),
            serializer.with_room("doc", || std::future::pending::<()>()),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(serializer.active_rooms(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_waiter_releases_entry() {
        let serializer = Arc::new(UpdateSerializer::new());
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let serializer = serializer.clone();
            tokio::spawn(async move {
                serializer
                    .with_room("doc", move || async move {
                        let _ = entered_tx.send(());
                        let _ = release_rx.await;
                    })
                    .await
            })
        };
        entered_rx.await.unwrap();

        // Gives up while queued behind the holder.
        let waited = timeout(
            Duration::from_millis(20),
            serializer.with_room("doc", || async {}),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(serializer.active_rooms(), 1);

        release_tx.send(()).unwrap();
        holder.await.unwrap();
        assert_eq!(serializer.active_rooms(), 0);
    }

    #[tokio::test]
    async fn test_panicking_body_releases_entry() {
        let serializer = Arc::new(UpdateSerializer::new());
        let task = {
            let serializer = serializer.clone();
            tokio::spawn(async move {
                serializer
                    .with_room("doc", || async { panic!("body failed") })
                    .await
            })
        };
        assert!(task.await.unwrap_err().is_panic());
        assert_eq!(serializer.active_rooms(), 0);

        // The room stays usable.
        assert_eq!(serializer.with_room("doc", || async { 7 }).await, 7);
    }
}
