//! Creation, caching and teardown of the one shared engine.
use crate::engine::{Engine, EngineLoader};
use crate::error::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

type InitResult = Result<Arc<dyn Engine>, Error>;
type Pending = watch::Receiver<Option<InitResult>>;

enum State {
    Uninitialized,
    /// A load is running; every caller waits on the same receiver.
    Initializing(Pending),
    Ready(Arc<dyn Engine>),
}

struct Slot {
    state: State,
    /// Bumped by every dispose, so a load started before it is stale.
    generation: u64,
}

struct Shared {
    loader: Arc<dyn EngineLoader>,
    slot: Mutex<Slot>,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        // The slot is never left half-updated, so a poisoned lock is
        // still usable.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the engine: at most one live instance and at most one
/// initialization in flight.
#[derive(Clone)]
pub struct EngineManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for EngineManager {
    fn fmt(&self, out: &mut std::fmt::Formatter) -> std::fmt::Result {
        let slot = self.shared.slot();
        let state = match slot.state {
            State::Uninitialized => "uninitialized",
            State::Initializing(_) => "initializing",
            State::Ready(_) => "ready",
        };
        write!(out, "EngineManager({state}, gen {})", slot.generation)
    }
}

impl EngineManager {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        EngineManager {
            shared: Arc::new(Shared {
                loader,
                slot: Mutex::new(Slot {
                    state: State::Uninitialized,
                    generation: 0,
                }),
            }),
        }
    }

    /// Get the engine, loading it first if needed.
    ///
    /// Concurrent callers share a single load.  A failed load leaves the
    /// manager uninitialized, so a later call retries.
    pub async fn ensure_ready(&self) -> Result<Arc<dyn Engine>, Error> {
        let mut pending = {
            let mut slot = self.shared.slot();
            let pending = match &slot.state {
                State::Ready(engine) => return Ok(engine.clone()),
                State::Initializing(pending) => Some(pending.clone()),
                State::Uninitialized => None,
            };
            pending.unwrap_or_else(|| {
                let (tx, rx) = watch::channel(None);
                slot.state = State::Initializing(rx.clone());
                self.start(tx, slot.generation);
                rx
            })
        };
        let result = pending
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::init("Engine initialization was abandoned"))?
            .clone();
        result.unwrap_or_else(|| {
            Err(Error::init("Engine initialization gave no result"))
        })
    }

    /// Make sure the engine is loaded, ahead of the first real request.
    pub async fn warmup(&self) -> Result<(), Error> {
        self.ensure_ready().await.map(|_| ())
    }

    /// Release the engine and forget any pending initialization.
    ///
    /// Safe to call at any time, also when never initialized.
    pub fn dispose(&self) {
        let old = {
            let mut slot = self.shared.slot();
            slot.generation += 1;
            std::mem::replace(&mut slot.state, State::Uninitialized)
        };
        match old {
            State::Ready(engine) => {
                engine.release();
                info!("Engine disposed.");
            }
            State::Initializing(_) => {
                debug!("Engine disposed while initializing.");
            }
            State::Uninitialized => (),
        }
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        matches!(self.shared.slot().state, State::Ready(_))
    }

    /// Run the load as a detached task, so it completes for all waiters
    /// even if the caller that started it goes away.
    fn start(&self, tx: watch::Sender<Option<InitResult>>, generation: u64) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let time = Instant::now();
            let loader = shared.loader.clone();
            let result = match tokio::task::spawn_blocking(move || {
                loader.load()
            })
            .await
            {
                Ok(Ok(engine)) => Ok(engine),
                Ok(Err(e)) => Err(Error::init("Failed to load engine")
                    .caused_by(e)),
                Err(e) => Err(Error::init("Engine loader crashed")
                    .caused_by(e.into())),
            };
            {
                let mut slot = shared.slot();
                if slot.generation == generation {
                    slot.state = match &result {
                        Ok(engine) => {
                            info!("Engine ready in {:.1?}.", time.elapsed());
                            State::Ready(engine.clone())
                        }
                        Err(e) => {
                            error!("{e}");
                            State::Uninitialized
                        }
                    };
                } else if let Ok(engine) = &result {
                    warn!("Engine loaded after dispose, releasing it.");
                    engine.release();
                }
            }
            // Waiters may all be gone, which is fine.
            let _ = tx.send(Some(result));
        });
    }
}

#[cfg(test)]
mod test {
    use super::EngineManager;
    use crate::engine::testing::FakeLoader;
    use crate::error::ErrorKind;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let loader = Arc::new(FakeLoader::new());
        let manager = EngineManager::new(loader.clone());
        let calls = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.ensure_ready().await })
            })
            .collect::<Vec<_>>();
        for call in calls {
            assert!(call.await.unwrap().is_ok());
        }
        assert_eq!(loader.counters.loads(), 1);
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn warmup_is_idempotent() {
        let loader = Arc::new(FakeLoader::new());
        let manager = EngineManager::new(loader.clone());
        manager.warmup().await.unwrap();
        manager.warmup().await.unwrap();
        assert_eq!(loader.counters.loads(), 1);
    }

    #[tokio::test]
    async fn failed_load_can_be_retried() {
        let loader = Arc::new(FakeLoader::new().failing(1));
        let manager = EngineManager::new(loader.clone());
        let err = manager.ensure_ready().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Initialization);
        assert_eq!(err.to_string(), "Failed to load engine: assets missing");
        assert!(!manager.is_ready());

        manager.ensure_ready().await.unwrap();
        assert_eq!(loader.counters.loads(), 2);
    }

    #[tokio::test]
    async fn concurrent_waiters_share_a_failure() {
        let loader = Arc::new(FakeLoader::new().failing(1));
        let manager = EngineManager::new(loader.clone());
        let (a, b) =
            tokio::join!(manager.ensure_ready(), manager.ensure_ready());
        assert!(a.is_err() && b.is_err());
        assert_eq!(loader.counters.loads(), 1);
    }

    #[tokio::test]
    async fn dispose_then_reinitialize() {
        let loader = Arc::new(FakeLoader::new());
        let manager = EngineManager::new(loader.clone());
        manager.dispose();
        manager.warmup().await.unwrap();
        manager.dispose();
        assert!(!manager.is_ready());
        assert_eq!(loader.counters.releases(), 1);

        manager.ensure_ready().await.unwrap();
        assert_eq!(loader.counters.loads(), 2);
    }

    #[tokio::test]
    async fn load_finishing_after_dispose_is_released() {
        let loader = Arc::new(
            FakeLoader::new().with_delay(Duration::from_millis(200)),
        );
        let manager = EngineManager::new(loader.clone());
        let early = tokio::spawn({
            let manager = manager.clone();
            async move { manager.ensure_ready().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.dispose();
        // The early caller still gets its engine.
        assert!(early.await.unwrap().is_ok());
        assert!(!manager.is_ready());
        assert_eq!(loader.counters.releases(), 1);

        manager.ensure_ready().await.unwrap();
        assert_eq!(loader.counters.loads(), 2);
    }
}
