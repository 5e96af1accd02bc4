/*
    Replication - periodic republishing of the values this node owns

    Responsibilities:
    `replication.rs` implements the storable publisher. On every scheduled
    tick it takes a snapshot of all storables offered by the registered
    models and stores them into the network one at a time.

    It handles:
    - skipping ticks while the node is not (or is re-) bootstrapping
    - strictly sequential stores, at most one in flight
    - stamping publish time and replica count after each success
    - notifying the owning model off the publish path
    - halting the run on the first failure

    Inputs:
    - timer events from the scheduler
    - store completions from the network facade

    Outputs:
    - store requests to the network facade
    - updated storables and model notifications

    Run state lives behind one mutex shared by the tick and the completion
    path. Every run gets a generation number; completions from a halted run
    are ignored. Failed or halted runs are not retried early: the next tick
    takes a fresh snapshot.
*/

use metrics::counter;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::errors::DhtResult;
use super::network::NetworkFacade;
use super::scheduler::{ScheduledTask, Scheduler};
use super::storable::{Storable, StoreResult};
use super::storable_model::StorableModelRegistry;
use super::value_entity::ValueEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    /// No run in progress
    Idle,
    /// Working through a snapshot, at most one store outstanding
    Running,
}

#[derive(Default)]
struct Run {
    generation: u64,
    pending: Option<std::vec::IntoIter<Arc<Storable>>>,
    in_flight: Option<JoinHandle<()>>,
}

impl Run {
    fn state(&self) -> PublisherState {
        if self.pending.is_some() {
            PublisherState::Running
        } else {
            PublisherState::Idle
        }
    }

    /// Drop the current run and cancel its outstanding store
    fn halt(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.pending = None;
        if let Some(store) = self.in_flight.take() {
            store.abort();
        }
    }
}

struct PublishEngine {
    network: Arc<dyn NetworkFacade>,
    models: Arc<StorableModelRegistry>,
    scheduler: Scheduler,
    run: Mutex<Run>,
}

impl PublishEngine {
    fn lock(&self) -> MutexGuard<'_, Run> {
        self.run.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tick(self: &Arc<Self>) {
        let mut run = self.lock();

        if !self.network.is_bootstrapped() || self.network.is_bootstrapping() {
            if run.state() == PublisherState::Running {
                debug!("Node is not bootstrapped, halting publish run");
            }
            run.halt();
            return;
        }

        if run.state() == PublisherState::Running {
            trace!("Publish run still in progress");
            return;
        }

        let storables = self.models.snapshot_storables();
        if storables.is_empty() {
            trace!("Nothing to publish");
            return;
        }

        debug!(count = storables.len(), "Starting publish run");
        run.generation = run.generation.wrapping_add(1);
        run.pending = Some(storables.into_iter());
        self.advance(&mut run);
    }

    fn advance(self: &Arc<Self>, run: &mut Run) {
        let next = run.pending.as_mut().and_then(Iterator::next);
        let Some(storable) = next else {
            if run.pending.take().is_some() {
                debug!("Publish run complete");
            }
            run.in_flight = None;
            return;
        };

        trace!(key = %storable.primary_key(), "Publishing storable");
        let entity = ValueEntity::from_storable(self.network.local_contact(), &storable);
        let generation = run.generation;
        let engine = Arc::clone(self);
        run.in_flight = Some(self.scheduler.spawn(async move {
            let result = engine.network.store(entity).await;
            engine.complete(generation, storable, result);
        }));
    }

    fn complete(
        self: &Arc<Self>,
        generation: u64,
        storable: Arc<Storable>,
        result: DhtResult<StoreResult>,
    ) {
        let mut run = self.lock();
        if run.generation != generation || run.pending.is_none() {
            trace!(key = %storable.primary_key(), "Ignoring store completion of a halted run");
            return;
        }
        run.in_flight = None;

        match result {
            Ok(result) => {
                storable.mark_published(SystemTime::now(), result.location_count());
                counter!("dht.publisher.published").increment(1);
                debug!(
                    key = %storable.primary_key(),
                    locations = result.location_count(),
                    "Published storable"
                );

                let models = Arc::clone(&self.models);
                self.scheduler.spawn(async move {
                    models.notify_store_result(&storable, &result);
                });

                self.advance(&mut run);
            }
            Err(e) => {
                counter!("dht.publisher.failed").increment(1);
                debug!(key = %storable.primary_key(), error = %e, "Publish failed, halting run");
                run.pending = None;
            }
        }
    }
}

pub struct StorablePublisher {
    engine: Arc<PublishEngine>,
    initial_delay: Duration,
    period: Duration,
    task: Mutex<Option<ScheduledTask>>,
}

impl StorablePublisher {
    pub fn new(
        network: Arc<dyn NetworkFacade>,
        models: Arc<StorableModelRegistry>,
        scheduler: Scheduler,
        initial_delay: Duration,
        period: Duration,
    ) -> Self {
        StorablePublisher {
            engine: Arc::new(PublishEngine {
                network,
                models,
                scheduler,
                run: Mutex::new(Run::default()),
            }),
            initial_delay,
            period,
            task: Mutex::new(None),
        }
    }

    /// Schedule the publisher. Does nothing if already started.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }
        debug_assert_eq!(self.state(), PublisherState::Idle);

        debug!(period = ?self.period, "Starting storable publisher");
        let engine = Arc::clone(&self.engine);
        *task = Some(self.engine.scheduler.schedule_with_fixed_delay(
            "storable-publisher",
            self.initial_delay,
            self.period,
            move || {
                engine.tick();
                async {}
            },
        ));
    }

    /// Cancel the schedule and any outstanding store
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = task.take() {
            debug!("Stopping storable publisher");
            task.cancel();
        }
        self.engine.lock().halt();
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn state(&self) -> PublisherState {
        self.engine.lock().state()
    }

    /// Run one scheduled step now
    pub fn tick(&self) {
        self.engine.tick();
    }
}

impl Drop for StorablePublisher {
    fn drop(&mut self) {
        self.stop();
    }
}
