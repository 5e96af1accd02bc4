/*
    DatabaseCleaner - periodic removal of expired values

    Responsibilities:
    `database_cleaner.rs` sweeps the database on a fixed delay. Each pass
    holds the database write lock for the whole scan and removes every
    entity its evictor reports as expired.

    Inputs:
    - timer events from the scheduler
    - the evictor registry and routing table

    Outputs:
    - removed entities
    - eviction metrics and logs

    A pass never fails the schedule: errors are logged and the next pass
    re-evaluates everything.
*/

use metrics::counter;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::metrics::Timer;

use super::dht_storage::Database;
use super::errors::DhtResult;
use super::evictor::EvictorRegistry;
use super::routing_table::RoutingTable;
use super::scheduler::{ScheduledTask, Scheduler};

#[derive(Clone)]
struct Sweep {
    database: Database,
    evictors: Arc<EvictorRegistry>,
    routing_table: Arc<dyn RoutingTable>,
}

impl Sweep {
    fn run(&self) -> DhtResult<usize> {
        let timer = Timer::new("dht.cleaner.pass_ms");
        let routing_table = self.routing_table.as_ref();
        let removed =
            self.database.retain(|entity| !self.evictors.is_expired(routing_table, entity))?;

        for entity in &removed {
            debug!(entity = %entity, "Evicted expired value");
        }
        counter!("dht.cleaner.evicted").increment(removed.len() as u64);
        timer.stop();
        Ok(removed.len())
    }

    fn tick(&self) {
        match self.run() {
            Ok(0) => {}
            Ok(count) => info!(count, "Database cleaner removed expired values"),
            Err(e) => warn!(error = %e, "Database cleaner pass failed"),
        }
    }
}

pub struct DatabaseCleaner {
    sweep: Sweep,
    scheduler: Scheduler,
    initial_delay: Duration,
    period: Duration,
    task: Mutex<Option<ScheduledTask>>,
}

impl DatabaseCleaner {
    pub fn new(
        database: Database,
        evictors: Arc<EvictorRegistry>,
        routing_table: Arc<dyn RoutingTable>,
        scheduler: Scheduler,
        initial_delay: Duration,
        period: Duration,
    ) -> Self {
        DatabaseCleaner {
            sweep: Sweep { database, evictors, routing_table },
            scheduler,
            initial_delay,
            period,
            task: Mutex::new(None),
        }
    }

    /// Schedule the sweep. Does nothing if already started.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }

        debug!(period = ?self.period, "Starting database cleaner");
        let sweep = self.sweep.clone();
        *task = Some(self.scheduler.schedule_with_fixed_delay(
            "database-cleaner",
            self.initial_delay,
            self.period,
            move || {
                sweep.tick();
                async {}
            },
        ));
    }

    /// Cancel the sweep. Does nothing if not started.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = task.take() {
            debug!("Stopping database cleaner");
            task.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Run one pass now, returning the number of removed values
    pub fn tick(&self) -> DhtResult<usize> {
        self.sweep.run()
    }
}

impl Drop for DatabaseCleaner {
    fn drop(&mut self) {
        self.stop();
    }
}
