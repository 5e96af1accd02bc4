//! Metric names and descriptions for the storage subsystem
//!
//! Counters and gauges are recorded through the `metrics` facade; whichever
//! recorder the embedding application installs receives them.

use metrics::{describe_counter, describe_gauge, describe_histogram, histogram};
use std::time::Instant;

/// Register descriptions for every metric the storage subsystem records
pub fn init_metrics() {
    // Database
    describe_counter!("dht.db.stored", "Values inserted or replaced in the database");
    describe_counter!("dht.db.rejected", "Stores rejected by flood limits or admission policy");
    describe_counter!("dht.db.removed", "Values removed from the database");
    describe_gauge!("dht.db.keys", "Number of primary keys in the database");
    describe_gauge!("dht.db.values", "Number of values in the database");

    // Database cleaner
    describe_counter!("dht.cleaner.evicted", "Expired values removed by the database cleaner");
    describe_histogram!("dht.cleaner.pass_ms", "Duration of one database cleaner pass in milliseconds");

    // Storable publisher
    describe_counter!("dht.publisher.published", "Storables stored into the network");
    describe_counter!("dht.publisher.failed", "Storable stores that failed and halted a run");
}

/// Records the elapsed time into a histogram when stopped
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    pub fn stop(self) {
        histogram!(self.name).record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}
