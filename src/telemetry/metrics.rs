//! Metric instrument factories for sandq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider every instrument is a no-op.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("sandq")
}

/// Counter: tasks added to the queue.
/// Labels: `category` ("file" | "url").
pub fn tasks_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("sandq.tasks.enqueued")
        .with_description("Number of tasks added to the queue")
        .build()
}

/// Counter: tasks moved from pending to processing.
pub fn tasks_claimed() -> Counter<u64> {
    meter()
        .u64_counter("sandq.tasks.claimed")
        .with_description("Number of tasks claimed by workers")
        .build()
}

/// Counter: tasks that reached a terminal state.
/// Labels: `status` ("success" | "failure").
pub fn tasks_completed() -> Counter<u64> {
    meter()
        .u64_counter("sandq.tasks.completed")
        .with_description("Number of tasks completed")
        .build()
}

/// Counter: sample insert-or-lookup calls.
/// Labels: `result` ("created" | "existing").
pub fn samples_inserted() -> Counter<u64> {
    meter()
        .u64_counter("sandq.samples.inserted")
        .with_description("Sample insert attempts by outcome")
        .build()
}

/// Counter: claim attempts that lost a race or hit a busy store.
pub fn claim_retries() -> Counter<u64> {
    meter()
        .u64_counter("sandq.claim.retries")
        .with_description("Claim attempts retried after contention")
        .build()
}
