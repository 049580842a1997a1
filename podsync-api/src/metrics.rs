use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

pub const PODSYNC_RPC_THROTTLED_TOTAL: &str = "podsync_rpc_throttled_total";
pub const PODSYNC_CIRCUIT_REJECTIONS_TOTAL: &str = "podsync_circuit_rejections_total";
pub const PODSYNC_CIRCUIT_STATE: &str = "podsync_circuit_state";
pub const PODSYNC_PARTIAL_FAILURES_TOTAL: &str = "podsync_partial_failures_total";
pub const PODSYNC_BACKEND_CALLS_TOTAL: &str = "podsync_backend_calls_total";
pub const PODSYNC_BACKEND_CALL_DURATION_SECONDS: &str = "podsync_backend_call_duration_seconds";
pub const DEPENDENCY: &str = "dependency";
pub const COMMAND: &str = "command";
pub const BACKEND: &str = "backend";
pub const OPERATION: &str = "operation";
pub const OUTCOME: &str = "outcome";
pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_ERROR: &str = "error";
pub const CLUSTER_BACKEND: &str = "cluster";
pub const STORE_BACKEND: &str = "store";

/// Register metrics emitted by the api. It is safe to call this method multiple times. It is
/// guaranteed to register the metrics only once.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            PODSYNC_RPC_THROTTLED_TOTAL,
            Unit::Count,
            "Total number of inbound calls rejected by the rate limiter"
        );

        describe_counter!(
            PODSYNC_CIRCUIT_REJECTIONS_TOTAL,
            Unit::Count,
            "Total number of outbound calls rejected because the circuit was open"
        );

        describe_gauge!(
            PODSYNC_CIRCUIT_STATE,
            Unit::Count,
            "Circuit state per dependency: 0 closed, 1 half-open, 2 open"
        );

        describe_counter!(
            PODSYNC_PARTIAL_FAILURES_TOTAL,
            Unit::Count,
            "Total number of commands that left the cluster and the metadata store diverged"
        );

        describe_counter!(
            PODSYNC_BACKEND_CALLS_TOTAL,
            Unit::Count,
            "Total number of calls made to the cluster and the metadata store"
        );

        describe_histogram!(
            PODSYNC_BACKEND_CALL_DURATION_SECONDS,
            Unit::Seconds,
            "Time taken in seconds by a call to the cluster or the metadata store"
        );
    });
}
