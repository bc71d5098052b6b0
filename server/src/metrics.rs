//! Metric descriptions for the repair desk.
//!
//! ## Counters
//! - `repair_desk.requests.created` - Requests accepted at intake
//! - `repair_desk.transitions{operation, outcome}` - Lifecycle transition attempts
//! - `repair_desk.store.conditional_updates{result}` - Conditional updates by match result
//! - `repair_desk.http.responses{method, status}` - HTTP responses served

use ::metrics::describe_counter;

/// Register descriptions for every metric the desk records.
///
/// Call once at startup, after the exporter is installed.
pub fn register_metrics() {
    describe_counter!(
        "repair_desk.requests.created",
        "Total number of repair requests accepted at intake"
    );
    describe_counter!(
        "repair_desk.transitions",
        "Lifecycle transition attempts by operation and outcome"
    );
    describe_counter!(
        "repair_desk.store.conditional_updates",
        "Conditional updates issued to the store, by whether a row matched"
    );
    describe_counter!(
        "repair_desk.http.responses",
        "HTTP responses by method and status code"
    );
}
