//! Metric names and descriptions.
//!
//! Portico records through the `metrics` facade and leaves the choice of
//! recorder to the embedding application. Without a recorder installed the
//! macros are no-ops.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `portico_requests_total` | Counter | `path`, `status` |
//! | `portico_request_duration_seconds` | Histogram | - |
//! | `portico_rate_limited_total` | Counter | - |

use metrics::{describe_counter, describe_histogram, Unit};

/// Requests handled, labelled by route pattern and status.
pub const REQUESTS_TOTAL: &str = "portico_requests_total";

/// Wall time spent in the pipeline per request.
pub const REQUEST_DURATION_SECONDS: &str = "portico_request_duration_seconds";

/// Requests rejected by the rate limiter.
pub const RATE_LIMITED_TOTAL: &str = "portico_rate_limited_total";

/// Registers descriptions for the standard metrics with the installed
/// recorder.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, Unit::Count, "Total number of requests handled");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time spent handling a request"
    );
    describe_counter!(
        RATE_LIMITED_TOTAL,
        Unit::Count,
        "Requests rejected by the rate limiter"
    );
}
