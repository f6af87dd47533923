//! Shared metrics recording for storage backends.

use crate::Result;
use std::time::Instant;

/// Records operation metrics for storage operations.
///
/// This function records two metrics for each operation:
/// 1. `storage_operations_total` - Counter for operation count by status
/// 2. `storage_operation_duration_ms` - Histogram for operation latency
///
/// # Arguments
///
/// * `backend` - Backend name (e.g., "memory", "sqlite", "postgres")
/// * `operation` - Operation name (e.g., "store", "retrieve", "entry_filter")
/// * `start` - Operation start time from `Instant::now()`
/// * `status` - Operation status ("success" or "error")
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Runs `op`, recording its outcome and latency.
pub fn timed<T>(
    backend: &'static str,
    operation: &'static str,
    op: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let start = Instant::now();
    let result = op();
    let status = if result.is_ok() { "success" } else { "error" };
    record_operation_metrics(backend, operation, start, status);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_record_operation_metrics_statuses() {
        // No recorder is installed in tests; recording must still be a no-op success.
        let start = Instant::now();
        record_operation_metrics("memory", "store", start, "success");
        record_operation_metrics("sqlite", "retrieve", start, "error");
    }

    #[test]
    fn test_timed_passes_result_through() {
        let ok = timed("memory", "count", || Ok(3));
        assert_eq!(ok.unwrap(), 3);

        let err: Result<()> = timed("memory", "count", || {
            Err(Error::InvalidInput("boom".to_string()))
        });
        assert!(err.is_err());
    }

    #[test]
    fn test_record_operation_metrics_concurrent() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let status = if i % 2 == 0 { "success" } else { "error" };
                thread::spawn(move || {
                    let start = Instant::now();
                    thread::sleep(Duration::from_millis(i));
                    record_operation_metrics("sqlite", "entry_filter", start, status);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }
    }
}
