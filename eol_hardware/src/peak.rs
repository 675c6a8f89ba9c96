use std::future::Future;
use std::time::Duration;

use eol_traits::DeviceResult;

use crate::error::HwError;

/// Sample `read` every `interval` for `duration` and return the sample with
/// the largest magnitude (sign preserved). Failed samples are skipped; only a
/// window with no good sample is an error.
pub(crate) async fn sample_peak<F, Fut>(
    device: &'static str,
    duration: Duration,
    interval: Duration,
    mut read: F,
) -> DeviceResult<f64>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = DeviceResult<f64>> + Send,
{
    if duration.is_zero() {
        return Err(HwError::operation(device, "read_peak_force", "duration must be positive").into());
    }
    let interval = interval.max(Duration::from_millis(1));
    let max_samples = (duration.as_nanos() / interval.as_nanos()).max(1);
    let deadline = tokio::time::Instant::now() + duration;

    let mut peak: Option<f64> = None;
    let mut taken = 0u128;
    let mut failures = 0u32;
    while taken < max_samples {
        match read().await {
            Ok(v) => {
                if peak.is_none_or(|p| v.abs() > p.abs()) {
                    peak = Some(v);
                }
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(device, error = %e, "peak sample failed; continuing");
            }
        }
        taken += 1;
        if taken >= max_samples || tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    match peak {
        Some(p) => {
            tracing::debug!(device, samples = taken, failures, peak = p, "peak force");
            Ok(p)
        }
        None => Err(HwError::operation(device, "read_peak_force", "no valid samples in window").into()),
    }
}
