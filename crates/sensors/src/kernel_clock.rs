//! Kernel event timestamps as `Instant`s
//!
//! GPIO edge events carry a CLOCK_MONOTONIC timestamp taken by the kernel
//! when the interrupt fired. `Instant` reads the same clock on Linux, so an
//! event time is placed on the `Instant` axis by its distance from a paired
//! reading of both clocks.

use std::time::{Duration, Instant};

/// Place `event_ns` on the `Instant` axis, given `now_ns` read from the same
/// clock at `now`.
pub fn instant_from_monotonic(event_ns: u64, now_ns: u64, now: Instant) -> Instant {
    if event_ns <= now_ns {
        now.checked_sub(Duration::from_nanos(now_ns - event_ns))
            .unwrap_or(now)
    } else {
        now + Duration::from_nanos(event_ns - now_ns)
    }
}

/// Current CLOCK_MONOTONIC reading in nanoseconds
#[cfg(feature = "real-gpio")]
pub fn monotonic_now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid out pointer; CLOCK_MONOTONIC always exists on Linux
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

/// Instant at which the kernel stamped an edge event
#[cfg(feature = "real-gpio")]
pub fn kernel_instant(event_ns: u64) -> Instant {
    let now = Instant::now();
    instant_from_monotonic(event_ns, monotonic_now_ns(), now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_past_event_lands_before_now() {
        let now = Instant::now();
        let at = instant_from_monotonic(9_250_000, 10_000_000, now);
        assert_eq!(now - at, Duration::from_micros(750));
    }

    #[test]
    fn test_event_order_is_kept() {
        let now = Instant::now();
        let gate = instant_from_monotonic(1_000_000_000, 3_000_000_000, now);
        let lane = instant_from_monotonic(2_234_567_890, 3_000_000_000, now);
        assert_eq!(lane - gate, Duration::from_nanos(1_234_567_890));
    }

    #[test]
    fn test_event_after_reading_lands_after_now() {
        let now = Instant::now();
        let at = instant_from_monotonic(10_000_500, 10_000_000, now);
        assert_eq!(at - now, Duration::from_nanos(500));
    }

    #[cfg(feature = "real-gpio")]
    #[test]
    fn test_kernel_instant_tracks_instant_now() {
        let before = Instant::now();
        let at = kernel_instant(monotonic_now_ns());
        let after = Instant::now();
        let slack = Duration::from_millis(5);
        assert!(at + slack >= before);
        assert!(at <= after + slack);
    }
}
