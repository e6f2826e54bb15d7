//! Small shared utilities: frequency conversions, JSON reference parsing,
//! monotonic timestamps.

use std::sync::OnceLock;
use std::time::Instant;

use crate::consts::Band;

/// Map a frequency (MHz) to its band, or `None` if outside any Wi-Fi band.
pub fn freq_to_band(freq_mhz: u32) -> Option<Band> {
    match freq_mhz {
        2401..=2495 => Some(Band::Band2G),
        5150..=5895 => Some(Band::Band5G),
        5925..=7125 => Some(Band::Band6G),
        _ => None,
    }
}

/// Map a center frequency (MHz) to its channel number.
///
/// Covers 2.4 GHz channels 1-14, the 5 GHz range, and 6 GHz (including the
/// channel 2 special case at 5935 MHz).
pub fn freq_to_channel(freq_mhz: u32) -> Option<u32> {
    match freq_mhz {
        2412..=2472 if (freq_mhz - 2412) % 5 == 0 => Some((freq_mhz - 2407) / 5),
        2484 => Some(14),
        5180..=5885 if freq_mhz % 5 == 0 => Some((freq_mhz - 5000) / 5),
        5935 => Some(2),
        5955..=7115 if (freq_mhz - 5955) % 5 == 0 => Some((freq_mhz - 5950) / 5),
        _ => None,
    }
}

/// Parse the index out of a JSON pointer back-reference such as
/// `"#/radios/0"`. Returns `None` for anything that does not end in a
/// non-negative integer.
pub fn parse_reference_index(reference: &str) -> Option<usize> {
    reference.rsplit('/').next()?.parse().ok()
}

/// Monotonic nanoseconds since an arbitrary process-local epoch.
///
/// Used for client steering back-off arithmetic; never compared against wall
/// clock time.
pub fn monotonic_ns() -> i64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as i64
}
