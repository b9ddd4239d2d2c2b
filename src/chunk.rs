//! Chunk geometry math
//!
//! Pure functions mapping `(file_size, chunk_size, index)` to offsets,
//! lengths, counts, progress ratios and ETA. Descriptors are derived on
//! demand and never persisted; for a fixed `(file_size, chunk_size)` the
//! geometry is fully determined.

use serde::Serialize;

/// Metadata for one chunk of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkDescriptor {
    /// Chunk index
    pub index: u64,
    /// Byte offset in the file
    pub offset: u64,
    /// Chunk length in bytes (shorter for the final chunk)
    pub len: u64,
    /// Whether this is the final chunk
    pub is_last: bool,
}

impl ChunkDescriptor {
    /// Compute the descriptor for `index`, or `None` when the index is
    /// outside `[0, total_chunks)`.
    #[must_use]
    pub fn compute(file_size: u64, chunk_size: u64, index: u64) -> Option<Self> {
        if index >= total_chunks(file_size, chunk_size) {
            return None;
        }
        let offset = index * chunk_size;
        Some(Self {
            index,
            offset,
            len: chunk_len(file_size, index, chunk_size),
            is_last: offset + chunk_size >= file_size,
        })
    }
}

/// Total number of chunks for a file
///
/// Ceiling division; 0 when `chunk_size` is 0.
#[must_use]
pub fn total_chunks(file_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    file_size.div_ceil(chunk_size)
}

/// Byte offset of chunk `index`
#[must_use]
pub fn chunk_offset(index: u64, chunk_size: u64) -> u64 {
    index * chunk_size
}

/// Actual length of chunk `index`
///
/// `min(chunk_size, file_size - offset)`, clamped at 0 for indices past
/// the end of the file.
#[must_use]
pub fn chunk_len(file_size: u64, index: u64, chunk_size: u64) -> u64 {
    let offset = chunk_offset(index, chunk_size);
    let remaining = file_size.saturating_sub(offset);
    remaining.min(chunk_size)
}

/// Transfer progress as a ratio clamped to [0, 1]
#[must_use]
pub fn progress(transferred: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (transferred as f64 / total as f64).clamp(0.0, 1.0)
}

/// Estimated seconds remaining at the current speed
///
/// Infinite when `speed_bps` is zero or negative.
#[must_use]
pub fn eta_seconds(remaining_bytes: u64, speed_bps: f64) -> f64 {
    if speed_bps <= 0.0 {
        return f64::INFINITY;
    }
    remaining_bytes as f64 / speed_bps
}

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Format a byte count with base-1024 units and two decimals
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Format a speed in bytes/sec with base-1024 units and two decimals
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    let mut value = bytes_per_sec.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}/s", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_total_chunks() {
        assert_eq!(total_chunks(0, 1024), 0);
        assert_eq!(total_chunks(1, 1024), 1);
        assert_eq!(total_chunks(1024, 1024), 1);
        assert_eq!(total_chunks(1025, 1024), 2);
        assert_eq!(total_chunks(1024, 0), 0);
    }

    #[test]
    fn test_chunk_len_final_chunk_is_short() {
        // 2.5 chunks worth of data
        assert_eq!(chunk_len(2560, 0, 1024), 1024);
        assert_eq!(chunk_len(2560, 1, 1024), 1024);
        assert_eq!(chunk_len(2560, 2, 1024), 512);
        // Past the end
        assert_eq!(chunk_len(2560, 3, 1024), 0);
    }

    #[test]
    fn test_descriptor_out_of_range() {
        assert!(ChunkDescriptor::compute(2560, 1024, 3).is_none());
        assert!(ChunkDescriptor::compute(0, 1024, 0).is_none());
    }

    #[test]
    fn test_descriptor_last_flag() {
        let d = ChunkDescriptor::compute(2560, 1024, 2).unwrap();
        assert_eq!(d.offset, 2048);
        assert_eq!(d.len, 512);
        assert!(d.is_last);

        let d = ChunkDescriptor::compute(2560, 1024, 1).unwrap();
        assert!(!d.is_last);
    }

    #[test]
    fn test_progress_clamped() {
        assert_eq!(progress(0, 100), 0.0);
        assert_eq!(progress(50, 100), 0.5);
        assert_eq!(progress(150, 100), 1.0);
        assert_eq!(progress(10, 0), 0.0);
    }

    #[test]
    fn test_eta_infinite_at_zero_speed() {
        assert!(eta_seconds(1024, 0.0).is_infinite());
        assert_eq!(eta_seconds(1024, 512.0), 2.0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MiB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(2.25 * 1024.0 * 1024.0), "2.25 MiB/s");
        assert_eq!(format_speed(0.0), "0.00 B/s");
    }

    proptest! {
        /// Chunk lengths sum to the file size and exactly one chunk is last.
        #[test]
        fn chunk_geometry_covers_file(
            file_size in 1u64..=64 * 1024 * 1024,
            chunk_size in 1u64..=1024 * 1024,
        ) {
            let total = total_chunks(file_size, chunk_size);
            prop_assert!(total > 0);

            let mut sum = 0u64;
            let mut last_count = 0;
            for i in 0..total {
                let d = ChunkDescriptor::compute(file_size, chunk_size, i).unwrap();
                prop_assert_eq!(d.offset, i * chunk_size);
                sum += d.len;
                if d.is_last {
                    last_count += 1;
                }
            }
            prop_assert_eq!(sum, file_size);
            prop_assert_eq!(last_count, 1);
            prop_assert!(ChunkDescriptor::compute(file_size, chunk_size, total).is_none());
        }
    }
}
