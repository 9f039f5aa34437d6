use std::fmt;
use std::num::NonZeroUsize;

/// Inclusive byte range `[start, end]` of the destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(end >= start, "degenerate range {}-{}", start, end);
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Splits `[already_downloaded, total_size - 1]` into at most `workers` contiguous ranges.
///
/// Every range but the last has `remaining / workers` bytes; the last one absorbs the
/// remainder. When fewer bytes remain than there are workers, the worker count is
/// reduced so that every range holds at least one byte. Returns an empty plan when
/// nothing is left to fetch.
pub fn plan(total_size: u64, workers: NonZeroUsize, already_downloaded: u64) -> Vec<ByteRange> {
    debug_assert!(already_downloaded <= total_size);
    if already_downloaded >= total_size {
        return Vec::new();
    }

    let remaining = total_size - already_downloaded;
    let split_count = (workers.get() as u64).min(remaining);
    let part_size = remaining / split_count;

    (0..split_count)
        .map(|i| {
            let start = already_downloaded + i * part_size;
            let end = if i == split_count - 1 {
                total_size - 1
            } else {
                start + part_size - 1
            };
            ByteRange::new(start, end)
        })
        .collect()
}
