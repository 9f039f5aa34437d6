use futures::StreamExt;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::{debug, warn};

use crate::coordinator::DownloadTarget;
use crate::error::{FetchError, TransportError};
use crate::planner::ByteRange;
use crate::progress::ProgressTracker;
use crate::source::RangeSource;

pub const CHUNK_SIZE: usize = 8 * 1024;

/// Downloads `range` of the target into the same offsets of the destination file.
///
/// The worker opens its own write handle, so its file cursor is never shared with
/// sibling workers. Each chunk is written in full before it is reported to `tracker`.
/// Bytes beyond `range.end` are discarded.
pub async fn fetch_range<S>(
    source: &S,
    target: &DownloadTarget,
    range: ByteRange,
    tracker: &ProgressTracker,
) -> Result<(), FetchError>
where
    S: RangeSource + ?Sized,
{
    debug!(range = %range, "requesting range");
    let mut stream = source
        .open_range(&target.url, range)
        .await
        .map_err(|e| FetchError::network(range, e))?;

    let mut file = OpenOptions::new()
        .write(true)
        .open(&target.path)
        .await
        .map_err(|e| FetchError::io(range, e))?;
    file.seek(SeekFrom::Start(range.start))
        .await
        .map_err(|e| FetchError::io(range, e))?;

    let end_exclusive = range.end + 1;
    let mut offset = range.start;

    let result = async {
        while offset < end_exclusive {
            let Some(item) = stream.next().await else {
                break;
            };
            let mut bytes = item.map_err(|e| FetchError::network(range, e))?;

            let wanted = end_exclusive - offset;
            if bytes.len() as u64 > wanted {
                let extra = bytes.len() as u64 - wanted;
                warn!(range = %range, extra, "server sent bytes past range end, discarding");
                bytes.truncate(wanted as usize);
            }

            for chunk in bytes.chunks(CHUNK_SIZE) {
                file.write_all(chunk)
                    .await
                    .map_err(|e| FetchError::io(range, e))?;
                offset += chunk.len() as u64;
                tracker.record_bytes(chunk.len() as u64);
            }
        }
        Ok::<(), FetchError>(())
    }
    .await;

    // Pending writes must land even when the stream failed half way.
    let flushed = file.flush().await.map_err(|e| FetchError::io(range, e));
    result?;
    flushed?;

    if offset < end_exclusive {
        let err = TransportError::Interrupted(format!(
            "short body, received {} of {} bytes",
            offset - range.start,
            range.len()
        ));
        return Err(FetchError::network(range, err));
    }

    debug!(range = %range, "range complete");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use reqwest::StatusCode;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    use crate::source::ByteStream;

    pub(crate) struct MemorySource {
        pub data: Vec<u8>,
        // bytes per stream item
        pub delivery_size: usize,
        // answered with 503
        pub failing_starts: HashSet<u64>,
        pub truncate_after: Option<usize>,
        // serve from range.start to the end of data
        pub ignore_range_end: bool,
        pub report_length: Option<u64>,
        pub head_calls: AtomicUsize,
        pub range_calls: AtomicUsize,
        pub requested: Mutex<Vec<ByteRange>>,
    }

    impl MemorySource {
        pub fn new(data: Vec<u8>) -> Self {
            let len = data.len() as u64;
            Self {
                data,
                delivery_size: 100,
                failing_starts: HashSet::new(),
                truncate_after: None,
                ignore_range_end: false,
                report_length: Some(len),
                head_calls: AtomicUsize::new(0),
                range_calls: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
            }
        }

        pub fn failing_at(mut self, start: u64) -> Self {
            self.failing_starts.insert(start);
            self
        }
    }

    #[async_trait]
    impl RangeSource for MemorySource {
        async fn content_length(&self, _url: &str) -> Result<Option<u64>, TransportError> {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.report_length)
        }

        async fn open_range(&self, _url: &str, range: ByteRange) -> Result<ByteStream, TransportError> {
            self.range_calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(range);
            if self.failing_starts.contains(&range.start) {
                return Err(TransportError::UnexpectedStatus(StatusCode::SERVICE_UNAVAILABLE));
            }

            let end = if self.ignore_range_end {
                self.data.len()
            } else {
                (range.end as usize + 1).min(self.data.len())
            };
            let mut body = self.data[range.start as usize..end].to_vec();
            if let Some(limit) = self.truncate_after {
                body.truncate(limit);
            }
            let items: Vec<Result<Bytes, TransportError>> = body
                .chunks(self.delivery_size)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(stream::iter(items).boxed())
        }
    }

    pub(crate) fn sample_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn target_in(dir: &TempDir, len: u64) -> DownloadTarget {
        let path = dir.path().join("out.bin");
        std::fs::File::create(&path).unwrap().set_len(len).unwrap();
        DownloadTarget::new("http://example.test/out.bin", path)
    }

    #[tokio::test]
    async fn writes_range_at_its_offset() {
        let dir = TempDir::new().unwrap();
        let data = sample_data(1000);
        let source = MemorySource::new(data.clone());
        let target = target_in(&dir, 1000);
        let tracker = ProgressTracker::hidden(1000, 0);

        fetch_range(&source, &target, ByteRange::new(250, 499), &tracker)
            .await
            .unwrap();

        let written = std::fs::read(&target.path).unwrap();
        assert_eq!(&written[250..500], &data[250..500]);
        assert!(written[..250].iter().all(|b| *b == 0));
        assert!(written[500..].iter().all(|b| *b == 0));
        assert_eq!(tracker.snapshot().completed_bytes, 250);
    }

    #[tokio::test]
    async fn large_deliveries_are_split_into_bounded_chunks() {
        let dir = TempDir::new().unwrap();
        let data = sample_data(40_000);
        let mut source = MemorySource::new(data.clone());
        source.delivery_size = 30_000;
        let target = target_in(&dir, 40_000);
        let tracker = ProgressTracker::hidden(40_000, 0);

        fetch_range(&source, &target, ByteRange::new(0, 39_999), &tracker)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&target.path).unwrap(), data);
        assert_eq!(tracker.snapshot().completed_bytes, 40_000);
    }

    #[tokio::test]
    async fn rejected_request_is_a_network_error_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new(sample_data(100)).failing_at(0);
        let target = target_in(&dir, 100);
        let tracker = ProgressTracker::hidden(100, 0);

        let err = fetch_range(&source, &target, ByteRange::new(0, 99), &tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network { .. }));
        assert_eq!(err.range(), ByteRange::new(0, 99));
        assert!(std::fs::read(&target.path).unwrap().iter().all(|b| *b == 0));
        assert_eq!(tracker.snapshot().completed_bytes, 0);
    }

    #[tokio::test]
    async fn short_body_keeps_received_bytes_and_fails() {
        let dir = TempDir::new().unwrap();
        let data = sample_data(100);
        let mut source = MemorySource::new(data.clone());
        source.truncate_after = Some(40);
        let target = target_in(&dir, 100);
        let tracker = ProgressTracker::hidden(100, 0);

        let err = fetch_range(&source, &target, ByteRange::new(0, 99), &tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network { .. }));
        let written = std::fs::read(&target.path).unwrap();
        assert_eq!(&written[..40], &data[..40]);
        assert!(written[40..].iter().all(|b| *b == 0));
        assert_eq!(tracker.snapshot().completed_bytes, 40);
    }

    #[tokio::test]
    async fn bytes_past_range_end_are_discarded() {
        let dir = TempDir::new().unwrap();
        let data = sample_data(1000);
        let mut source = MemorySource::new(data.clone());
        source.ignore_range_end = true;
        source.delivery_size = 300;
        let target = target_in(&dir, 1000);
        let tracker = ProgressTracker::hidden(1000, 0);
        let range = ByteRange::new(0, 99);

        fetch_range(&source, &target, range, &tracker).await.unwrap();

        let written = std::fs::read(&target.path).unwrap();
        assert_eq!(written.len(), 1000);
        assert_eq!(&written[..100], &data[..100]);
        assert!(written[100..].iter().all(|b| *b == 0));
        assert_eq!(tracker.snapshot().completed_bytes, range.len());
    }

    #[tokio::test]
    async fn overlong_body_does_not_touch_next_range() {
        let dir = TempDir::new().unwrap();
        let data = sample_data(1000);
        let mut source = MemorySource::new(data.clone());
        source.ignore_range_end = true;
        let target = target_in(&dir, 1000);
        let tracker = ProgressTracker::hidden(1000, 0);

        fetch_range(&source, &target, ByteRange::new(250, 499), &tracker)
            .await
            .unwrap();

        let written = std::fs::read(&target.path).unwrap();
        assert_eq!(&written[250..500], &data[250..500]);
        assert!(written[500..].iter().all(|b| *b == 0));
        assert_eq!(tracker.snapshot().completed_bytes, 250);
    }

    #[tokio::test]
    async fn missing_destination_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new(sample_data(10));
        let target = DownloadTarget::new("http://example.test/x", dir.path().join("missing"));
        let tracker = ProgressTracker::hidden(10, 0);

        let err = fetch_range(&source, &target, ByteRange::new(0, 9), &tracker)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }
}
