use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::ExchangeError;

/// Upper bound on pages per paginated query. A misbehaving cursor cannot
/// spin forever.
const MAX_PAGES: usize = 10_000;

/// Decoded records plus the count of records dropped as malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: 0,
        }
    }
}

impl<T> Batch<T> {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            items: Vec::with_capacity(n),
            skipped: 0,
        }
    }

    pub fn extend(&mut self, other: Batch<T>) {
        self.items.extend(other.items);
        self.skipped += other.skipped;
    }

    /// Raw records seen, decoded or not.
    pub fn raw_len(&self) -> usize {
        self.items.len() + self.skipped
    }
}

/// One page of a paginated endpoint and the cursor for the next one.
#[derive(Debug)]
pub struct Page<T, C> {
    pub batch: Batch<T>,
    pub next: Option<C>,
}

/// Drain a paginated endpoint.
///
/// Stops on an empty page, a page shorter than `page_size`, or a missing
/// continuation cursor. `delay` is slept between consecutive requests.
pub async fn collect_pages<T, C, F, Fut>(
    page_size: usize,
    delay: Duration,
    mut fetch: F,
) -> Result<Batch<T>, ExchangeError>
where
    F: FnMut(Option<C>) -> Fut,
    Fut: Future<Output = Result<Page<T, C>, ExchangeError>>,
{
    let mut out = Batch::default();
    let mut cursor = None;

    for _ in 0..MAX_PAGES {
        let page = fetch(cursor.take()).await?;
        let seen = page.batch.raw_len();
        out.extend(page.batch);

        if seen == 0 || seen < page_size {
            return Ok(out);
        }
        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(out),
        }
        pause(delay).await;
    }

    tracing::warn!(
        max_pages = MAX_PAGES,
        collected = out.raw_len(),
        "Page limit reached, remaining history not fetched"
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Time-window chunking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Split `[earliest, end]` into windows of at most `width`, newest first.
///
/// Both bounds of a window are inclusive on the exchange side, so each older
/// window ends 1 ms before the start of the newer one. No instant belongs
/// to two windows. The oldest window is clipped to `earliest`.
pub fn time_windows(end: DateTime<Utc>, earliest: DateTime<Utc>, width: TimeDelta) -> Vec<TimeWindow> {
    let mut windows = Vec::new();
    if width <= TimeDelta::zero() || end <= earliest {
        return windows;
    }

    let mut cursor = end;
    while cursor >= earliest {
        let start = (cursor - width).max(earliest);
        windows.push(TimeWindow { start, end: cursor });
        cursor = start - TimeDelta::milliseconds(1);
    }
    windows
}

/// Fetch each window in order, newest first.
///
/// A `RetentionExceeded` answer ends the walk and keeps everything
/// collected so far. Any other error aborts.
pub async fn collect_windows<T, F, Fut>(
    windows: &[TimeWindow],
    delay: Duration,
    mut fetch: F,
) -> Result<Batch<T>, ExchangeError>
where
    F: FnMut(TimeWindow) -> Fut,
    Fut: Future<Output = Result<Batch<T>, ExchangeError>>,
{
    let mut out = Batch::default();

    for (i, window) in windows.iter().enumerate() {
        if i > 0 {
            pause(delay).await;
        }
        match fetch(*window).await {
            Ok(batch) => out.extend(batch),
            Err(ExchangeError::RetentionExceeded(msg)) => {
                tracing::debug!(window_start = %window.start, reason = %msg, "Reached history retention limit");
                break;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(out)
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn batch(n: usize) -> Batch<usize> {
        Batch {
            items: (0..n).collect(),
            skipped: 0,
        }
    }

    #[test]
    fn test_windows_cover_range_newest_first() {
        let end = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let earliest = end - TimeDelta::days(30);
        let windows = time_windows(end, earliest, TimeDelta::days(7));

        // ceil(30 / 7)
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[0].end, end);
        assert_eq!(windows.last().unwrap().start, earliest);
        for pair in windows.windows(2) {
            assert_eq!(pair[1].end, pair[0].start - TimeDelta::milliseconds(1));
            assert!(pair[0].start > pair[1].start);
        }
        for w in &windows {
            assert!(w.start <= w.end);
            assert!(w.end - w.start <= TimeDelta::days(7));
        }
    }

    #[test]
    fn test_boundary_instant_falls_in_exactly_one_window() {
        let end = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let earliest = end - TimeDelta::days(21);
        let windows = time_windows(end, earliest, TimeDelta::days(7));

        let contains = |t: DateTime<Utc>| windows.iter().filter(|w| w.start <= t && t <= w.end).count();
        for w in &windows {
            assert_eq!(contains(w.start), 1);
            assert_eq!(contains(w.end), 1);
        }
        assert_eq!(contains(earliest), 1);
        assert_eq!(contains(end), 1);
    }

    #[test]
    fn test_windows_degenerate_inputs() {
        let now = Utc::now();
        assert!(time_windows(now, now, TimeDelta::days(7)).is_empty());
        assert!(time_windows(now, now - TimeDelta::days(1), TimeDelta::zero()).is_empty());
    }

    #[tokio::test]
    async fn test_collect_pages_follows_cursor_until_short_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let out = collect_pages(100, Duration::ZERO, move |cursor: Option<u32>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                let page = cursor.unwrap_or(1);
                let n = if page < 3 { 100 } else { 20 };
                Ok(Page {
                    batch: batch(n),
                    next: Some(page + 1),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(out.items.len(), 220);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_without_cursor() {
        let out = collect_pages(10, Duration::ZERO, |_cursor: Option<String>| async {
            Ok(Page {
                batch: batch(10),
                next: None,
            })
        })
        .await
        .unwrap();
        assert_eq!(out.items.len(), 10);
    }

    #[tokio::test]
    async fn test_skipped_records_count_toward_page_size() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let out = collect_pages(3, Duration::ZERO, move |cursor: Option<u32>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                let first = cursor.is_none();
                Ok(Page {
                    batch: Batch {
                        items: if first { vec![1, 2] } else { vec![] },
                        skipped: if first { 1 } else { 0 },
                    },
                    next: Some(2),
                })
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(out.items, vec![1, 2]);
        assert_eq!(out.skipped, 1);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_at_page_limit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let out = collect_pages(1, Duration::ZERO, move |cursor: Option<usize>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(Page {
                    batch: batch(1),
                    next: Some(cursor.unwrap_or(0) + 1),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), MAX_PAGES);
        assert_eq!(out.items.len(), MAX_PAGES);
    }

    #[tokio::test]
    async fn test_collect_windows_stops_at_retention_and_keeps_data() {
        let end = Utc::now();
        let windows = time_windows(end, end - TimeDelta::days(28), TimeDelta::days(7));
        assert_eq!(windows.len(), 4);

        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let out = collect_windows(&windows, Duration::ZERO, move |_w| {
            let c = c.clone();
            async move {
                match c.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Ok(batch(5)),
                    _ => Err(ExchangeError::RetentionExceeded("earlier than 2 years".into())),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(out.items.len(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_collect_windows_propagates_other_errors() {
        let end = Utc::now();
        let windows = time_windows(end, end - TimeDelta::days(14), TimeDelta::days(7));
        let result: Result<Batch<usize>, _> = collect_windows(&windows, Duration::ZERO, |_w| async {
            Err(ExchangeError::RateLimited { code: "10006".into() })
        })
        .await;
        assert!(matches!(result, Err(ExchangeError::RateLimited { .. })));
    }
}
