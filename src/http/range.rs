//! HTTP Range request parsing module
//!
//! Single `bytes=` ranges only (RFC 7233). Multi-range requests fall back to a
//! full response, which the RFC permits.

/// Inclusive byte range within an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header
    pub fn content_range(&self, total: usize) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

/// Outcome of evaluating a `Range` header against an asset size
#[derive(Debug, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No usable Range header; serve the full body
    Full,
    /// Serve the given slice with 206
    Partial(ByteRange),
    /// Respond 416
    Unsatisfiable,
}

/// Evaluate a `Range` header
///
/// # Examples
/// ```
/// use ratel::http::range::{evaluate_range, ByteRange, RangeOutcome};
///
/// assert_eq!(
///     evaluate_range(Some("bytes=0-99"), 1000),
///     RangeOutcome::Partial(ByteRange { start: 0, end: 99 })
/// );
/// assert_eq!(evaluate_range(None, 1000), RangeOutcome::Full);
/// ```
pub fn evaluate_range(header: Option<&str>, size: usize) -> RangeOutcome {
    let Some(byte_ranges) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return RangeOutcome::Full;
    };
    if byte_ranges.contains(',') {
        return RangeOutcome::Full;
    }
    let Some((first, last)) = byte_ranges.split_once('-') else {
        return RangeOutcome::Full;
    };

    match (first.trim(), last.trim()) {
        ("", suffix) => suffix_range(suffix, size),
        (start, end) => bounded_range(start, end, size),
    }
}

// "-500": the final 500 bytes
fn suffix_range(suffix: &str, size: usize) -> RangeOutcome {
    let Ok(n) = suffix.parse::<usize>() else {
        return RangeOutcome::Full;
    };
    if n == 0 || size == 0 {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Partial(ByteRange {
        start: size.saturating_sub(n),
        end: size - 1,
    })
}

// "100-" or "100-199"
fn bounded_range(start: &str, end: &str, size: usize) -> RangeOutcome {
    let Ok(start) = start.parse::<usize>() else {
        return RangeOutcome::Full;
    };
    if start >= size {
        return RangeOutcome::Unsatisfiable;
    }

    let end = if end.is_empty() {
        size - 1
    } else {
        match end.parse::<usize>() {
            Ok(e) if e < start => return RangeOutcome::Unsatisfiable,
            Ok(e) => e.min(size - 1),
            Err(_) => return RangeOutcome::Full,
        }
    };

    RangeOutcome::Partial(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(start: usize, end: usize) -> RangeOutcome {
        RangeOutcome::Partial(ByteRange { start, end })
    }

    #[test]
    fn test_bounded_and_open() {
        assert_eq!(evaluate_range(Some("bytes=0-9"), 100), partial(0, 9));
        assert_eq!(evaluate_range(Some("bytes=50-"), 100), partial(50, 99));
        assert_eq!(evaluate_range(Some("bytes=90-500"), 100), partial(90, 99));
    }

    #[test]
    fn test_suffix() {
        assert_eq!(evaluate_range(Some("bytes=-20"), 100), partial(80, 99));
        assert_eq!(evaluate_range(Some("bytes=-500"), 100), partial(0, 99));
        assert_eq!(
            evaluate_range(Some("bytes=-0"), 100),
            RangeOutcome::Unsatisfiable
        );
    }

    #[test]
    fn test_unsatisfiable() {
        assert_eq!(
            evaluate_range(Some("bytes=200-"), 100),
            RangeOutcome::Unsatisfiable
        );
        assert_eq!(
            evaluate_range(Some("bytes=20-10"), 100),
            RangeOutcome::Unsatisfiable
        );
        assert_eq!(evaluate_range(Some("bytes=0-"), 0), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn test_ignored_headers() {
        assert_eq!(evaluate_range(Some("bytes=a-b"), 100), RangeOutcome::Full);
        assert_eq!(evaluate_range(Some("bytes=0-9,20-29"), 100), RangeOutcome::Full);
        assert_eq!(evaluate_range(Some("items=0-9"), 100), RangeOutcome::Full);
    }

    #[test]
    fn test_range_helpers() {
        let r = ByteRange { start: 10, end: 19 };
        assert_eq!(r.len(), 10);
        assert_eq!(r.content_range(100), "bytes 10-19/100");
    }
}
