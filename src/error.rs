//! Errors raised by the mapper itself. Errors returned by the user function are never wrapped:
//! they travel back to the caller as the original `anyhow::Error`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// Worker count or chunk size out of range.
    InvalidConfiguration(String),
    /// The input iterator could not report an exact length before iteration.
    LengthUnavailable { lower: usize, upper: Option<usize> },
    /// The worker pool could not be built or torn down.
    PoolManagement(String),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::InvalidConfiguration(msg) => write!(f, "invalid configuration: {}", msg),
            MapError::LengthUnavailable { lower, upper: Some(upper) } => write!(
                f,
                "input length unavailable: size hint is between {} and {} items",
                lower, upper
            ),
            MapError::LengthUnavailable { lower, upper: None } => write!(
                f,
                "input length unavailable: size hint is at least {} items with no upper bound",
                lower
            ),
            MapError::PoolManagement(msg) => write!(f, "worker pool failure: {}", msg),
        }
    }
}

impl std::error::Error for MapError {}

/// Exact length of an iterator from its size hint, or `LengthUnavailable`.
pub(crate) fn exact_len<I: Iterator>(iter: &I) -> Result<usize, MapError> {
    match iter.size_hint() {
        (lower, Some(upper)) if lower == upper => Ok(lower),
        (lower, upper) => Err(MapError::LengthUnavailable { lower, upper }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_len_accepts_sized_iterators() {
        assert_eq!(exact_len(&vec![1, 2, 3].into_iter()), Ok(3));
        assert_eq!(exact_len(&(0..0)), Ok(0));
    }

    #[test]
    fn exact_len_rejects_filtered_and_unbounded() {
        let filtered = (0..10).filter(|x| x % 2 == 0);
        assert_eq!(
            exact_len(&filtered),
            Err(MapError::LengthUnavailable { lower: 0, upper: Some(10) })
        );
        assert!(matches!(
            exact_len(&(0..).into_iter()),
            Err(MapError::LengthUnavailable { upper: None, .. })
        ));
    }

    #[test]
    fn display_mentions_cause() {
        let e = MapError::InvalidConfiguration("n_workers must be at least 1".into());
        assert!(e.to_string().contains("n_workers"));
    }
}
