use multitask::ParallelMapper;
use std::fmt;

/// Mapper with the bar hidden so test output stays clean; counting still happens.
pub fn quiet(workers: usize) -> ParallelMapper {
    ParallelMapper::new().workers(workers).progress(false)
}

pub fn square(x: i64) -> anyhow::Result<i64> {
    Ok(x * x)
}

pub fn sorted<T: Ord>(mut v: Vec<T>) -> Vec<T> {
    v.sort();
    v
}

/// A user error type, to check errors come back as the very same type.
#[derive(Debug, PartialEq, Eq)]
pub struct BadValue(pub i64);

impl fmt::Display for BadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad value: {}", self.0)
    }
}

impl std::error::Error for BadValue {}

/// Squares, but fails on `bad`.
pub fn square_unless(bad: i64) -> impl Fn(i64) -> anyhow::Result<i64> + Sync {
    move |x| {
        if x == bad {
            Err(BadValue(x).into())
        } else {
            Ok(x * x)
        }
    }
}
