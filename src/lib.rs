mod config;
mod error;
mod mapper;
mod pool;
mod progress;
mod util;

pub use crate::config::{default_workers, DisplayOptions, MapOptions};
pub use crate::error::MapError;
pub use crate::mapper::{imap_unordered_with_progress, ParallelMapper};

// Expose the pool for callers that want to drive chunks themselves.
pub use crate::pool::{PoolProbe, WorkerPool};

// Expose multiprogress and progress helpers.
pub use crate::progress::{set_global_multiprogress, ProgressScope, RendererKind};

pub use crate::util::init_tracing_once;
