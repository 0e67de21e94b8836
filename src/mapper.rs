use crate::config::{DisplayOptions, MapOptions};
use crate::error::{exact_len, MapError};
use crate::pool::WorkerPool;
use crate::progress::{ProgressScope, RendererKind};
use anyhow::Result;

/// Runs a function over a collection on a fixed-size worker pool, collecting results in
/// completion order while a progress bar counts them.
#[derive(Clone, Debug, Default)]
pub struct ParallelMapper {
    pub(crate) opts: MapOptions,
}

impl ParallelMapper {
    pub fn new() -> Self {
        Self { opts: MapOptions::default() }
    }

    pub fn from_options(opts: MapOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &MapOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn workers(mut self, n: usize) -> Self { self.opts = self.opts.with_workers(n); self }
    pub fn chunk_size(mut self, n: usize) -> Self { self.opts = self.opts.with_chunk_size(n); self }
    pub fn display(mut self, display: DisplayOptions) -> Self { self.opts = self.opts.with_display(display); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_label(label); self }
    pub fn renderer(mut self, kind: RendererKind) -> Self { self.opts.display = self.opts.display.with_renderer(kind); self }
    pub fn template(mut self, template: impl Into<String>) -> Self { self.opts.display = self.opts.display.with_template(template); self }
    pub fn progress_chars(mut self, chars: impl Into<String>) -> Self { self.opts.display = self.opts.display.with_progress_chars(chars); self }
    pub fn tick_millis(mut self, ms: u64) -> Self { self.opts.display = self.opts.display.with_tick_millis(ms); self }

    /// Apply `fun` to every item and return the results.
    ///
    /// With one worker the items run in order on the calling thread and the results keep input
    /// order. With more, a pool of that many threads runs chunks of `chunk_size` items and the
    /// results arrive in completion order. The input must report an exact length up front.
    ///
    /// Errors from `fun` come back unchanged. The pool and the progress bar are released
    /// before this returns, whatever the outcome.
    pub fn run<T, R, F, I>(&self, fun: F, items: I) -> Result<Vec<R>>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Sync,
    {
        let items = items.into_iter();
        let total = self.validate(&items)?;
        let progress = ProgressScope::with_options(total as u64, &self.display_resolved())?;

        let outcome = if self.opts.n_workers == 1 {
            run_sequential(&fun, items, total, &progress)
        } else {
            let pool = WorkerPool::new(self.opts.n_workers)?;
            run_pooled(pool, &fun, items, total, self.opts.chunk_size, &progress)
        };

        match &outcome {
            Ok(results) => {
                progress.finish("");
                tracing::debug!(results = results.len(), "map completed");
            }
            Err(e) => {
                progress.abandon();
                tracing::debug!(error = %e, done = progress.position(), total, "map failed");
            }
        }
        outcome
    }

    /// `run` for functions that cannot fail.
    pub fn run_infallible<T, R, F, I>(&self, fun: F, items: I) -> Result<Vec<R>>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        self.run(|item| Ok::<R, anyhow::Error>(fun(item)), items)
    }

    fn validate<I: Iterator>(&self, items: &I) -> Result<usize, MapError> {
        if self.opts.n_workers == 0 {
            return Err(MapError::InvalidConfiguration("n_workers must be at least 1".into()));
        }
        if self.opts.chunk_size == 0 {
            return Err(MapError::InvalidConfiguration("chunk_size must be at least 1".into()));
        }
        exact_len(items)
    }

    /// Display options with the renderer fixed for the whole call.
    fn display_resolved(&self) -> DisplayOptions {
        let mut display = self.opts.display.clone();
        if display.renderer.is_none() {
            display.renderer = Some(RendererKind::detect());
        }
        display
    }
}

fn run_sequential<T, R, F, I>(fun: &F, items: I, total: usize, progress: &ProgressScope) -> Result<Vec<R>>
where
    I: Iterator<Item = T>,
    F: Fn(T) -> Result<R>,
{
    let mut results = Vec::with_capacity(total);
    for item in items {
        results.push(fun(item)?);
        progress.inc_items(1);
    }
    Ok(results)
}

/// Consumes the pool so it is joined on every path out of here, including unwinding.
fn run_pooled<T, R, F, I>(
    pool: WorkerPool,
    fun: &F,
    items: I,
    total: usize,
    chunk_size: usize,
    progress: &ProgressScope,
) -> Result<Vec<R>>
where
    I: Iterator<Item = T>,
    T: Send,
    R: Send,
    F: Fn(T) -> Result<R> + Sync,
{
    let mut results = Vec::with_capacity(total);
    let mapped = pool.map_unordered(fun, items, chunk_size, |r| {
        results.push(r);
        progress.inc_items(1);
    });
    pool.shutdown();
    mapped.map(|()| results)
}

/// One-call form: `n_workers` threads, `chunk_size` items per dispatch, optional bar label.
pub fn imap_unordered_with_progress<T, R, F, I>(
    fun: F,
    items: I,
    n_workers: usize,
    chunk_size: usize,
    label: Option<&str>,
) -> Result<Vec<R>>
where
    I: IntoIterator<Item = T>,
    T: Send,
    R: Send,
    F: Fn(T) -> Result<R> + Sync,
{
    let mut mapper = ParallelMapper::new().workers(n_workers).chunk_size(chunk_size);
    if let Some(label) = label {
        mapper = mapper.label(label);
    }
    mapper.run(fun, items)
}
