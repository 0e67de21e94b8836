use anyhow::Result;
use multitask::{init_tracing_once, MapOptions, ParallelMapper};

const DEMO_ITEMS: u64 = 10_000;

fn main() -> Result<()> {
    init_tracing_once();
    let opts = MapOptions::from_env().with_label("Squaring");
    tracing::info!(workers = opts.n_workers, chunk_size = opts.chunk_size, "starting demo map");

    let squares = ParallelMapper::from_options(opts).run_infallible(|x: u64| x * x, 0..DEMO_ITEMS)?;

    let sum: u64 = squares.iter().sum();
    tracing::info!(count = squares.len(), sum, "done");
    Ok(())
}
