use crate::progress::RendererKind;
use serde::{Deserialize, Serialize};

/// How progress is displayed while a map runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    pub enabled: bool,                  // draw a bar at all; counting happens either way
    pub label: Option<String>,          // message shown next to the bar
    pub renderer: Option<RendererKind>, // None = detect once per process
    pub template: Option<String>,       // indicatif template, None = renderer default
    pub progress_chars: Option<String>, // bar fill characters, None = renderer default
    pub tick_millis: Option<u64>,       // steady tick; terminal defaults to 100ms, notebooks to none
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            label: None,
            renderer: None,
            template: None,
            progress_chars: None,
            tick_millis: None,
        }
    }
}

impl DisplayOptions {
    pub fn with_enabled(mut self, yes: bool) -> Self {
        self.enabled = yes;
        self
    }
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
    pub fn with_renderer(mut self, kind: RendererKind) -> Self {
        self.renderer = Some(kind);
        self
    }
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
    pub fn with_progress_chars(mut self, chars: impl Into<String>) -> Self {
        self.progress_chars = Some(chars.into());
        self
    }
    pub fn with_tick_millis(mut self, ms: u64) -> Self {
        self.tick_millis = Some(ms);
        self
    }
}

/// User-facing options for one parallel map, with defaults and builder chaining.
/// Values are validated when the map runs, not here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
    pub n_workers: usize,  // 1 runs sequentially in-process
    pub chunk_size: usize, // items handed to a worker per dispatch
    pub display: DisplayOptions,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            n_workers: default_workers(),
            chunk_size: 1,
            display: DisplayOptions::default(),
        }
    }
}

impl MapOptions {
    /// Defaults overlaid with environment overrides:
    /// - MULTITASK_WORKERS: worker count
    /// - MULTITASK_CHUNK_SIZE: items per dispatch
    /// - MULTITASK_NO_PROGRESS: hide the bar (any value except empty, "0" or "false")
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(n) = parse_usize(&lookup, "MULTITASK_WORKERS") {
            self.n_workers = n;
        }
        if let Some(n) = parse_usize(&lookup, "MULTITASK_CHUNK_SIZE") {
            self.chunk_size = n;
        }
        if let Some(v) = lookup("MULTITASK_NO_PROGRESS") {
            let v = v.trim().to_ascii_lowercase();
            if !(v.is_empty() || v == "0" || v == "false") {
                self.display.enabled = false;
            }
        }
        self
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.n_workers = n;
        self
    }
    pub fn with_chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }
    pub fn with_display(mut self, display: DisplayOptions) -> Self {
        self.display = display;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.display.enabled = yes;
        self
    }
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.display.label = Some(label.into());
        self
    }
}

fn parse_usize<F>(lookup: &F, key: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<usize>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!("{} is set but not a non-negative integer: {:?}", key, raw);
            None
        }
    }
}

/// Logical CPU count of the host, or 1 when it cannot be queried.
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
