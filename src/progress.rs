//! Progress reporting: count-style bars with a terminal and a notebook renderer.

use crate::config::DisplayOptions;
use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle, TermLike};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Optional global MultiProgress that allows multiple bars to render concurrently.
/// If unset, progress bars draw to their renderer's default target.
static GLOBAL_MP: OnceLock<Arc<MultiProgress>> = OnceLock::new();

/// Renderer kind detected for this process, resolved on first use.
static DETECTED: OnceLock<RendererKind> = OnceLock::new();

/// Variables a Jupyter kernel exports to the processes it launches.
const NOTEBOOK_MARKERS: [&str; 2] = ["JPY_PARENT_PID", "JPY_SESSION_NAME"];

const TERMINAL_TEMPLATE: &str = "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
     it/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}";
const NOTEBOOK_TEMPLATE: &str = "{msg} {pos}/{len} [{bar:40}] {percent:>3}%  elapsed: {elapsed_precise}  eta: {eta_precise}";
const TERMINAL_CHARS: &str = "█▉▊▋▌▍▎▏  ";
const NOTEBOOK_CHARS: &str = "#>-";
const DEFAULT_TICK_MS: u64 = 100;
const NOTEBOOK_WIDTH: u16 = 100;

/// Which surface progress is rendered to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// ANSI terminal on stderr, with spinner and steady tick.
    Terminal,
    /// Notebook cell output: plain carriage-return redraws on stdout.
    Notebook,
}

impl RendererKind {
    /// Detect once per process whether we run under a notebook kernel.
    pub fn detect() -> Self {
        *DETECTED.get_or_init(|| {
            let kind = Self::detect_with(|key| std::env::var_os(key).is_some());
            tracing::debug!(?kind, "resolved progress renderer");
            kind
        })
    }

    fn detect_with<F: Fn(&str) -> bool>(has_var: F) -> Self {
        if NOTEBOOK_MARKERS.iter().any(|k| has_var(k)) {
            RendererKind::Notebook
        } else {
            RendererKind::Terminal
        }
    }

    fn default_template(self) -> &'static str {
        match self {
            RendererKind::Terminal => TERMINAL_TEMPLATE,
            RendererKind::Notebook => NOTEBOOK_TEMPLATE,
        }
    }

    fn default_chars(self) -> &'static str {
        match self {
            RendererKind::Terminal => TERMINAL_CHARS,
            RendererKind::Notebook => NOTEBOOK_CHARS,
        }
    }
}

/// Install a global MultiProgress used by all subsequently created progress bars.
/// Safe to call once; additional calls are ignored.
pub fn set_global_multiprogress(mp: Arc<MultiProgress>) {
    let _ = GLOBAL_MP.set(mp);
}

fn new_bar(total: u64, kind: RendererKind) -> ProgressBar {
    if let Some(mp) = GLOBAL_MP.get() {
        return mp.add(ProgressBar::new(total));
    }
    match kind {
        RendererKind::Terminal => ProgressBar::new(total),
        RendererKind::Notebook => ProgressBar::with_draw_target(
            Some(total),
            ProgressDrawTarget::term_like(Box::new(NotebookTerm)),
        ),
    }
}

/// Redraws a single line in place with carriage returns, which notebook frontends honor.
#[derive(Debug)]
struct NotebookTerm;

impl TermLike for NotebookTerm {
    fn width(&self) -> u16 {
        NOTEBOOK_WIDTH
    }
    fn move_cursor_up(&self, _n: usize) -> io::Result<()> {
        Ok(())
    }
    fn move_cursor_down(&self, _n: usize) -> io::Result<()> {
        Ok(())
    }
    fn move_cursor_right(&self, _n: usize) -> io::Result<()> {
        Ok(())
    }
    fn move_cursor_left(&self, _n: usize) -> io::Result<()> {
        Ok(())
    }
    fn write_line(&self, s: &str) -> io::Result<()> {
        self.write_str(s)
    }
    fn write_str(&self, s: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        write!(out, "\r{}", s)
    }
    fn clear_line(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        write!(out, "\r{:width$}\r", "", width = NOTEBOOK_WIDTH as usize)
    }
    fn flush(&self) -> io::Result<()> {
        io::stdout().flush()
    }
}

fn build_bar(total: u64, display: &DisplayOptions, kind: RendererKind) -> Result<ProgressBar> {
    if !display.enabled {
        let pb = ProgressBar::hidden();
        pb.set_length(total);
        return Ok(pb);
    }
    let template = display.template.as_deref().unwrap_or(kind.default_template());
    let style = ProgressStyle::with_template(template)
        .with_context(|| format!("invalid progress template {:?}", template))?
        .progress_chars(display.progress_chars.as_deref().unwrap_or(kind.default_chars()));
    let pb = new_bar(total, kind);
    pb.set_style(style);
    if let Some(label) = display.label.as_deref().filter(|l| !l.is_empty()) {
        pb.set_message(label.to_string());
    }
    let tick = match kind {
        RendererKind::Terminal => display.tick_millis.or(Some(DEFAULT_TICK_MS)),
        RendererKind::Notebook => display.tick_millis,
    };
    if let Some(ms) = tick.filter(|ms| *ms > 0) {
        pb.enable_steady_tick(Duration::from_millis(ms));
    }
    Ok(pb)
}

/// A small wrapper around an `indicatif` count bar that is always closed exactly once:
/// `finish(..)` marks success, `abandon()` leaves the bar where it stopped, and dropping an
/// unclosed scope abandons it.
pub struct ProgressScope {
    pb: ProgressBar,
    kind: RendererKind,
}

impl ProgressScope {
    /// Terminal count bar with the default style.
    pub fn count<T: Into<String>>(label: T, total: u64) -> Self {
        let display = DisplayOptions::default().with_label(label).with_renderer(RendererKind::Terminal);
        // The built-in terminal template always parses.
        let pb = build_bar(total, &display, RendererKind::Terminal).unwrap_or_else(|_| ProgressBar::new(total));
        Self { pb, kind: RendererKind::Terminal }
    }

    /// Bar built from display options; the renderer is resolved here and fixed afterwards.
    pub fn with_options(total: u64, display: &DisplayOptions) -> Result<Self> {
        let kind = display.renderer.unwrap_or_else(RendererKind::detect);
        let pb = build_bar(total, display, kind)?;
        Ok(Self { pb, kind })
    }

    #[inline]
    pub fn inc_items(&self, delta: u64) {
        self.pb.inc(delta);
    }

    pub fn position(&self) -> u64 {
        self.pb.position()
    }

    pub fn total(&self) -> u64 {
        self.pb.length().unwrap_or(0)
    }

    pub fn kind(&self) -> RendererKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.pb.is_finished()
    }

    pub fn finish<T: Into<String>>(&self, msg: T) {
        let msg = msg.into();
        if msg.is_empty() {
            self.pb.finish();
        } else {
            self.pb.finish_with_message(msg);
        }
        self.end_line();
    }

    pub fn abandon(&self) {
        self.pb.abandon();
        self.end_line();
    }

    fn end_line(&self) {
        if self.kind == RendererKind::Notebook && !self.pb.is_hidden() {
            println!();
        }
    }
}

impl Drop for ProgressScope {
    fn drop(&mut self) {
        if !self.pb.is_finished() {
            self.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notebook_detected_from_kernel_markers() {
        assert_eq!(RendererKind::detect_with(|k| k == "JPY_PARENT_PID"), RendererKind::Notebook);
        assert_eq!(RendererKind::detect_with(|k| k == "JPY_SESSION_NAME"), RendererKind::Notebook);
        assert_eq!(RendererKind::detect_with(|_| false), RendererKind::Terminal);
    }

    #[test]
    fn hidden_scope_still_counts() {
        let display = DisplayOptions::default().with_enabled(false);
        let scope = ProgressScope::with_options(3, &display).unwrap();
        scope.inc_items(1);
        scope.inc_items(2);
        assert_eq!(scope.position(), 3);
        assert_eq!(scope.total(), 3);
    }

    #[test]
    fn drop_abandons_unfinished_scope() {
        let display = DisplayOptions::default().with_enabled(false);
        let scope = ProgressScope::with_options(2, &display).unwrap();
        let pb = scope.pb.clone();
        scope.inc_items(1);
        drop(scope);
        assert!(pb.is_finished());
        assert_eq!(pb.position(), 1);
    }

    #[test]
    fn count_scope_uses_terminal_renderer() {
        let scope = ProgressScope::count("squares", 4);
        assert_eq!(scope.kind(), RendererKind::Terminal);
        assert_eq!(scope.total(), 4);
        scope.inc_items(4);
        scope.finish("");
        assert_eq!(scope.position(), 4);
    }

    #[test]
    fn finish_closes_scope() {
        let display = DisplayOptions::default().with_enabled(false);
        let scope = ProgressScope::with_options(0, &display).unwrap();
        assert!(!scope.is_closed());
        scope.finish("done");
        assert!(scope.is_closed());
    }
}
