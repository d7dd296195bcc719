//! Terminal progress for indexing jobs, and a log writer that keeps bars pinned.

use crate::jobs::{JobStatus, ProgressSnapshot};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use tokio::sync::watch;
use tracing_subscriber::fmt::MakeWriter;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

/// Bar for one library's indexing job
pub fn library_progress_bar(library_name: &str) -> ProgressBar {
    let bar = multi_progress().add(ProgressBar::new(0));
    let style = ProgressStyle::with_template(
        "{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} items {msg} ({elapsed})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    bar.set_style(style);
    bar.set_prefix(library_name.to_string());
    bar
}

/// Mirror a job's snapshots on `bar` until the job ends
pub async fn follow_job(mut rx: watch::Receiver<ProgressSnapshot>, bar: ProgressBar) {
    loop {
        let snap = rx.borrow_and_update().clone();
        bar.set_length(snap.total as u64);
        bar.set_position(snap.current as u64);
        if snap.status == JobStatus::Cancelling {
            bar.set_message("cancelling");
        }

        if !snap.status.is_active() {
            bar.finish_with_message(snap.status.to_string());
            return;
        }

        if rx.changed().await.is_err() {
            bar.abandon();
            return;
        }
    }
}

/// `MakeWriter` that routes log lines through the progress bars
#[derive(Default, Clone)]
pub struct LogWriterFactory;

/// Buffers partial writes and prints complete lines above the bars
pub struct LogWriter {
    pending: String,
}

impl LogWriter {
    fn emit(line: &str) {
        let _ = multi_progress().println(line.trim_end_matches('\r'));
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.push_str(&String::from_utf8_lossy(buf));

        while let Some(end) = self.pending.find('\n') {
            Self::emit(&self.pending[..end]);
            self.pending.drain(..=end);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            Self::emit(&self.pending);
            self.pending.clear();
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            pending: String::new(),
        }
    }
}
