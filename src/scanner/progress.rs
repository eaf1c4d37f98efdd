//! Live status line. A ticker at 2 Hz reads the engine's atomic counters
//! and repaints one line on stderr:
//!
//! `[1m05s] 1234 attempts | 45.6/s | 2 found | ETA 3m12s`
//!
//! The renderer registers a line printer with the logger so regular log
//! lines are painted above the status line instead of through it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::logger;

pub struct Progress {
    bar: ProgressBar,
    stop: CancellationToken,
    ticker: JoinHandle<()>,
}

impl Progress {
    /// Starts the renderer. `total_attempts` is the expected credential-pair
    /// count (0 disables the ETA).
    pub fn start(
        attempts: Arc<AtomicU64>,
        successes: Arc<AtomicU64>,
        total_attempts: u64,
    ) -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_style(ProgressStyle::with_template("{msg}").expect("static template"));

        {
            let bar = bar.clone();
            logger::set_progress_printer(Some(Box::new(move |line: &str| {
                bar.println(line);
            })));
        }

        let stop = CancellationToken::new();
        let ticker = {
            let bar = bar.clone();
            let stop = stop.clone();
            let start_time = Instant::now();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(500));
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => return,
                        _ = interval.tick() => {
                            bar.set_message(render(
                                start_time.elapsed(),
                                attempts.load(Ordering::Relaxed),
                                successes.load(Ordering::Relaxed),
                                total_attempts,
                            ));
                        }
                    }
                }
            })
        };

        Progress { bar, stop, ticker }
    }

    /// Clears the line one last time and deregisters the logger hook.
    pub async fn stop(self) {
        self.stop.cancel();
        let _ = self.ticker.await;
        logger::set_progress_printer(None);
        self.bar.finish_and_clear();
    }
}

fn render(elapsed: Duration, attempts: u64, successes: u64, total: u64) -> String {
    let secs = elapsed.as_secs_f64();
    let speed = if secs > 0.0 {
        attempts as f64 / secs
    } else {
        0.0
    };

    let mut line = format!(
        "[{}] {} attempts | {:.1}/s | {} found",
        format_duration(elapsed),
        attempts,
        speed,
        successes
    );

    if speed > 0.0 && total > 0 && attempts < total {
        let remaining = (total - attempts) as f64 / speed;
        line.push_str(&format!(
            " | ETA {}",
            format_duration(Duration::from_secs_f64(remaining))
        ));
    }
    line
}

fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m05s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h02m05s");
    }

    #[test]
    fn render_includes_eta_only_with_progress() {
        let line = render(Duration::from_secs(10), 100, 2, 1000);
        assert!(line.contains("100 attempts"));
        assert!(line.contains("10.0/s"));
        assert!(line.contains("2 found"));
        assert!(line.contains("ETA 1m30s"));

        // no total, so no ETA
        let line = render(Duration::from_secs(10), 100, 2, 0);
        assert!(!line.contains("ETA"));

        // past the total, so no ETA
        let line = render(Duration::from_secs(10), 100, 2, 50);
        assert!(!line.contains("ETA"));
    }
}
