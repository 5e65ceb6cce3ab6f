// SPDX-License-Identifier: MIT

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Stats;
use crate::control::Control;

/// One status line: totals so far plus requests not yet done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Progress {
    pub(crate) stats: Stats,
    pub(crate) pending: u64,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} pending", self.stats, self.pending)
    }
}

/// Rewrites the status line every `every` while it changes, then writes
/// the final line once `stop` fires.
pub(crate) async fn report(
    mut out: Box<dyn Write + Send>,
    control: Arc<Control>,
    every: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = None;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let current = control.progress();
        if last == Some(current) {
            continue;
        }
        if let Err(e) = write!(out, "\r{current}").and_then(|()| out.flush()) {
            debug!("progress output failed, giving up: {e}");
            return;
        }
        last = Some(current);
    }

    if let Err(e) = writeln!(out, "\r{}", control.progress()).and_then(|()| out.flush()) {
        debug!("progress output failed: {e}");
    }
}
