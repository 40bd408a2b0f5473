//! Daemon scheduling.
//!
//! A [`Schedule`] is either a cron expression evaluated in a timezone or
//! a fixed interval. Each cycle is awaited before the next fire time is
//! computed, so a job never runs concurrently with itself, and fire times
//! that passed while a slow cycle was running are skipped rather than
//! queued.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::signal::ShutdownToken;

/// When the daemon reconciles.
#[derive(Debug, Clone)]
pub enum Schedule {
    Cron {
        expression: String,
        schedule: cron::Schedule,
        timezone: Tz,
    },
    Every(Duration),
}

impl Schedule {
    /// Parse a cron expression in `timezone` (an IANA name such as
    /// `Europe/Paris`).
    ///
    /// Five-field expressions (`min hour dom month dow`) run at second 0;
    /// six and seven-field expressions carry their own seconds column.
    pub fn cron(expression: &str, timezone: &str) -> Result<Self> {
        let expression = expression.trim();
        let fields = expression.split_whitespace().count();
        let full = if fields == 5 {
            format!("0 {}", expression)
        } else {
            expression.to_string()
        };

        let schedule = cron::Schedule::from_str(&full)
            .map_err(|e| anyhow::anyhow!("Invalid cron schedule '{}': {}", expression, e))?;
        let timezone: Tz = timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid cron timezone '{}': {}", timezone, e))?;

        Ok(Schedule::Cron {
            expression: expression.to_string(),
            schedule,
            timezone,
        })
    }

    pub fn every(interval: Duration) -> Self {
        Schedule::Every(interval)
    }

    /// The first fire time strictly after `now`, with the wait until it.
    fn next_with_delay(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Duration)> {
        match self {
            Schedule::Cron { schedule, timezone, .. } => {
                let next = schedule
                    .after(&now.with_timezone(timezone))
                    .next()?
                    .with_timezone(&Utc);
                let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
                Some((next, delay))
            }
            Schedule::Every(interval) => {
                let next = now.checked_add_signed(chrono::Duration::from_std(*interval).ok()?)?;
                Some((next, *interval))
            }
        }
    }

    /// The first fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_with_delay(now).map(|(next, _)| next)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Cron { expression, timezone, .. } => write!(f, "cron '{}' ({})", expression, timezone),
            Schedule::Every(interval) => write!(f, "every {}", format_interval(*interval)),
        }
    }
}

fn format_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    match secs {
        s if s > 0 && s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s > 0 && s % 3600 == 0 => format!("{}h", s / 3600),
        s if s > 0 && s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    schedule: Schedule,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(schedule: Schedule, run_on_start: bool) -> Self {
        Self { schedule, run_on_start }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Wall-clock time of the first scheduled run after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.next_after(now)
    }

    /// Run `job` on schedule until `shutdown` is cancelled.
    ///
    /// A failed cycle is logged and the loop carries on. Shutdown is only
    /// observed between cycles, so an in-flight cycle always completes.
    /// Returns the number of cycles run.
    pub async fn run<F, Fut>(&self, job_name: &str, mut job: F, shutdown: &ShutdownToken) -> u64
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut cycles = 0;
        let mut run_now = self.run_on_start;

        loop {
            if !run_now {
                let Some((next, delay)) = self.schedule.next_with_delay(Utc::now()) else {
                    warn!("{} has no upcoming run for {}", job_name, self.schedule);
                    break;
                };
                info!("Next {} at {}", job_name, next.to_rfc3339());

                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            run_now = false;

            cycles += 1;
            let started = Instant::now();
            match job().await {
                Ok(()) => info!(
                    "{} cycle {} finished in {:.1}s",
                    job_name,
                    cycles,
                    started.elapsed().as_secs_f64()
                ),
                Err(e) => error!("{} cycle {} failed: {:#}", job_name, cycles, e),
            }

            if shutdown.is_cancelled() {
                break;
            }
        }

        info!("{} stopped after {} cycles", job_name, cycles);
        cycles
    }
}
