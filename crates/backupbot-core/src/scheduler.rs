//! Cron scheduler for backup runs.
//!
//! - One job per `archive.backup_times` entry, evaluated in `archive.timezone`
//! - Standard 5-field cron syntax (min hour dom mon dow) plus `@daily`-style
//!   descriptors
//! - An invalid expression is logged and skipped; the others still run
//! - Polls the config file's mtime and re-registers jobs when it changes

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    backup::BackupSpec,
    config::ConfigStore,
    domain::{RunRequest, Trigger},
    formatting::escape_html,
    pipeline::PipelineHandle,
    Error, Result,
};

const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: Arc<ConfigStore>,
    pipeline: PipelineHandle,
    state: tokio::sync::Mutex<SchedulerState>,
}

#[derive(Default)]
struct SchedulerState {
    jobs: Vec<JobEntry>,
    timezone: Option<Tz>,
    watcher: Option<JoinHandle<()>>,
    watcher_cancel: Option<CancellationToken>,
    last_modified: Option<std::time::SystemTime>,
}

struct JobEntry {
    raw: String,
    expr: CronExpr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(config: Arc<ConfigStore>, pipeline: PipelineHandle) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                pipeline,
                state: tokio::sync::Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// (Re)register one job per configured expression. Returns how many started.
    pub async fn start(&self) -> Result<usize> {
        self.stop_jobs_only().await;

        let cfg = self.inner.config.snapshot();
        let tz = cfg.timezone()?;

        if cfg.archive.backup_times.is_empty() {
            tracing::info!("No backup schedules configured");
        }

        let mut jobs = Vec::new();
        for raw in cfg.archive.backup_times.iter() {
            let expr = match CronExpr::parse(raw) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(time = %raw, error = %e, "Failed to add cron job");
                    continue;
                }
            };

            let cancel = CancellationToken::new();
            let scheduler = self.clone();
            let raw_clone = raw.clone();
            let expr_for_task = expr.clone();
            let cancel_clone = cancel.clone();
            let handle = tokio::spawn(async move {
                scheduler
                    .job_loop(raw_clone, expr_for_task, tz, cancel_clone)
                    .await;
            });

            tracing::info!(time = %raw, timezone = %tz, "Cron job added");
            jobs.push(JobEntry {
                raw: raw.clone(),
                expr,
                cancel,
                handle,
            });
        }

        let loaded = jobs.len();
        let mut st = self.inner.state.lock().await;
        st.jobs = jobs;
        st.timezone = Some(tz);
        Ok(loaded)
    }

    /// Start the config watcher (polling mtime), if not already running.
    pub async fn ensure_watcher(&self) {
        if self.inner.config.path().is_none() {
            return;
        }

        let mut st = self.inner.state.lock().await;
        if st.watcher.is_some() {
            return;
        }
        st.last_modified = self.inner.config.modified();

        let tok = CancellationToken::new();
        st.watcher_cancel = Some(tok.clone());
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(WATCH_INTERVAL);
            loop {
                tokio::select! {
                  _ = tok.cancelled() => break,
                  _ = tick.tick() => {
                    if scheduler.config_changed().await {
                      tracing::info!("Detected config change, reloading");
                      sleep(Duration::from_millis(100)).await;
                      if let Err(e) = scheduler.reload().await {
                        tracing::warn!(
                          error = %e,
                          "Config reload failed, keeping previous schedules"
                        );
                      }
                    }
                  }
                }
            }
        });

        st.watcher = Some(handle);
        tracing::info!("Config watcher started");
    }

    pub async fn stop(&self) {
        let mut st = self.inner.state.lock().await;

        if let Some(tok) = st.watcher_cancel.take() {
            tok.cancel();
        }
        st.watcher.take();

        for job in st.jobs.drain(..) {
            job.cancel.cancel();
            job.handle.abort();
        }
    }

    /// Swap in the config from disk and re-register jobs.
    pub async fn reload(&self) -> Result<usize> {
        self.inner.config.reload()?;
        self.start().await
    }

    #[cfg(test)]
    async fn job_count(&self) -> usize {
        self.inner.state.lock().await.jobs.len()
    }

    pub async fn status_html(&self) -> String {
        let st = self.inner.state.lock().await;
        if st.jobs.is_empty() {
            return "No scheduled backups".to_string();
        }
        let tz = st.timezone.unwrap_or(chrono_tz::UTC);
        let now = Utc::now().with_timezone(&tz);

        let mut lines = vec![format!(
            "<b>Scheduled backups ({})</b>, timezone {}",
            st.jobs.len(),
            escape_html(tz.name())
        )];
        for job in st.jobs.iter() {
            let next = job
                .expr
                .next_after(&now)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            lines.push(format!(
                "• <code>{}</code>: next at {}",
                escape_html(&job.raw),
                escape_html(&next)
            ));
        }
        lines.join("\n")
    }

    async fn stop_jobs_only(&self) {
        let mut st = self.inner.state.lock().await;
        for job in st.jobs.drain(..) {
            job.cancel.cancel();
            job.handle.abort();
        }
    }

    async fn config_changed(&self) -> bool {
        let Some(modified) = self.inner.config.modified() else {
            return false;
        };
        let mut st = self.inner.state.lock().await;
        match st.last_modified {
            Some(prev) if modified <= prev => false,
            _ => {
                st.last_modified = Some(modified);
                true
            }
        }
    }

    async fn job_loop(&self, raw: String, expr: CronExpr, tz: Tz, cancel: CancellationToken) {
        loop {
            let now = Utc::now().with_timezone(&tz);
            let Some(next) = expr.next_after(&now) else {
                tracing::warn!(time = %raw, "Cron job has no next run, stopping");
                break;
            };

            let dur = (next.with_timezone(&Utc) - Utc::now())
                .to_std()
                .unwrap_or(Duration::from_secs(0));

            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = sleep(dur) => {
                let cfg = self.inner.config.snapshot();
                let request = RunRequest {
                    target: BackupSpec::default_target(&cfg),
                    trigger: Trigger::Schedule { expr: raw.clone() },
                };
                match self.inner.pipeline.submit(request).await {
                  Ok(()) => tracing::info!(time = %raw, "Cron job fired"),
                  Err(e) => {
                    tracing::error!(time = %raw, error = %e, "Cron job could not submit backup");
                    break;
                  }
                }
              }
            }
        }
    }
}

// === Cron expression engine ===

#[derive(Clone, Debug)]
pub struct CronExpr {
    min: Field,
    hour: Field,
    dom: Field,
    mon: Field,
    dow: Field,
}

#[derive(Clone, Debug)]
struct Field {
    min: u32,
    max: u32,
    any: bool,
    allowed: Vec<bool>, // index = value
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        let expanded = match expr {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other if other.starts_with('@') => {
                return Err(Error::Config(format!("unknown descriptor: {other}")));
            }
            other => other,
        };

        let parts = expanded.split_whitespace().collect::<Vec<_>>();
        if parts.len() != 5 {
            return Err(Error::Config(format!(
                "expected 5 fields, got {}",
                parts.len()
            )));
        }

        Ok(Self {
            min: Field::parse(parts[0], 0, 59, false)?,
            hour: Field::parse(parts[1], 0, 23, false)?,
            dom: Field::parse(parts[2], 1, 31, false)?,
            mon: Field::parse(parts[3], 1, 12, false)?,
            dow: Field::parse(parts[4], 0, 6, true)?,
        })
    }

    pub fn matches<Z: TimeZone>(&self, dt: &DateTime<Z>) -> bool {
        if !self.min.contains(dt.minute()) {
            return false;
        }
        if !self.hour.contains(dt.hour()) {
            return false;
        }
        if !self.mon.contains(dt.month()) {
            return false;
        }

        // Standard cron semantics: if both DOM and DOW are restricted, match when EITHER matches.
        let dom_match = self.dom.contains(dt.day());
        let dow_match = self.dow.contains(dt.weekday().num_days_from_sunday());

        match (self.dom.any, self.dow.any) {
            (true, true) => true,
            (true, false) => dow_match,
            (false, true) => dom_match,
            (false, false) => dom_match || dow_match,
        }
    }

    /// First matching minute strictly after `now`, in `now`'s timezone.
    ///
    /// Steps through UTC minutes so wall-clock times skipped by a DST jump are
    /// simply never produced.
    pub fn next_after<Z: TimeZone>(&self, now: &DateTime<Z>) -> Option<DateTime<Z>> {
        let tz = now.timezone();
        let mut t = now.with_timezone(&Utc) + chrono::Duration::minutes(1);
        t = t.with_second(0)?.with_nanosecond(0)?;

        // Hard cap to avoid infinite loops for impossible expressions.
        let max_iters = 366usize * 24 * 60;
        for _ in 0..max_iters {
            let local = t.with_timezone(&tz);
            if self.matches(&local) {
                return Some(local);
            }
            t += chrono::Duration::minutes(1);
        }
        None
    }
}

impl Field {
    fn parse(raw: &str, min: u32, max: u32, allow_7_as_0: bool) -> Result<Self> {
        let raw = raw.trim();
        if raw == "*" || raw == "?" {
            return Ok(Self {
                min,
                max,
                any: true,
                allowed: vec![true; (max + 1) as usize],
            });
        }

        let mut allowed = vec![false; (max + 1) as usize];
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::Config(format!("empty list item in {raw}")));
            }

            let (base, step) = if let Some((a, b)) = part.split_once('/') {
                let step: u32 = b
                    .trim()
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid step: {b}")))?;
                if step == 0 {
                    return Err(Error::Config("step must be > 0".to_string()));
                }
                (a.trim(), Some(step))
            } else {
                (part, None)
            };

            let (start, end) = if base == "*" {
                (min, max)
            } else if let Some((a, b)) = base.split_once('-') {
                (
                    parse_u32(a.trim(), allow_7_as_0)?,
                    parse_u32(b.trim(), allow_7_as_0)?,
                )
            } else {
                let a = parse_u32(base, allow_7_as_0)?;
                if step.is_some() {
                    (a, max)
                } else {
                    (a, a)
                }
            };

            if start < min || end > max || start > end {
                return Err(Error::Config(format!(
                    "value out of range {min}-{max}: {base}"
                )));
            }

            let step = step.unwrap_or(1);
            let mut v = start;
            while v <= end {
                allowed[v as usize] = true;
                v = v.saturating_add(step);
            }
        }

        let any = (min..=max).all(|v| allowed[v as usize]);

        Ok(Self {
            min,
            max,
            any,
            allowed,
        })
    }

    fn contains(&self, v: u32) -> bool {
        if v < self.min || v > self.max {
            return false;
        }
        self.allowed.get(v as usize).copied().unwrap_or(false)
    }
}

fn parse_u32(s: &str, allow_7_as_0: bool) -> Result<u32> {
    let mut v: u32 = s
        .parse()
        .map_err(|_| Error::Config(format!("invalid number: {s}")))?;
    if allow_7_as_0 && v == 7 {
        v = 0;
    }
    Ok(v)
}
