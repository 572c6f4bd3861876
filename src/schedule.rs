//! Daily trigger for the fetch-and-merge job.
//!
//! The scheduler wakes up every poll interval and runs the job once the
//! daily due time has passed. A failing or panicking job is logged and
//! followed by a fixed back-off, after which the job is still due and runs
//! again. The loop only ends on Ctrl-C, which is also honoured while a job
//! is in progress.

use crate::config::PaperSettings;
use crate::models::RunReport;
use chrono::{Days, Local, NaiveDateTime, NaiveTime};
use futures::FutureExt;
use std::any::Any;
use std::error::Error;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// The next daily `at` strictly after `now`: today if still ahead, else tomorrow.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if now < today {
        today
    } else {
        now.date()
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(at))
            .unwrap_or(today)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// When and how often to poll for the daily job.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub at: NaiveTime,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    /// Treat the job as due as soon as the scheduler starts.
    pub run_on_start: bool,
}

impl Schedule {
    pub fn from_settings(settings: &PaperSettings) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            at: settings.run_at_time()?,
            poll_interval: settings.poll_interval(),
            error_backoff: settings.error_backoff(),
            run_on_start: settings.run_on_start,
        })
    }

    /// Run `job` every day at [`Schedule::at`] on the local clock until Ctrl-C.
    pub async fn run<J, Fut>(&self, job: J)
    where
        J: FnMut() -> Fut,
        Fut: Future<Output = Result<RunReport, Box<dyn Error>>>,
    {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Unable to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        self.run_with(job, || Local::now().naive_local(), shutdown).await;
    }

    /// Scheduler loop with an explicit clock and shutdown signal.
    ///
    /// `shutdown` is polled for the whole lifetime of the loop, including
    /// while `job` runs; a job interrupted this way is dropped mid-flight.
    #[instrument(level = "info", skip_all, fields(at = %self.at))]
    pub async fn run_with<J, Fut, C, S>(&self, mut job: J, now: C, shutdown: S)
    where
        J: FnMut() -> Fut,
        Fut: Future<Output = Result<RunReport, Box<dyn Error>>>,
        C: Fn() -> NaiveDateTime,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut next_due = if self.run_on_start {
            now()
        } else {
            next_run_after(now(), self.at)
        };
        info!(%next_due, poll_secs = self.poll_interval.as_secs(), "Scheduler started");

        loop {
            let mut wait = self.poll_interval;

            if now() >= next_due {
                let outcome = tokio::select! {
                    biased;
                    _ = &mut shutdown => None,
                    caught = AssertUnwindSafe(job()).catch_unwind() => Some(caught),
                };
                let Some(caught) = outcome else {
                    info!("Interrupted during run; stopping scheduler");
                    break;
                };
                let result: Result<RunReport, Box<dyn Error>> = match caught {
                    Ok(result) => result,
                    Err(payload) => Err(format!("job panicked: {}", panic_message(&*payload)).into()),
                };

                match result {
                    Ok(report) => {
                        if report.is_success() {
                            info!(date = %report.date, "Scheduled run succeeded");
                        } else {
                            warn!(date = %report.date, "Scheduled run produced no merged edition");
                        }
                        next_due = next_run_after(now(), self.at);
                        info!(%next_due, "Next run scheduled");
                    }
                    Err(e) => {
                        // Still due; retried once the back-off elapses.
                        error!(error = %e, backoff_secs = self.error_backoff.as_secs(), "Scheduled run failed");
                        wait = self.error_backoff;
                    }
                }
            }

            let interrupted = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                _ = sleep(wait) => false,
            };
            if interrupted {
                info!("Interrupted; stopping scheduler");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::rc::Rc;

    type Outcome = Result<RunReport, Box<dyn Error>>;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_time(at(h, mi))
    }

    fn schedule(poll_secs: u64, run_on_start: bool) -> Schedule {
        Schedule {
            at: at(8, 0),
            poll_interval: Duration::from_secs(poll_secs),
            error_backoff: Duration::from_secs(300),
            run_on_start,
        }
    }

    /// Wall clock that starts at `start` and follows tokio's (paused) time.
    fn clock(start: NaiveDateTime) -> impl Fn() -> NaiveDateTime + Clone {
        let origin = tokio::time::Instant::now();
        move || start + TimeDelta::seconds(origin.elapsed().as_secs() as i64)
    }

    fn report(success: bool) -> RunReport {
        let mut report = RunReport::empty(NaiveDate::from_ymd_opt(2025, 10, 19).unwrap(), 1);
        if success {
            report.merged = Some(PathBuf::from("rmrb-2025-10-19-full.pdf"));
        }
        report
    }

    /// A job that replays `outcomes` and records the clock at each call.
    fn scripted(
        now: impl Fn() -> NaiveDateTime,
        outcomes: Vec<Outcome>,
    ) -> (Rc<RefCell<Vec<NaiveDateTime>>>, impl FnMut() -> std::future::Ready<Outcome>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut outcomes = VecDeque::from(outcomes);
        let recorded = calls.clone();
        let job = move || {
            recorded.borrow_mut().push(now());
            std::future::ready(outcomes.pop_front().unwrap_or_else(|| Ok(report(true))))
        };
        (calls, job)
    }

    #[test]
    fn test_next_run_later_today() {
        assert_eq!(next_run_after(dt(2025, 10, 19, 6, 30), at(8, 0)), dt(2025, 10, 19, 8, 0));
    }

    #[test]
    fn test_next_run_rolls_to_tomorrow() {
        assert_eq!(next_run_after(dt(2025, 10, 19, 9, 0), at(8, 0)), dt(2025, 10, 20, 8, 0));
        // Exactly at the due time counts as already run.
        assert_eq!(next_run_after(dt(2025, 10, 19, 8, 0), at(8, 0)), dt(2025, 10, 20, 8, 0));
    }

    #[test]
    fn test_next_run_crosses_month_and_year() {
        assert_eq!(next_run_after(dt(2025, 12, 31, 23, 0), at(8, 0)), dt(2026, 1, 1, 8, 0));
        assert_eq!(next_run_after(dt(2024, 2, 28, 12, 0), at(8, 0)), dt(2024, 2, 29, 8, 0));
    }

    #[test]
    fn test_schedule_from_settings() {
        let settings = PaperSettings {
            run_at: "07:45".to_string(),
            run_on_start: false,
            ..PaperSettings::default()
        };
        let schedule = Schedule::from_settings(&settings).unwrap();
        assert_eq!(schedule.at, at(7, 45));
        assert_eq!(schedule.poll_interval, Duration::from_secs(60));
        assert_eq!(schedule.error_backoff, Duration::from_secs(300));
        assert!(!schedule.run_on_start);

        let bad = PaperSettings {
            run_at: "25:00".to_string(),
            ..PaperSettings::default()
        };
        assert!(Schedule::from_settings(&bad).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_backs_off_then_retries() {
        let start = dt(2025, 10, 19, 7, 58) + TimeDelta::seconds(30);
        let now = clock(start);
        let (calls, job) = scripted(now.clone(), vec![Err("site unreachable".into()), Ok(report(true))]);

        schedule(60, false)
            .run_with(job, now, sleep(Duration::from_secs(1190)))
            .await;

        // First due poll at 08:00:30, retried once the 300 s back-off ends.
        let due = dt(2025, 10, 19, 8, 0);
        assert_eq!(
            *calls.borrow(),
            vec![due + TimeDelta::seconds(30), due + TimeDelta::seconds(330)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_run_keeps_scheduler_alive() {
        let now = clock(dt(2025, 10, 19, 7, 30));
        let (calls, job) = scripted(now.clone(), vec![Ok(report(false)), Ok(report(false))]);

        // Hourly polls for a little over a day.
        schedule(3600, false)
            .run_with(job, now, sleep(Duration::from_secs(25 * 3600 + 1800)))
            .await;

        assert_eq!(
            *calls.borrow(),
            vec![dt(2025, 10, 19, 8, 30), dt(2025, 10, 20, 8, 30)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_run_is_treated_as_failure() {
        let now = clock(dt(2025, 10, 19, 9, 0));
        let calls = Rc::new(RefCell::new(Vec::new()));
        let job = {
            let calls = calls.clone();
            let now = now.clone();
            move || {
                let attempt = calls.borrow().len();
                calls.borrow_mut().push(now());
                async move {
                    if attempt == 0 {
                        panic!("malformed page tree");
                    }
                    Ok::<_, Box<dyn Error>>(report(true))
                }
            }
        };

        schedule(60, true)
            .run_with(job, now, sleep(Duration::from_secs(590)))
            .await;

        assert_eq!(*calls.borrow(), vec![dt(2025, 10, 19, 9, 0), dt(2025, 10, 19, 9, 5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_running_job() {
        let started = tokio::time::Instant::now();
        let finished = Rc::new(Cell::new(false));
        let calls = Rc::new(Cell::new(0));
        let job = {
            let finished = finished.clone();
            let calls = calls.clone();
            move || {
                calls.set(calls.get() + 1);
                let finished = finished.clone();
                async move {
                    sleep(Duration::from_secs(3600)).await;
                    finished.set(true);
                    Ok::<_, Box<dyn Error>>(report(true))
                }
            }
        };

        schedule(60, true)
            .run_with(job, clock(dt(2025, 10, 19, 9, 0)), sleep(Duration::from_secs(10)))
            .await;

        assert_eq!(calls.get(), 1);
        assert!(!finished.get());
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ctrl_c_during_job_stops_scheduler() {
        let job = || async {
            let status = std::process::Command::new("kill")
                .args(["-INT", &std::process::id().to_string()])
                .status()?;
            assert!(status.success());
            sleep(Duration::from_secs(30)).await;
            Ok::<_, Box<dyn Error>>(report(true))
        };

        let stopped = tokio::time::timeout(Duration::from_secs(10), schedule(60, true).run(job)).await;
        assert!(stopped.is_ok(), "scheduler kept running after SIGINT");
    }
}
