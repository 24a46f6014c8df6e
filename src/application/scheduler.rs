//! Daily trigger for the `schedule` command

use chrono::{DateTime, Duration as ChronoDuration, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// First instant strictly after `now` whose wall-clock time is `send_time`
#[must_use]
pub fn next_run(now: DateTime<Tz>, send_time: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();

    loop {
        let local = date.and_time(send_time);
        let candidate = match tz.from_local_datetime(&local) {
            LocalResult::Single(at) => Some(at),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            // Wall-clock time skipped by a DST jump: fire an hour later.
            LocalResult::None => tz.from_local_datetime(&(local + ChronoDuration::hours(1))).earliest(),
        };

        if let Some(at) = candidate.filter(|at| *at > now) {
            return at;
        }
        date = date.succ_opt().unwrap_or(date + ChronoDuration::days(1));
    }
}

/// Sleep until each daily `send_time` and run `job`, until `cancel` fires
pub async fn run_daily<F, Fut>(send_time: NaiveTime, timezone: Tz, cancel: CancellationToken, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let now = Utc::now().with_timezone(&timezone);
        let next = next_run(now, send_time);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!("⏰ Next digest at {} (in {}m)", next.format("%d/%m/%Y %H:%M %Z"), wait.as_secs() / 60);

        tokio::select! {
            () = cancel.cancelled() => {
                info!("🛑 Scheduler stopped");
                return;
            }
            () = sleep(wait) => {}
        }

        job().await;

        if cancel.is_cancelled() {
            info!("🛑 Scheduler stopped");
            return;
        }
    }
}
