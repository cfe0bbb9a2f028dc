use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc};
use grc_common::Schedule;

const WEEKLY_HOUR: u32 = 9;

pub trait ScheduleExt {
    /// Next time the scheduler should pick the agent up, `None` for manual agents
    fn next_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

impl ScheduleExt for Schedule {
    fn next_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Manual => None,
            Schedule::Hourly => {
                let top_of_hour = at_hour(now, now.hour())?;
                Some(top_of_hour + Duration::hours(1))
            }
            Schedule::Daily6am => next_daily(now, 6),
            Schedule::Daily9am => next_daily(now, 9),
            Schedule::WeeklyMonday => {
                let offset = (7 - now.weekday().num_days_from_monday() as i64) % 7;
                let candidate = at_hour(now, WEEKLY_HOUR)? + Duration::days(offset);
                if candidate > now {
                    Some(candidate)
                } else {
                    Some(candidate + Duration::days(7))
                }
            }
        }
    }
}

fn at_hour(now: DateTime<Utc>, hour: u32) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    Some(Utc.from_utc_datetime(&now.date_naive().and_time(time)))
}

fn next_daily(now: DateTime<Utc>, hour: u32) -> Option<DateTime<Utc>> {
    let today = at_hour(now, hour)?;
    if today > now {
        Some(today)
    } else {
        Some(today + Duration::days(1))
    }
}
