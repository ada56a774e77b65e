// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// A recurring job's firing pattern. `Cron` is evaluated with a real cron
/// expression parser rather than falling back to a fixed daily stub — an
/// invalid expression is rejected at creation/update time instead of
/// silently degrading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Interval { minutes: i64 },
    Daily { hour: u32, minute: u32 },
    /// `day_of_week` follows `chrono`'s `num_days_from_sunday` convention:
    /// 0 = Sunday .. 6 = Saturday.
    Weekly { day_of_week: u32, hour: u32, minute: u32 },
    Cron { expression: String },
}

impl Schedule {
    /// Reject the schedule up front so bad input never reaches the timer
    /// wheel. Only `Cron` can fail validation today.
    pub fn validate(&self) -> Result<()> {
        if let Schedule::Cron { expression } = self {
            expression
                .parse::<cron::Schedule>()
                .map_err(|e| SchedulerError::InvalidSchedule(format!("{expression}: {e}")))?;
        }
        Ok(())
    }

    pub fn next_run_after(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        match self {
            Schedule::Interval { minutes } => Ok(now + Duration::minutes(*minutes)),
            Schedule::Daily { hour, minute } => Ok(next_daily(now, *hour, *minute)),
            Schedule::Weekly { day_of_week, hour, minute } => Ok(next_weekly(now, *day_of_week, *hour, *minute)),
            Schedule::Cron { expression } => {
                let schedule: cron::Schedule = expression
                    .parse()
                    .map_err(|e| SchedulerError::InvalidSchedule(format!("{expression}: {e}")))?;
                schedule
                    .after(&now)
                    .next()
                    .ok_or_else(|| SchedulerError::InvalidSchedule("no future occurrence".into()))
            }
        }
    }
}

/// Resolve a naive local wall-clock time to a concrete instant, picking the
/// earlier of the two candidates on a DST-ambiguous clock turn-back.
fn local_naive_to_utc(naive: chrono::NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| Local.from_local_datetime(&naive).latest())
        .expect("local datetime resolves to an instant")
        .with_timezone(&Utc)
}

fn next_daily(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let now_local = now.with_timezone(&Local);
    let today = local_naive_to_utc(now_local.date_naive().and_hms_opt(hour, minute, 0).expect("valid hour/minute"));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

fn next_weekly(now: DateTime<Utc>, day_of_week: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    let now_local = now.with_timezone(&Local);
    let now_dow = now_local.weekday().num_days_from_sunday();
    let mut days_to_add = (day_of_week as i64 - now_dow as i64).rem_euclid(7);
    let mut candidate = local_naive_to_utc(
        (now_local.date_naive() + Duration::days(days_to_add))
            .and_hms_opt(hour, minute, 0)
            .expect("valid hour/minute"),
    );
    if days_to_add == 0 && candidate <= now {
        days_to_add = 7;
        candidate = local_naive_to_utc(
            (now_local.date_naive() + Duration::days(days_to_add))
                .and_hms_opt(hour, minute, 0)
                .expect("valid hour/minute"),
        );
    }
    candidate
}
