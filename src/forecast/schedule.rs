//! Issuance cycles of the weather source and the clock used to pick one.

use anyhow::{ensure, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::domain::IssuanceCycle;

/// Source of "now"; swapped for a manual clock in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed daily publication hours of the forecast provider
#[derive(Debug, Clone)]
pub struct IssuanceSchedule {
    tz: Tz,
    hours: Vec<u32>,
    availability_delay: Duration,
}

impl IssuanceSchedule {
    /// `hours` are local publication hours in `tz`; a cycle becomes fetchable
    /// `availability_delay` after its nominal start.
    pub fn new(tz: Tz, mut hours: Vec<u32>, availability_delay: Duration) -> Result<Self> {
        hours.sort_unstable();
        hours.dedup();
        ensure!(!hours.is_empty(), "issuance schedule needs at least one hour");
        ensure!(
            hours.iter().all(|h| *h < 24),
            "issuance hours must be within 0..24, got {hours:?}"
        );
        Ok(Self {
            tz,
            hours,
            availability_delay,
        })
    }

    /// KMA short-range forecast: every three hours from 02 KST, ready ten minutes later
    pub fn kma_short_range() -> Self {
        Self {
            tz: chrono_tz::Asia::Seoul,
            hours: vec![2, 5, 8, 11, 14, 17, 20, 23],
            availability_delay: Duration::minutes(10),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Most recent cycle already available at `now`
    pub fn current_cycle(&self, now: DateTime<Utc>) -> IssuanceCycle {
        let shifted = (now - self.availability_delay).with_timezone(&self.tz);
        let date = shifted.date_naive();

        match self.hours.iter().rev().find(|h| **h <= shifted.hour()) {
            Some(hour) => self.cycle_at(date, *hour),
            None => {
                let yesterday = date.pred_opt().unwrap_or(date);
                self.cycle_at(yesterday, self.hours[self.hours.len() - 1])
            }
        }
    }

    /// The cycle published right after `cycle`
    pub fn next_cycle(&self, cycle: IssuanceCycle) -> IssuanceCycle {
        let local = self.local_start(cycle);
        let date = local.date_naive();

        match self.hours.iter().find(|h| **h > local.hour()) {
            Some(hour) => self.cycle_at(date, *hour),
            None => {
                let tomorrow = date.succ_opt().unwrap_or(date);
                self.cycle_at(tomorrow, self.hours[0])
            }
        }
    }

    /// Instant the cycle after the current one becomes fetchable
    pub fn next_available_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.next_cycle(self.current_cycle(now)).start() + self.availability_delay
    }

    pub fn is_cycle_start(&self, ts: DateTime<Utc>) -> bool {
        let local = ts.with_timezone(&self.tz);
        local.minute() == 0
            && local.second() == 0
            && local.nanosecond() == 0
            && self.hours.contains(&local.hour())
    }

    /// Cycle start in the provider's local time zone
    pub fn local_start(&self, cycle: IssuanceCycle) -> DateTime<Tz> {
        cycle.start().with_timezone(&self.tz)
    }

    fn cycle_at(&self, date: NaiveDate, hour: u32) -> IssuanceCycle {
        let naive = date.and_hms_opt(hour, 0, 0).unwrap_or_default();
        let start = self
            .tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive));
        IssuanceCycle::new(start)
    }
}
