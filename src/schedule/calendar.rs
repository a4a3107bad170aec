use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::error::{Result, ScheduleError};
use crate::models::WeeklyBudget;

#[derive(Debug, Clone)]
struct DayCapacity {
    date: NaiveDate,
    slots: u32,
    used: u32,
}

impl DayCapacity {
    fn free(&self) -> u32 {
        self.slots - self.used
    }
}

/// Dated capacity slots from the start date up to and including the exam
/// date. Zero-budget days are kept in the sequence so review offsets count
/// calendar days, not study days. All state is scoped to one generation or
/// replan call.
#[derive(Debug, Clone)]
pub struct CapacityCalendar {
    days: Vec<DayCapacity>,
    consolidation: Weekday,
    // First day that may still have a free slot; claims never look earlier.
    cursor: usize,
}

impl CapacityCalendar {
    pub fn build(
        start: NaiveDate,
        exam_date: NaiveDate,
        budget: &WeeklyBudget,
        session_minutes: u32,
    ) -> Result<Self> {
        if exam_date <= start {
            return Err(ScheduleError::Configuration(format!(
                "exam date {} is not after start date {}",
                exam_date, start
            )));
        }
        if session_minutes == 0 {
            return Err(ScheduleError::Configuration(
                "session duration must be positive".into(),
            ));
        }
        if budget.total_minutes() == 0 {
            return Err(ScheduleError::Configuration(
                "weekly budget sums to zero hours".into(),
            ));
        }

        let mut days = Vec::new();
        let mut date = start;
        while date <= exam_date {
            days.push(DayCapacity {
                date,
                slots: budget.minutes_on(date.weekday()) / session_minutes,
                used: 0,
            });
            date += Duration::days(1);
        }

        if days.iter().all(|d| d.slots == 0) {
            return Err(ScheduleError::Configuration(format!(
                "session duration of {} minutes exceeds every daily budget",
                session_minutes
            )));
        }

        Ok(Self {
            days,
            consolidation: budget.consolidation_weekday(),
            cursor: 0,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.days[0].date
    }

    pub fn exam_date(&self) -> NaiveDate {
        self.days[self.days.len() - 1].date
    }

    pub fn consolidation_weekday(&self) -> Weekday {
        self.consolidation
    }

    pub fn total_slots(&self) -> u32 {
        self.days.iter().map(|d| d.slots).sum()
    }

    pub fn free_slots(&self) -> u32 {
        self.days.iter().map(|d| d.free()).sum()
    }

    fn index_of(&self, date: NaiveDate) -> Option<usize> {
        if date < self.start() || date > self.exam_date() {
            return None;
        }
        Some((date - self.start()).num_days() as usize)
    }

    /// Claims the earliest free slot in the whole calendar.
    pub fn claim_first_free(&mut self) -> Option<NaiveDate> {
        while self.cursor < self.days.len() {
            if self.days[self.cursor].free() > 0 {
                self.days[self.cursor].used += 1;
                return Some(self.days[self.cursor].date);
            }
            self.cursor += 1;
        }
        None
    }

    /// Claims a slot on the given date if one is free.
    pub fn claim_on(&mut self, date: NaiveDate) -> bool {
        match self.index_of(date) {
            Some(i) if self.days[i].free() > 0 => {
                self.days[i].used += 1;
                true
            }
            _ => false,
        }
    }

    /// Places a review due on `due` for a topic introduced on `anchor`.
    /// Prefers the latest consolidation-weekday occurrence in (anchor, due],
    /// then falls back to the nearest free day scanning backwards from the
    /// due date. Never places at or before the anchor, never after the due.
    pub fn place_review(&mut self, anchor: NaiveDate, due: NaiveDate) -> Option<NaiveDate> {
        let mut date = due;
        while date > anchor {
            if date.weekday() == self.consolidation {
                if self.claim_on(date) {
                    return Some(date);
                }
                break;
            }
            date -= Duration::days(1);
        }

        let mut date = due;
        while date > anchor {
            if self.claim_on(date) {
                return Some(date);
            }
            date -= Duration::days(1);
        }
        None
    }

    /// Marks capacity on `date` as already taken by existing sessions.
    /// Used by the replanner to honor the schedule it is packing into.
    pub fn occupy(&mut self, date: NaiveDate, count: u32) {
        if let Some(i) = self.index_of(date) {
            self.days[i].used = (self.days[i].used + count).min(self.days[i].slots);
        }
    }
}
