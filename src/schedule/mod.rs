pub mod calendar;
pub mod lock;
pub mod practice;
pub mod replan;
pub mod reviews;
pub mod sequencer;

use std::time::Instant;

use chrono::NaiveDate;

use crate::db::Database;
use crate::error::{Result, ScheduleError};
use crate::models::SessionDraft;

pub use lock::GenerationLocks;
pub use replan::{replan_overdue, ReplanOutcome};

/// What a generation run produced. Capacity running out is not an error;
/// the deficit fields say how much syllabus did not fit before the exam.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct GenerationOutcome {
    pub sessions: usize,
    pub topics_unplaced: usize,
    pub reviews_unplaced: u32,
    pub elapsed_ms: u128,
}

/// Builds the full schedule for a plan and replaces its session set in one
/// transaction. Pipeline: capacity calendar, weighted topic sequencing,
/// review injection per placement, then practice fill of whatever remains.
pub fn generate(
    db: &Database,
    locks: &GenerationLocks,
    plan_id: i64,
    today: NaiveDate,
) -> Result<GenerationOutcome> {
    let started = Instant::now();
    let _guard = locks.acquire(plan_id)?;

    let plan = db
        .get_plan(plan_id)?
        .ok_or(ScheduleError::PlanNotFound(plan_id))?;
    let syllabus = db.subjects_with_topics(plan_id)?;
    if syllabus.iter().map(|s| s.subject.weight).sum::<i64>() == 0 {
        return Err(ScheduleError::Configuration(
            "plan has no subjects to schedule".into(),
        ));
    }

    let mut cal = calendar::CapacityCalendar::build(
        today,
        plan.exam_date,
        &plan.weekly_budget,
        plan.session_minutes,
    )?;

    let mut drafts: Vec<SessionDraft> = Vec::new();
    let mut sequencer = sequencer::TopicSequencer::new(&syllabus);
    let mut reviews_unplaced = 0;
    let mut topics_unplaced = 0;

    while let Some(pick) = sequencer.next() {
        match cal.claim_first_free() {
            Some(date) => {
                drafts.push(SessionDraft::new_topic(pick.subject_id, pick.topic_id, date));
                reviews_unplaced +=
                    reviews::inject_reviews(&mut cal, pick.subject_id, pick.topic_id, date, &mut drafts);
            }
            None => {
                // This pick and everything still queued will not fit.
                topics_unplaced = 1 + sequencer.remaining();
                break;
            }
        }
    }

    practice::fill_practice(
        &mut cal,
        &syllabus,
        plan.final_stretch,
        plan.include_essay,
        &mut drafts,
    );

    drafts.sort_by(|a, b| a.date.cmp(&b.date));
    let sessions = db.replace_sessions(plan_id, &drafts)?;

    Ok(GenerationOutcome {
        sessions,
        topics_unplaced,
        reviews_unplaced,
        elapsed_ms: started.elapsed().as_millis(),
    })
}
