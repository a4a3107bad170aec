use chrono::NaiveDate;

use crate::db::Database;
use crate::error::{Result, ScheduleError};
use crate::models::SessionKind;

use super::calendar::CapacityCalendar;
use super::lock::GenerationLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ReplanOutcome {
    pub moved: usize,
    pub unplaceable: usize,
}

/// Moves past-due, still-pending sessions into the nearest future capacity.
/// Review sessions go first, most overdue first, so the oldest retention
/// debt is paid before anything else. Each moved session keeps its kind and
/// topic linkage and gains one postponement. Sessions with no future slot
/// before the exam date stay where they are and are reported, never dropped.
pub fn replan_overdue(
    db: &Database,
    locks: &GenerationLocks,
    plan_id: i64,
    today: NaiveDate,
) -> Result<ReplanOutcome> {
    let _guard = locks.acquire(plan_id)?;
    let plan = db
        .get_plan(plan_id)?
        .ok_or(ScheduleError::PlanNotFound(plan_id))?;

    let mut overdue = db.pending_sessions_before(plan_id, today)?;
    if overdue.is_empty() {
        return Ok(ReplanOutcome {
            moved: 0,
            unplaceable: 0,
        });
    }
    overdue.sort_by_key(|s| (s.kind != SessionKind::Review, s.date, s.id));

    let mut cal = match CapacityCalendar::build(
        today,
        plan.exam_date,
        &plan.weekly_budget,
        plan.session_minutes,
    ) {
        Ok(cal) => cal,
        // Exam already reached or budget gone: nothing can be placed.
        Err(ScheduleError::Configuration(_)) => {
            return Ok(ReplanOutcome {
                moved: 0,
                unplaceable: overdue.len(),
            });
        }
        Err(e) => return Err(e),
    };

    // Capacity already scheduled from today on stays claimed, and slots
    // taken earlier in this run are not handed out twice.
    for (date, count) in db.schedule_capacity_on(plan_id, today)? {
        cal.occupy(date, count);
    }

    let mut moved = 0;
    let mut unplaceable = 0;
    for session in &overdue {
        match cal.claim_first_free() {
            Some(date) => {
                if db.update_session_date(session.id, date, 1)? {
                    moved += 1;
                }
            }
            None => unplaceable += 1,
        }
    }

    Ok(ReplanOutcome { moved, unplaceable })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SessionDraft, SessionStatus, WeeklyBudget};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (Database, GenerationLocks) {
        let db = Database::open(":memory:").unwrap();
        db.init().unwrap();
        (db, GenerationLocks::new())
    }

    // One 60-minute slot per day through the exam.
    fn seeded_plan(db: &Database, exam: NaiveDate) -> (i64, i64, i64) {
        let plan_id = db
            .create_plan("exam", exam, &WeeklyBudget([60; 7]), 60, None, false, false)
            .unwrap();
        let subject_id = db.add_subject(plan_id, "Math", 3).unwrap();
        let topic_id = db.add_topic(subject_id, "Fractions", 1).unwrap();
        (plan_id, subject_id, topic_id)
    }

    #[test]
    fn nothing_overdue_moves_nothing() {
        let (db, locks) = setup();
        let (plan_id, subject_id, _) = seeded_plan(&db, date(2026, 4, 1));
        db.replace_sessions(plan_id, &[SessionDraft::practice(subject_id, date(2026, 3, 20))])
            .unwrap();

        let outcome = replan_overdue(&db, &locks, plan_id, date(2026, 3, 10)).unwrap();
        assert_eq!(outcome, ReplanOutcome { moved: 0, unplaceable: 0 });
    }

    #[test]
    fn overdue_sessions_move_to_first_free_future_slots() {
        let (db, locks) = setup();
        let (plan_id, subject_id, topic_id) = seeded_plan(&db, date(2026, 4, 1));
        db.replace_sessions(
            plan_id,
            &[
                SessionDraft::new_topic(subject_id, topic_id, date(2026, 3, 2)),
                SessionDraft::practice(subject_id, date(2026, 3, 4)),
            ],
        )
        .unwrap();

        let today = date(2026, 3, 10);
        let outcome = replan_overdue(&db, &locks, plan_id, today).unwrap();
        assert_eq!(outcome, ReplanOutcome { moved: 2, unplaceable: 0 });

        let schedule = db.list_schedule(plan_id, None, None).unwrap();
        let dates: Vec<NaiveDate> = schedule.iter().map(|e| e.session.date).collect();
        assert_eq!(dates, vec![date(2026, 3, 10), date(2026, 3, 11)]);
        assert!(schedule.iter().all(|e| e.session.postponed == 1));
        assert!(schedule.iter().all(|e| e.session.status == SessionStatus::Pending));
    }

    #[test]
    fn preserves_kind_and_topic_linkage() {
        let (db, locks) = setup();
        let (plan_id, subject_id, topic_id) = seeded_plan(&db, date(2026, 4, 1));
        db.replace_sessions(
            plan_id,
            &[SessionDraft::review(subject_id, topic_id, date(2026, 3, 5), 14)],
        )
        .unwrap();

        replan_overdue(&db, &locks, plan_id, date(2026, 3, 10)).unwrap();
        let moved = &db.list_schedule(plan_id, None, None).unwrap()[0].session;
        assert_eq!(moved.kind, SessionKind::Review);
        assert_eq!(moved.topic_id, Some(topic_id));
        assert_eq!(moved.review_offset, Some(14));
    }

    #[test]
    fn most_overdue_reviews_claim_capacity_first() {
        let (db, locks) = setup();
        let (plan_id, subject_id, topic_id) = seeded_plan(&db, date(2026, 3, 12));
        // Exam close: only three future slots (10th, 11th, 12th).
        db.replace_sessions(
            plan_id,
            &[
                SessionDraft::practice(subject_id, date(2026, 3, 1)),
                SessionDraft::review(subject_id, topic_id, date(2026, 3, 6), 7),
                SessionDraft::review(subject_id, topic_id, date(2026, 3, 3), 7),
            ],
        )
        .unwrap();

        let outcome = replan_overdue(&db, &locks, plan_id, date(2026, 3, 10)).unwrap();
        assert_eq!(outcome, ReplanOutcome { moved: 3, unplaceable: 0 });

        let schedule = db.list_schedule(plan_id, None, None).unwrap();
        // Oldest review lands earliest, the practice session last.
        assert_eq!(schedule[0].session.kind, SessionKind::Review);
        assert_eq!(schedule[0].session.date, date(2026, 3, 10));
        assert_eq!(schedule[2].session.kind, SessionKind::DirectedPractice);
    }

    #[test]
    fn honors_capacity_already_scheduled_in_the_future() {
        let (db, locks) = setup();
        let (plan_id, subject_id, _) = seeded_plan(&db, date(2026, 3, 12));
        db.replace_sessions(
            plan_id,
            &[
                SessionDraft::practice(subject_id, date(2026, 3, 1)),
                SessionDraft::practice(subject_id, date(2026, 3, 10)),
                SessionDraft::practice(subject_id, date(2026, 3, 11)),
            ],
        )
        .unwrap();

        replan_overdue(&db, &locks, plan_id, date(2026, 3, 10)).unwrap();
        let schedule = db.list_schedule(plan_id, None, None).unwrap();
        let dates: Vec<NaiveDate> = schedule.iter().map(|e| e.session.date).collect();
        // The overdue session takes the only day still open.
        assert!(dates.contains(&date(2026, 3, 12)));
        assert_eq!(dates.iter().filter(|d| **d == date(2026, 3, 10)).count(), 1);
    }

    #[test]
    fn reports_unplaceable_when_no_capacity_remains() {
        let (db, locks) = setup();
        let (plan_id, subject_id, _) = seeded_plan(&db, date(2026, 3, 12));
        db.replace_sessions(
            plan_id,
            &[
                SessionDraft::practice(subject_id, date(2026, 3, 1)),
                SessionDraft::practice(subject_id, date(2026, 3, 2)),
                SessionDraft::practice(subject_id, date(2026, 3, 10)),
                SessionDraft::practice(subject_id, date(2026, 3, 11)),
                SessionDraft::practice(subject_id, date(2026, 3, 12)),
            ],
        )
        .unwrap();

        let outcome = replan_overdue(&db, &locks, plan_id, date(2026, 3, 10)).unwrap();
        assert_eq!(outcome, ReplanOutcome { moved: 0, unplaceable: 2 });
        // Unplaceable sessions stay in place rather than disappear.
        let schedule = db.list_schedule(plan_id, None, None).unwrap();
        assert_eq!(schedule[0].session.date, date(2026, 3, 1));
        assert_eq!(schedule[0].session.postponed, 0);
    }

    #[test]
    fn exam_in_the_past_reports_everything_unplaceable() {
        let (db, locks) = setup();
        let (plan_id, subject_id, _) = seeded_plan(&db, date(2026, 3, 12));
        db.replace_sessions(plan_id, &[SessionDraft::practice(subject_id, date(2026, 3, 1))])
            .unwrap();

        let outcome = replan_overdue(&db, &locks, plan_id, date(2026, 3, 20)).unwrap();
        assert_eq!(outcome, ReplanOutcome { moved: 0, unplaceable: 1 });
    }

    #[test]
    fn done_sessions_are_never_revisited() {
        let (db, locks) = setup();
        let (plan_id, subject_id, _) = seeded_plan(&db, date(2026, 4, 1));
        db.replace_sessions(plan_id, &[SessionDraft::practice(subject_id, date(2026, 3, 1))])
            .unwrap();
        let id = db.list_schedule(plan_id, None, None).unwrap()[0].session.id;
        db.complete_session(id, None).unwrap();

        let outcome = replan_overdue(&db, &locks, plan_id, date(2026, 3, 10)).unwrap();
        assert_eq!(outcome, ReplanOutcome { moved: 0, unplaceable: 0 });
        let session = db.get_session(id).unwrap().unwrap();
        assert_eq!(session.date, date(2026, 3, 1));
    }

    #[test]
    fn missing_plan_is_an_error() {
        let (db, locks) = setup();
        let err = replan_overdue(&db, &locks, 42, date(2026, 3, 10)).unwrap_err();
        assert!(matches!(err, ScheduleError::PlanNotFound(42)));
    }

    #[test]
    fn held_lock_rejects_the_run() {
        let (db, locks) = setup();
        let (plan_id, _, _) = seeded_plan(&db, date(2026, 4, 1));
        let _guard = locks.acquire(plan_id).unwrap();
        let err = replan_overdue(&db, &locks, plan_id, date(2026, 3, 10)).unwrap_err();
        assert!(matches!(err, ScheduleError::Busy(_)));
    }
}
