use crate::models::{SessionDraft, SubjectWithTopics};

use super::calendar::CapacityCalendar;
use super::sequencer::WeightedPicker;

/// Every Nth filled slot becomes a full simulated exam.
pub const SIMULATED_CADENCE: u64 = 7;
/// Every Nth filled slot becomes an essay, when the plan includes essays.
/// Wins over the simulated cadence when both land on the same slot.
pub const ESSAY_CADENCE: u64 = 10;

/// Per-subject bookkeeping for the filler. `done` counts topics already
/// completed before this generation; `assigned` counts practice handed out
/// during this run, so final-stretch mode converges instead of hammering
/// one subject.
#[derive(Debug, Clone)]
struct SubjectLoad {
    id: i64,
    weight: i64,
    total_topics: usize,
    done_topics: usize,
    assigned: usize,
}

impl SubjectLoad {
    fn coverage(&self) -> f64 {
        if self.total_topics == 0 {
            return 1.0;
        }
        (self.done_topics + self.assigned) as f64 / self.total_topics as f64
    }
}

/// Fills every remaining open slot in the calendar with directed practice,
/// simulated exams and essays. Ordinary slots go to subjects via the same
/// weighted round-robin credits as topic sequencing; under final-stretch
/// mode the least-covered subject is served first instead.
pub fn fill_practice(
    cal: &mut CapacityCalendar,
    syllabus: &[SubjectWithTopics],
    final_stretch: bool,
    include_essay: bool,
    out: &mut Vec<SessionDraft>,
) {
    let mut loads: Vec<SubjectLoad> = syllabus
        .iter()
        .filter(|s| s.subject.weight > 0)
        .map(|s| SubjectLoad {
            id: s.subject.id,
            weight: s.subject.weight,
            total_topics: s.topics.len(),
            done_topics: s.done_count(),
            assigned: 0,
        })
        .collect();
    if loads.is_empty() {
        return;
    }

    let mut picker = WeightedPicker::new(loads.iter().map(|l| (l.id, l.weight)));
    let mut filled: u64 = 0;

    while let Some(date) = cal.claim_first_free() {
        filled += 1;
        if include_essay && filled % ESSAY_CADENCE == 0 {
            out.push(SessionDraft::essay(date));
            continue;
        }
        if filled % SIMULATED_CADENCE == 0 {
            out.push(SessionDraft::simulated(date));
            continue;
        }

        let subject_id = if final_stretch {
            pick_least_covered(&loads)
        } else {
            picker.next().unwrap_or(loads[0].id)
        };
        if let Some(load) = loads.iter_mut().find(|l| l.id == subject_id) {
            load.assigned += 1;
        }
        out.push(SessionDraft::practice(subject_id, date));
    }
}

// Lowest coverage first; heavier weight, then declared order, break ties.
fn pick_least_covered(loads: &[SubjectLoad]) -> i64 {
    let mut best = &loads[0];
    for load in &loads[1..] {
        let better = load.coverage() < best.coverage()
            || (load.coverage() == best.coverage() && load.weight > best.weight);
        if better {
            best = load;
        }
    }
    best.id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SessionKind, Subject, Topic, TopicStatus, WeeklyBudget};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn one_slot_per_day(days: i64) -> CapacityCalendar {
        let start = date(2026, 3, 2);
        CapacityCalendar::build(
            start,
            start + chrono::Duration::days(days),
            &WeeklyBudget([60; 7]),
            60,
        )
        .unwrap()
    }

    fn subject(id: i64, weight: i64, total: usize, done: usize) -> SubjectWithTopics {
        SubjectWithTopics {
            subject: Subject {
                id,
                plan_id: 1,
                name: format!("S{}", id),
                weight,
            },
            topics: (0..total)
                .map(|i| Topic {
                    id: id * 100 + i as i64,
                    subject_id: id,
                    description: format!("T{}", i),
                    weight: 1,
                    position: i as i64,
                    status: if i < done {
                        TopicStatus::Done
                    } else {
                        TopicStatus::Pending
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn fills_every_open_slot() {
        let mut cal = one_slot_per_day(19);
        let syllabus = vec![subject(1, 3, 5, 0)];
        let mut out = Vec::new();
        fill_practice(&mut cal, &syllabus, false, false, &mut out);
        assert_eq!(out.len(), 20);
        assert_eq!(cal.free_slots(), 0);
    }

    #[test]
    fn practice_follows_subject_weights() {
        let mut cal = one_slot_per_day(69); // 70 slots
        let syllabus = vec![subject(1, 5, 10, 0), subject(2, 1, 10, 0)];
        let mut out = Vec::new();
        fill_practice(&mut cal, &syllabus, false, false, &mut out);

        let heavy = out
            .iter()
            .filter(|d| d.subject_id == Some(1))
            .count() as f64;
        let light = out
            .iter()
            .filter(|d| d.subject_id == Some(2))
            .count() as f64;
        let ratio = heavy / light;
        assert!((ratio - 5.0).abs() <= 5.0 * 0.15, "ratio was {}", ratio);
    }

    #[test]
    fn simulated_cadence_replaces_plain_practice() {
        let mut cal = one_slot_per_day(13); // 14 slots
        let syllabus = vec![subject(1, 3, 5, 0)];
        let mut out = Vec::new();
        fill_practice(&mut cal, &syllabus, false, false, &mut out);

        let simulated: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, d)| d.kind == SessionKind::FullSimulated)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(simulated, vec![6, 13]); // every 7th filled slot
    }

    #[test]
    fn essay_cadence_only_with_flag_and_wins_collisions() {
        let mut cal = one_slot_per_day(69); // 70 slots; slot 70 hits both cadences
        let syllabus = vec![subject(1, 3, 5, 0)];
        let mut out = Vec::new();
        fill_practice(&mut cal, &syllabus, false, true, &mut out);

        let essays = out.iter().filter(|d| d.kind == SessionKind::Essay).count();
        assert_eq!(essays, 7); // slots 10,20,...,70
        assert_eq!(out[69].kind, SessionKind::Essay); // 70 % 7 == 0 too; essay wins

        let mut cal = one_slot_per_day(69);
        let mut out = Vec::new();
        fill_practice(&mut cal, &syllabus, false, false, &mut out);
        assert!(out.iter().all(|d| d.kind != SessionKind::Essay));
    }

    #[test]
    fn final_stretch_serves_least_covered_subject() {
        // Subject 1 is heavily weighted but nearly finished; subject 2 is
        // light but barely started. Final stretch favors subject 2.
        let mut cal = one_slot_per_day(5); // 6 slots, no cadence hits
        let syllabus = vec![subject(1, 5, 10, 9), subject(2, 1, 10, 1)];
        let mut out = Vec::new();
        fill_practice(&mut cal, &syllabus, true, false, &mut out);

        let behind = out.iter().filter(|d| d.subject_id == Some(2)).count();
        assert!(behind >= 4, "expected the lagging subject to dominate, got {}", behind);
    }

    #[test]
    fn final_stretch_converges_instead_of_repeating_one_subject() {
        let mut cal = one_slot_per_day(5);
        let syllabus = vec![subject(1, 2, 4, 0), subject(2, 2, 4, 0)];
        let mut out = Vec::new();
        fill_practice(&mut cal, &syllabus, true, false, &mut out);

        let first = out.iter().filter(|d| d.subject_id == Some(1)).count();
        let second = out.iter().filter(|d| d.subject_id == Some(2)).count();
        assert_eq!(first, 3);
        assert_eq!(second, 3);
    }

    #[test]
    fn no_subjects_fills_nothing() {
        let mut cal = one_slot_per_day(5);
        let mut out = Vec::new();
        fill_practice(&mut cal, &[], false, false, &mut out);
        assert!(out.is_empty());
        assert_eq!(cal.free_slots(), 6);
    }

    #[test]
    fn sessions_land_on_distinct_claimed_dates() {
        let mut cal = one_slot_per_day(9);
        let syllabus = vec![subject(1, 1, 2, 0)];
        let mut out = Vec::new();
        fill_practice(&mut cal, &syllabus, false, false, &mut out);
        let mut dates: Vec<NaiveDate> = out.iter().map(|d| d.date).collect();
        dates.dedup();
        assert_eq!(dates.len(), 10);
    }
}
