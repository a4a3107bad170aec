use chrono::{Duration, NaiveDate};

use crate::models::SessionDraft;

use super::calendar::CapacityCalendar;

/// Spaced-repetition checkpoints, in calendar days after a topic is
/// introduced.
pub const REVIEW_OFFSETS: [i64; 3] = [7, 14, 28];

/// Schedules the review sessions anchored to a NewTopic placement on
/// `anchor`. Offsets falling past the exam date are dropped, not clamped.
/// Returns how many reviews fit the date window but found no free slot;
/// those count toward the generation deficit.
pub fn inject_reviews(
    cal: &mut CapacityCalendar,
    subject_id: i64,
    topic_id: i64,
    anchor: NaiveDate,
    out: &mut Vec<SessionDraft>,
) -> u32 {
    let mut unplaced = 0;
    for offset in REVIEW_OFFSETS {
        let due = anchor + Duration::days(offset);
        if due > cal.exam_date() {
            continue;
        }
        match cal.place_review(anchor, due) {
            Some(date) => out.push(SessionDraft::review(subject_id, topic_id, date, offset)),
            None => unplaced += 1,
        }
    }
    unplaced
}
