use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

pub const DATE_FMT: &str = "%Y-%m-%d";

// Weekly study budget in minutes, indexed Monday..Sunday.
// Stored as a JSON array so the schema stays flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyBudget(pub [u32; 7]);

impl WeeklyBudget {
    pub fn minutes_on(&self, day: Weekday) -> u32 {
        self.0[day.num_days_from_monday() as usize]
    }

    pub fn total_minutes(&self) -> u32 {
        self.0.iter().sum()
    }

    // Weekday carrying the largest budget; earliest weekday wins ties.
    // Used as the preferred day for review sessions.
    pub fn consolidation_weekday(&self) -> Weekday {
        let days = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        let mut best = Weekday::Mon;
        let mut best_minutes = self.0[0];
        for day in days.into_iter().skip(1) {
            let minutes = self.minutes_on(day);
            if minutes > best_minutes {
                best = day;
                best_minutes = minutes;
            }
        }
        best
    }

    // Parses "mon=2,wed=1.5,sat=4" where values are hours per weekday.
    // Unlisted weekdays get zero minutes.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut minutes = [0u32; 7];
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (day, hours) = part
                .split_once('=')
                .ok_or_else(|| format!("expected day=hours, got '{}'", part))?;
            let idx = match day.trim().to_lowercase().as_str() {
                "mon" | "monday" => 0,
                "tue" | "tuesday" => 1,
                "wed" | "wednesday" => 2,
                "thu" | "thursday" => 3,
                "fri" | "friday" => 4,
                "sat" | "saturday" => 5,
                "sun" | "sunday" => 6,
                other => return Err(format!("unknown weekday '{}'", other)),
            };
            let hours: f64 = hours
                .trim()
                .parse()
                .map_err(|_| format!("invalid hours '{}'", hours))?;
            if !(0.0..=24.0).contains(&hours) {
                return Err(format!("hours out of range: {}", hours));
            }
            minutes[idx] = (hours * 60.0).round() as u32;
        }
        Ok(WeeklyBudget(minutes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    NewTopic,
    Review,
    DirectedPractice,
    FullSimulated,
    Essay,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::NewTopic => "new_topic",
            SessionKind::Review => "review",
            SessionKind::DirectedPractice => "practice",
            SessionKind::FullSimulated => "simulated",
            SessionKind::Essay => "essay",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "new_topic" => Some(SessionKind::NewTopic),
            "review" => Some(SessionKind::Review),
            "practice" => Some(SessionKind::DirectedPractice),
            "simulated" => Some(SessionKind::FullSimulated),
            "essay" => Some(SessionKind::Essay),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionKind::NewTopic => "New topic",
            SessionKind::Review => "Review",
            SessionKind::DirectedPractice => "Directed practice",
            SessionKind::FullSimulated => "Simulated exam",
            SessionKind::Essay => "Essay",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Pending,
    Done,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(SessionStatus::Pending),
            "done" => Some(SessionStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicStatus {
    Pending,
    Done,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicStatus::Pending => "pending",
            TopicStatus::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(TopicStatus::Pending),
            "done" => Some(TopicStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlan {
    pub id: i64,
    pub name: String,
    pub exam_date: NaiveDate,
    pub weekly_budget: WeeklyBudget,
    pub session_minutes: u32,
    pub daily_questions: Option<i64>,
    pub include_essay: bool,
    pub final_stretch: bool,
    pub generation: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub plan_id: i64,
    pub name: String,
    pub weight: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub subject_id: i64,
    pub description: String,
    pub weight: i64,
    pub position: i64,
    pub status: TopicStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectWithTopics {
    pub subject: Subject,
    pub topics: Vec<Topic>,
}

impl SubjectWithTopics {
    pub fn pending_topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics
            .iter()
            .filter(|t| t.status == TopicStatus::Pending)
    }

    pub fn done_count(&self) -> usize {
        self.topics
            .iter()
            .filter(|t| t.status == TopicStatus::Done)
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySession {
    pub id: i64,
    pub plan_id: i64,
    pub subject_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub date: NaiveDate,
    pub kind: SessionKind,
    pub review_offset: Option<i64>,
    pub status: SessionStatus,
    pub postponed: i64,
    pub notes: Option<String>,
    pub questions_solved: i64,
    pub generation: i64,
}

// A session produced by the generator, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDraft {
    pub subject_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub date: NaiveDate,
    pub kind: SessionKind,
    pub review_offset: Option<i64>,
}

impl SessionDraft {
    pub fn new_topic(subject_id: i64, topic_id: i64, date: NaiveDate) -> Self {
        Self {
            subject_id: Some(subject_id),
            topic_id: Some(topic_id),
            date,
            kind: SessionKind::NewTopic,
            review_offset: None,
        }
    }

    pub fn review(subject_id: i64, topic_id: i64, date: NaiveDate, offset: i64) -> Self {
        Self {
            subject_id: Some(subject_id),
            topic_id: Some(topic_id),
            date,
            kind: SessionKind::Review,
            review_offset: Some(offset),
        }
    }

    pub fn practice(subject_id: i64, date: NaiveDate) -> Self {
        Self {
            subject_id: Some(subject_id),
            topic_id: None,
            date,
            kind: SessionKind::DirectedPractice,
            review_offset: None,
        }
    }

    pub fn simulated(date: NaiveDate) -> Self {
        Self {
            subject_id: None,
            topic_id: None,
            date,
            kind: SessionKind::FullSimulated,
            review_offset: None,
        }
    }

    pub fn essay(date: NaiveDate) -> Self {
        Self {
            subject_id: None,
            topic_id: None,
            date,
            kind: SessionKind::Essay,
            review_offset: None,
        }
    }
}

// A session joined with its subject/topic labels for schedule listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub session: StudySession,
    pub subject: Option<String>,
    pub topic: Option<String>,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod weekly_budget_tests {
        use super::*;

        #[test]
        fn parse_basic() {
            let b = WeeklyBudget::parse("mon=2,wed=1.5,sat=4").unwrap();
            assert_eq!(b.minutes_on(Weekday::Mon), 120);
            assert_eq!(b.minutes_on(Weekday::Tue), 0);
            assert_eq!(b.minutes_on(Weekday::Wed), 90);
            assert_eq!(b.minutes_on(Weekday::Sat), 240);
        }

        #[test]
        fn parse_full_names_and_case() {
            let b = WeeklyBudget::parse("Monday=1,SUN=2").unwrap();
            assert_eq!(b.minutes_on(Weekday::Mon), 60);
            assert_eq!(b.minutes_on(Weekday::Sun), 120);
        }

        #[test]
        fn parse_tolerates_spaces() {
            let b = WeeklyBudget::parse(" mon = 1 , tue = 2 ").unwrap();
            assert_eq!(b.minutes_on(Weekday::Mon), 60);
            assert_eq!(b.minutes_on(Weekday::Tue), 120);
        }

        #[test]
        fn parse_unknown_day_fails() {
            assert!(WeeklyBudget::parse("funday=2").is_err());
        }

        #[test]
        fn parse_bad_hours_fails() {
            assert!(WeeklyBudget::parse("mon=abc").is_err());
            assert!(WeeklyBudget::parse("mon=25").is_err());
            assert!(WeeklyBudget::parse("mon=-1").is_err());
        }

        #[test]
        fn parse_missing_equals_fails() {
            assert!(WeeklyBudget::parse("mon").is_err());
        }

        #[test]
        fn total_minutes_sums_all_days() {
            let b = WeeklyBudget::parse("mon=1,tue=1,sun=0.5").unwrap();
            assert_eq!(b.total_minutes(), 150);
        }

        #[test]
        fn consolidation_weekday_picks_largest() {
            let b = WeeklyBudget::parse("mon=1,sat=4,sun=2").unwrap();
            assert_eq!(b.consolidation_weekday(), Weekday::Sat);
        }

        #[test]
        fn consolidation_weekday_earliest_wins_ties() {
            let b = WeeklyBudget::parse("tue=2,fri=2").unwrap();
            assert_eq!(b.consolidation_weekday(), Weekday::Tue);
        }

        #[test]
        fn roundtrips_through_json() {
            let b = WeeklyBudget::parse("mon=2,sun=1").unwrap();
            let json = serde_json::to_string(&b).unwrap();
            let back: WeeklyBudget = serde_json::from_str(&json).unwrap();
            assert_eq!(b, back);
        }
    }

    mod session_kind_tests {
        use super::*;

        #[test]
        fn as_str_roundtrips() {
            for kind in [
                SessionKind::NewTopic,
                SessionKind::Review,
                SessionKind::DirectedPractice,
                SessionKind::FullSimulated,
                SessionKind::Essay,
            ] {
                assert_eq!(SessionKind::from_str(kind.as_str()), Some(kind));
            }
        }

        #[test]
        fn from_str_invalid_returns_none() {
            assert_eq!(SessionKind::from_str("lecture"), None);
            assert_eq!(SessionKind::from_str(""), None);
        }

        #[test]
        fn labels_are_human_readable() {
            assert_eq!(SessionKind::NewTopic.label(), "New topic");
            assert_eq!(SessionKind::FullSimulated.label(), "Simulated exam");
        }
    }

    mod status_tests {
        use super::*;

        #[test]
        fn session_status_roundtrips() {
            assert_eq!(
                SessionStatus::from_str("pending"),
                Some(SessionStatus::Pending)
            );
            assert_eq!(SessionStatus::from_str("DONE"), Some(SessionStatus::Done));
            assert_eq!(SessionStatus::from_str("open"), None);
        }

        #[test]
        fn topic_status_roundtrips() {
            assert_eq!(TopicStatus::from_str("pending"), Some(TopicStatus::Pending));
            assert_eq!(TopicStatus::from_str("done"), Some(TopicStatus::Done));
            assert_eq!(TopicStatus::from_str("x"), None);
        }
    }

    mod draft_tests {
        use super::*;

        fn day(d: u32) -> NaiveDate {
            NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
        }

        #[test]
        fn new_topic_links_subject_and_topic() {
            let d = SessionDraft::new_topic(1, 7, day(1));
            assert_eq!(d.subject_id, Some(1));
            assert_eq!(d.topic_id, Some(7));
            assert_eq!(d.kind, SessionKind::NewTopic);
            assert!(d.review_offset.is_none());
        }

        #[test]
        fn review_carries_offset() {
            let d = SessionDraft::review(1, 7, day(8), 7);
            assert_eq!(d.kind, SessionKind::Review);
            assert_eq!(d.review_offset, Some(7));
            assert_eq!(d.topic_id, Some(7));
        }

        #[test]
        fn simulated_and_essay_have_no_linkage() {
            assert!(SessionDraft::simulated(day(1)).subject_id.is_none());
            assert!(SessionDraft::essay(day(1)).topic_id.is_none());
        }
    }

    mod json_output_tests {
        use super::*;

        #[test]
        fn ok_wraps_data() {
            let output = JsonOutput::ok(42);
            assert!(output.success);
            assert_eq!(output.data, Some(42));
            assert!(output.error.is_none());
        }

        #[test]
        fn err_wraps_message() {
            let output = JsonOutput::<()>::err("boom");
            assert!(!output.success);
            assert!(output.data.is_none());
            assert_eq!(output.error, Some("boom".to_string()));
        }

        #[test]
        fn serializes_ok_correctly() {
            let output = JsonOutput::ok("test");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains("\"success\":true"));
            assert!(json.contains("\"data\":\"test\""));
        }
    }
}
