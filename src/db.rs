use chrono::NaiveDate;
use rusqlite::{params, Connection, Result};
use std::path::Path;

use crate::models::{
    ScheduleEntry, SessionDraft, SessionKind, SessionStatus, StudyPlan, StudySession, Subject,
    SubjectWithTopics, Topic, TopicStatus, WeeklyBudget, DATE_FMT,
};

pub struct Database {
    conn: Connection,
}

fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

fn date_from_sql(idx: usize, raw: String) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn budget_from_sql(idx: usize, raw: String) -> Result<WeeklyBudget> {
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// Shared row mapper for SELECTs that list the session columns in schema order.
fn session_from_row(row: &rusqlite::Row) -> Result<StudySession> {
    let date_raw: String = row.get(4)?;
    let kind_raw: String = row.get(5)?;
    let status_raw: String = row.get(7)?;
    Ok(StudySession {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        subject_id: row.get(2)?,
        topic_id: row.get(3)?,
        date: date_from_sql(4, date_raw)?,
        kind: SessionKind::from_str(&kind_raw).unwrap_or(SessionKind::DirectedPractice),
        review_offset: row.get(6)?,
        status: SessionStatus::from_str(&status_raw).unwrap_or(SessionStatus::Pending),
        postponed: row.get(8)?,
        notes: row.get(9)?,
        questions_solved: row.get(10)?,
        generation: row.get(11)?,
    })
}

const SESSION_COLUMNS: &str = "s.id, s.plan_id, s.subject_id, s.topic_id, s.date, s.kind, \
     s.review_offset, s.status, s.postponed, s.notes, s.questions_solved, s.generation";

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                exam_date TEXT NOT NULL,
                weekly_budget TEXT NOT NULL,
                session_minutes INTEGER NOT NULL,
                daily_questions INTEGER,
                include_essay INTEGER NOT NULL DEFAULT 0,
                final_stretch INTEGER NOT NULL DEFAULT 0,
                generation INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS subjects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                weight INTEGER NOT NULL CHECK(weight BETWEEN 1 AND 5),
                FOREIGN KEY (plan_id) REFERENCES plans(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id INTEGER NOT NULL,
                description TEXT NOT NULL,
                weight INTEGER NOT NULL DEFAULT 1 CHECK(weight BETWEEN 1 AND 5),
                position INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'done')),
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_id INTEGER NOT NULL,
                subject_id INTEGER,
                topic_id INTEGER,
                date TEXT NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN ('new_topic', 'review', 'practice', 'simulated', 'essay')),
                review_offset INTEGER,
                status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'done')),
                postponed INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                questions_solved INTEGER NOT NULL DEFAULT 0,
                generation INTEGER NOT NULL,
                FOREIGN KEY (plan_id) REFERENCES plans(id) ON DELETE CASCADE,
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE SET NULL,
                FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_subjects_plan ON subjects(plan_id);
            CREATE INDEX IF NOT EXISTS idx_topics_subject ON topics(subject_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_plan_gen_date ON sessions(plan_id, generation, date);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
            "#,
        )
    }

    // Plan operations
    #[allow(clippy::too_many_arguments)]
    pub fn create_plan(
        &self,
        name: &str,
        exam_date: NaiveDate,
        budget: &WeeklyBudget,
        session_minutes: u32,
        daily_questions: Option<i64>,
        include_essay: bool,
        final_stretch: bool,
    ) -> Result<i64> {
        let budget_json = serde_json::to_string(budget).expect("budget serializes");
        self.conn.execute(
            r#"
            INSERT INTO plans (name, exam_date, weekly_budget, session_minutes,
                               daily_questions, include_essay, final_stretch)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                name,
                date_to_sql(exam_date),
                budget_json,
                session_minutes,
                daily_questions,
                include_essay,
                final_stretch
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_plan(&self, id: i64) -> Result<Option<StudyPlan>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, exam_date, weekly_budget, session_minutes, daily_questions,
                   include_essay, final_stretch, generation, created_at, updated_at
            FROM plans
            WHERE id = ?1
            "#,
        )?;

        let plan = stmt.query_row(params![id], Self::plan_from_row);
        match plan {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn list_plans(&self) -> Result<Vec<StudyPlan>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, exam_date, weekly_budget, session_minutes, daily_questions,
                   include_essay, final_stretch, generation, created_at, updated_at
            FROM plans
            ORDER BY exam_date
            "#,
        )?;
        let rows = stmt.query_map([], Self::plan_from_row)?;
        rows.collect()
    }

    fn plan_from_row(row: &rusqlite::Row) -> Result<StudyPlan> {
        let exam_raw: String = row.get(2)?;
        let budget_raw: String = row.get(3)?;
        Ok(StudyPlan {
            id: row.get(0)?,
            name: row.get(1)?,
            exam_date: date_from_sql(2, exam_raw)?,
            weekly_budget: budget_from_sql(3, budget_raw)?,
            session_minutes: row.get(4)?,
            daily_questions: row.get(5)?,
            include_essay: row.get(6)?,
            final_stretch: row.get(7)?,
            generation: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    /// Applies the provided settings, leaving the rest untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn update_plan(
        &self,
        id: i64,
        exam_date: Option<NaiveDate>,
        budget: Option<WeeklyBudget>,
        session_minutes: Option<u32>,
        daily_questions: Option<i64>,
        include_essay: Option<bool>,
        final_stretch: Option<bool>,
    ) -> Result<bool> {
        let Some(plan) = self.get_plan(id)? else {
            return Ok(false);
        };
        let budget = budget.unwrap_or(plan.weekly_budget);
        let budget_json = serde_json::to_string(&budget).expect("budget serializes");
        self.conn.execute(
            r#"
            UPDATE plans
            SET exam_date = ?1, weekly_budget = ?2, session_minutes = ?3,
                daily_questions = ?4, include_essay = ?5, final_stretch = ?6,
                updated_at = datetime('now')
            WHERE id = ?7
            "#,
            params![
                date_to_sql(exam_date.unwrap_or(plan.exam_date)),
                budget_json,
                session_minutes.unwrap_or(plan.session_minutes),
                daily_questions.or(plan.daily_questions),
                include_essay.unwrap_or(plan.include_essay),
                final_stretch.unwrap_or(plan.final_stretch),
                id
            ],
        )?;
        Ok(true)
    }

    pub fn delete_plan(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM plans WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Subject operations
    pub fn add_subject(&self, plan_id: i64, name: &str, weight: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO subjects (plan_id, name, weight) VALUES (?1, ?2, ?3)",
            params![plan_id, name, weight],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_subjects(&self, plan_id: i64) -> Result<Vec<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, plan_id, name, weight FROM subjects WHERE plan_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![plan_id], |row| {
            Ok(Subject {
                id: row.get(0)?,
                plan_id: row.get(1)?,
                name: row.get(2)?,
                weight: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    pub fn delete_subject(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM subjects WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Topic operations
    pub fn add_topic(&self, subject_id: i64, description: &str, weight: i64) -> Result<i64> {
        let position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM topics WHERE subject_id = ?1",
            params![subject_id],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO topics (subject_id, description, weight, position) VALUES (?1, ?2, ?3, ?4)",
            params![subject_id, description, weight, position],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_topics(&self, subject_id: i64) -> Result<Vec<Topic>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, subject_id, description, weight, position, status
            FROM topics
            WHERE subject_id = ?1
            ORDER BY position
            "#,
        )?;
        let rows = stmt.query_map(params![subject_id], Self::topic_from_row)?;
        rows.collect()
    }

    fn topic_from_row(row: &rusqlite::Row) -> Result<Topic> {
        let status_raw: String = row.get(5)?;
        Ok(Topic {
            id: row.get(0)?,
            subject_id: row.get(1)?,
            description: row.get(2)?,
            weight: row.get(3)?,
            position: row.get(4)?,
            status: TopicStatus::from_str(&status_raw).unwrap_or(TopicStatus::Pending),
        })
    }

    pub fn delete_topic(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM topics WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// The syllabus view the generator consumes: every subject of the plan
    /// with its topics in declared order.
    pub fn subjects_with_topics(&self, plan_id: i64) -> Result<Vec<SubjectWithTopics>> {
        let subjects = self.list_subjects(plan_id)?;
        let mut out = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let topics = self.list_topics(subject.id)?;
            out.push(SubjectWithTopics { subject, topics });
        }
        Ok(out)
    }

    // Session operations
    //
    // Generation never leaves a half-written or empty schedule behind: the
    // new session set is inserted under generation N+1, the plan pointer is
    // flipped, and only then is generation N deleted, all in one transaction.
    pub fn replace_sessions(&self, plan_id: i64, drafts: &[SessionDraft]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let generation: i64 = tx.query_row(
            "SELECT generation FROM plans WHERE id = ?1",
            params![plan_id],
            |row| row.get(0),
        )?;
        let next_gen = generation + 1;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO sessions (plan_id, subject_id, topic_id, date, kind, review_offset, generation)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for draft in drafts {
                stmt.execute(params![
                    plan_id,
                    draft.subject_id,
                    draft.topic_id,
                    date_to_sql(draft.date),
                    draft.kind.as_str(),
                    draft.review_offset,
                    next_gen
                ])?;
            }
        }
        tx.execute(
            "UPDATE plans SET generation = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![next_gen, plan_id],
        )?;
        tx.execute(
            "DELETE FROM sessions WHERE plan_id = ?1 AND generation < ?2",
            params![plan_id, next_gen],
        )?;
        tx.commit()?;
        Ok(drafts.len())
    }

    pub fn get_session(&self, id: i64) -> Result<Option<StudySession>> {
        let query = format!("SELECT {} FROM sessions s WHERE s.id = ?1", SESSION_COLUMNS);
        let mut stmt = self.conn.prepare(&query)?;
        let session = stmt.query_row(params![id], session_from_row);
        match session {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Still-pending sessions of the current generation dated strictly
    /// before `before`, oldest first.
    pub fn pending_sessions_before(
        &self,
        plan_id: i64,
        before: NaiveDate,
    ) -> Result<Vec<StudySession>> {
        let query = format!(
            r#"
            SELECT {}
            FROM sessions s
            JOIN plans p ON p.id = s.plan_id AND s.generation = p.generation
            WHERE s.plan_id = ?1 AND s.date < ?2 AND s.status = 'pending'
            ORDER BY s.date, s.id
            "#,
            SESSION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![plan_id, date_to_sql(before)], session_from_row)?;
        rows.collect()
    }

    /// Moves a pending session and bumps its postponement count. Done
    /// sessions are never touched.
    pub fn update_session_date(
        &self,
        session_id: i64,
        new_date: NaiveDate,
        postpone_delta: i64,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            r#"
            UPDATE sessions
            SET date = ?1, postponed = postponed + ?2
            WHERE id = ?3 AND status = 'pending'
            "#,
            params![date_to_sql(new_date), postpone_delta, session_id],
        )?;
        Ok(rows > 0)
    }

    /// How many current-generation sessions already sit on each date from
    /// `from` onwards, regardless of status. The replanner loads this into
    /// its calendar before packing overdue work.
    pub fn schedule_capacity_on(
        &self,
        plan_id: i64,
        from: NaiveDate,
    ) -> Result<Vec<(NaiveDate, u32)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.date, COUNT(*)
            FROM sessions s
            JOIN plans p ON p.id = s.plan_id AND s.generation = p.generation
            WHERE s.plan_id = ?1 AND s.date >= ?2
            GROUP BY s.date
            "#,
        )?;
        let rows = stmt.query_map(params![plan_id, date_to_sql(from)], |row| {
            let raw: String = row.get(0)?;
            Ok((date_from_sql(0, raw)?, row.get::<_, u32>(1)?))
        })?;
        rows.collect()
    }

    pub fn list_schedule(
        &self,
        plan_id: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<ScheduleEntry>> {
        let mut query = format!(
            r#"
            SELECT {}, sub.name, t.description
            FROM sessions s
            JOIN plans p ON p.id = s.plan_id AND s.generation = p.generation
            LEFT JOIN subjects sub ON sub.id = s.subject_id
            LEFT JOIN topics t ON t.id = s.topic_id
            WHERE s.plan_id = ?1
            "#,
            SESSION_COLUMNS
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(plan_id)];
        if let Some(from) = from {
            params_vec.push(Box::new(date_to_sql(from)));
            query.push_str(&format!(" AND s.date >= ?{}", params_vec.len()));
        }
        if let Some(to) = to {
            params_vec.push(Box::new(date_to_sql(to)));
            query.push_str(&format!(" AND s.date <= ?{}", params_vec.len()));
        }
        query.push_str(" ORDER BY s.date, s.id");

        let mut stmt = self.conn.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok(ScheduleEntry {
                session: session_from_row(row)?,
                subject: row.get(12)?,
                topic: row.get(13)?,
            })
        })?;
        rows.collect()
    }

    /// Pending -> Done, once. Completing a NewTopic session also marks its
    /// topic done. Returns false when the session is missing or already done.
    pub fn complete_session(&self, session_id: i64, questions: Option<i64>) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let session = {
            let query = format!("SELECT {} FROM sessions s WHERE s.id = ?1", SESSION_COLUMNS);
            let mut stmt = tx.prepare(&query)?;
            match stmt.query_row(params![session_id], session_from_row) {
                Ok(s) => s,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(false),
                Err(e) => return Err(e),
            }
        };
        if session.status == SessionStatus::Done {
            return Ok(false);
        }
        tx.execute(
            r#"
            UPDATE sessions
            SET status = 'done', questions_solved = questions_solved + ?1
            WHERE id = ?2
            "#,
            params![questions.unwrap_or(0), session_id],
        )?;
        if session.kind == SessionKind::NewTopic {
            if let Some(topic_id) = session.topic_id {
                tx.execute(
                    "UPDATE topics SET status = 'done' WHERE id = ?1",
                    params![topic_id],
                )?;
            }
        }
        tx.commit()?;
        Ok(true)
    }

    pub fn set_session_notes(&self, session_id: i64, notes: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sessions SET notes = ?1 WHERE id = ?2",
            params![notes, session_id],
        )?;
        Ok(rows > 0)
    }

    pub fn stats(&self, plan_id: i64) -> Result<PlanStats> {
        let (sessions_total, sessions_done, questions_solved): (i64, i64, i64) =
            self.conn.query_row(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(s.status = 'done'), 0),
                       COALESCE(SUM(s.questions_solved), 0)
                FROM sessions s
                JOIN plans p ON p.id = s.plan_id AND s.generation = p.generation
                WHERE s.plan_id = ?1
                "#,
                params![plan_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
        let (topics_total, topics_done): (i64, i64) = self.conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(t.status = 'done'), 0)
            FROM topics t
            JOIN subjects sub ON sub.id = t.subject_id
            WHERE sub.plan_id = ?1
            "#,
            params![plan_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(PlanStats {
            sessions_total,
            sessions_done,
            topics_total,
            topics_done,
            questions_solved,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PlanStats {
    pub sessions_total: i64,
    pub sessions_done: i64,
    pub topics_total: i64,
    pub topics_done: i64,
    pub questions_solved: i64,
}
