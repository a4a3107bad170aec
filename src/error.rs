use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The plan cannot produce any schedule: bad date range, zero budget,
    /// empty syllabus. Nothing is written when this is returned.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("plan {0} not found")]
    PlanNotFound(i64),

    /// Another generation or replan holds the lock for this plan. Retryable.
    #[error("plan {0} is busy with another generation or replan")]
    Busy(i64),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
