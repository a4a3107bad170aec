mod db;
mod error;
mod models;
mod schedule;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use db::Database;
use models::{JsonOutput, WeeklyBudget};
use schedule::GenerationLocks;

const DEFAULT_DB_NAME: &str = "examplan.db";

#[derive(Parser)]
#[command(name = "examplan")]
#[command(about = "A study schedule planner with weighted sequencing and spaced repetition")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage study plans
    #[command(subcommand)]
    Plan(PlanCommands),

    /// Manage subjects within a plan
    #[command(subcommand)]
    Subject(SubjectCommands),

    /// Manage topics within a subject
    #[command(subcommand)]
    Topic(TopicCommands),

    /// Generate the full schedule for a plan (replaces the current one)
    Generate {
        /// Plan ID
        plan_id: i64,
    },

    /// Move overdue pending sessions into future capacity
    Replan {
        /// Plan ID
        plan_id: i64,
    },

    /// Show the generated schedule
    Schedule {
        /// Plan ID
        plan_id: i64,

        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Mark a session as done
    Done {
        /// Session ID
        session_id: i64,

        /// Questions solved during the session
        #[arg(long, short)]
        questions: Option<i64>,
    },

    /// Attach notes to a session
    Note {
        /// Session ID
        session_id: i64,

        /// Note text
        text: String,
    },

    /// Show plan progress statistics
    Stats {
        /// Plan ID
        plan_id: i64,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Create a study plan
    Add {
        /// Plan name
        name: String,

        /// Exam date (YYYY-MM-DD)
        #[arg(long)]
        exam_date: NaiveDate,

        /// Weekly hours, e.g. "mon=2,wed=1.5,sat=4"
        #[arg(long)]
        hours: String,

        /// Session duration in minutes
        #[arg(long, default_value_t = 50)]
        session_minutes: u32,

        /// Daily question goal
        #[arg(long)]
        questions: Option<i64>,

        /// Include essay sessions in the practice fill
        #[arg(long)]
        essay: bool,

        /// Bias practice toward least-covered subjects
        #[arg(long)]
        final_stretch: bool,
    },

    /// List all plans
    List,

    /// Show plan settings
    Show {
        /// Plan ID
        id: i64,
    },

    /// Change plan settings
    Set {
        /// Plan ID
        id: i64,

        /// Exam date (YYYY-MM-DD)
        #[arg(long)]
        exam_date: Option<NaiveDate>,

        /// Weekly hours, e.g. "mon=2,wed=1.5,sat=4"
        #[arg(long)]
        hours: Option<String>,

        /// Session duration in minutes
        #[arg(long)]
        session_minutes: Option<u32>,

        /// Daily question goal
        #[arg(long)]
        questions: Option<i64>,

        /// Include essay sessions: true or false
        #[arg(long)]
        essay: Option<bool>,

        /// Final-stretch mode: true or false
        #[arg(long)]
        final_stretch: Option<bool>,
    },

    /// Delete a plan and everything under it
    Delete {
        /// Plan ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum SubjectCommands {
    /// Add a subject to a plan
    Add {
        /// Plan ID
        plan_id: i64,

        /// Subject name
        name: String,

        /// Priority weight, 1-5
        #[arg(long, short, default_value_t = 3)]
        weight: i64,
    },

    /// List a plan's subjects
    List {
        /// Plan ID
        plan_id: i64,
    },

    /// Delete a subject and its topics
    Delete {
        /// Subject ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum TopicCommands {
    /// Add a topic to a subject
    Add {
        /// Subject ID
        subject_id: i64,

        /// Topic description
        description: String,

        /// Priority weight, 1-5
        #[arg(long, short, default_value_t = 1)]
        weight: i64,
    },

    /// List a subject's topics
    List {
        /// Subject ID
        subject_id: i64,
    },

    /// Delete a topic
    Delete {
        /// Topic ID
        id: i64,
    },
}

fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("EXAMPLAN_DB") {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("examplan");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

fn check_weight(weight: i64) -> Result<(), String> {
    if (1..=5).contains(&weight) {
        Ok(())
    } else {
        Err(format!("weight must be between 1 and 5, got {}", weight))
    }
}

fn fmt_minutes(minutes: u32) -> String {
    format!("{}h{:02}", minutes / 60, minutes % 60)
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = get_db_path();
    let db = Database::open(&db_path)?;
    let locks = GenerationLocks::new();
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Init => {
            db.init()?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Plan(plan_cmd) => match plan_cmd {
            PlanCommands::Add {
                name,
                exam_date,
                hours,
                session_minutes,
                questions,
                essay,
                final_stretch,
            } => {
                let budget = WeeklyBudget::parse(&hours)?;
                let id = db.create_plan(
                    &name,
                    exam_date,
                    &budget,
                    session_minutes,
                    questions,
                    essay,
                    final_stretch,
                )?;
                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                            "id": id,
                            "name": name
                        })))?
                    );
                } else {
                    println!("Created plan '{}' with ID: {}", name, id);
                }
            }

            PlanCommands::List => {
                let plans = db.list_plans()?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&plans))?);
                } else if plans.is_empty() {
                    println!("No plans found.");
                } else {
                    println!("{:<5} {:<30} {:<12} GEN", "ID", "NAME", "EXAM");
                    println!("{}", "-".repeat(55));
                    for plan in plans {
                        println!(
                            "{:<5} {:<30} {:<12} {}",
                            plan.id,
                            truncate(&plan.name, 28),
                            plan.exam_date,
                            plan.generation
                        );
                    }
                }
            }

            PlanCommands::Show { id } => {
                if let Some(plan) = db.get_plan(id)? {
                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::ok(&plan))?);
                    } else {
                        println!("Plan: {}", plan.name);
                        println!("ID: {}", plan.id);
                        println!("Exam date: {}", plan.exam_date);
                        println!("Session duration: {} min", plan.session_minutes);
                        let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
                        let hours: Vec<String> = days
                            .iter()
                            .zip(plan.weekly_budget.0.iter())
                            .filter(|(_, m)| **m > 0)
                            .map(|(d, m)| format!("{} {}", d, fmt_minutes(*m)))
                            .collect();
                        println!(
                            "Weekly hours: {}",
                            if hours.is_empty() {
                                "-".to_string()
                            } else {
                                hours.join(", ")
                            }
                        );
                        if let Some(q) = plan.daily_questions {
                            println!("Daily question goal: {}", q);
                        }
                        println!("Essay sessions: {}", if plan.include_essay { "yes" } else { "no" });
                        println!(
                            "Final stretch: {}",
                            if plan.final_stretch { "yes" } else { "no" }
                        );
                        println!("Generation: {}", plan.generation);
                    }
                } else if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Plan not found"))?
                    );
                } else {
                    println!("Plan not found.");
                }
            }

            PlanCommands::Set {
                id,
                exam_date,
                hours,
                session_minutes,
                questions,
                essay,
                final_stretch,
            } => {
                let budget = hours.as_deref().map(WeeklyBudget::parse).transpose()?;
                if db.update_plan(
                    id,
                    exam_date,
                    budget,
                    session_minutes,
                    questions,
                    essay,
                    final_stretch,
                )? {
                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                    } else {
                        println!("Plan {} updated. Run 'examplan generate {}' to rebuild the schedule.", id, id);
                    }
                } else if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Plan not found"))?
                    );
                } else {
                    println!("Plan not found.");
                }
            }

            PlanCommands::Delete { id } => {
                if db.delete_plan(id)? {
                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                    } else {
                        println!("Plan {} deleted.", id);
                    }
                } else if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Plan not found"))?
                    );
                } else {
                    println!("Plan not found.");
                }
            }
        },

        Commands::Subject(subject_cmd) => match subject_cmd {
            SubjectCommands::Add {
                plan_id,
                name,
                weight,
            } => {
                check_weight(weight)?;
                let id = db.add_subject(plan_id, &name, weight)?;
                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                            "id": id,
                            "name": name
                        })))?
                    );
                } else {
                    println!("Added subject '{}' with ID: {}", name, id);
                }
            }

            SubjectCommands::List { plan_id } => {
                let subjects = db.list_subjects(plan_id)?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&subjects))?);
                } else if subjects.is_empty() {
                    println!("No subjects found.");
                } else {
                    println!("{:<5} {:<40} WEIGHT", "ID", "NAME");
                    println!("{}", "-".repeat(55));
                    for subject in subjects {
                        println!(
                            "{:<5} {:<40} {}",
                            subject.id,
                            truncate(&subject.name, 38),
                            subject.weight
                        );
                    }
                }
            }

            SubjectCommands::Delete { id } => {
                if db.delete_subject(id)? {
                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                    } else {
                        println!("Subject {} deleted.", id);
                    }
                } else if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Subject not found"))?
                    );
                } else {
                    println!("Subject not found.");
                }
            }
        },

        Commands::Topic(topic_cmd) => match topic_cmd {
            TopicCommands::Add {
                subject_id,
                description,
                weight,
            } => {
                check_weight(weight)?;
                let id = db.add_topic(subject_id, &description, weight)?;
                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::ok(serde_json::json!({ "id": id })))?
                    );
                } else {
                    println!("Added topic with ID: {}", id);
                }
            }

            TopicCommands::List { subject_id } => {
                let topics = db.list_topics(subject_id)?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&topics))?);
                } else if topics.is_empty() {
                    println!("No topics found.");
                } else {
                    println!("{:<5} {:<50} {:<7} STATUS", "ID", "DESCRIPTION", "WEIGHT");
                    println!("{}", "-".repeat(75));
                    for topic in topics {
                        println!(
                            "{:<5} {:<50} {:<7} {}",
                            topic.id,
                            truncate(&topic.description, 48),
                            topic.weight,
                            topic.status.as_str()
                        );
                    }
                }
            }

            TopicCommands::Delete { id } => {
                if db.delete_topic(id)? {
                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                    } else {
                        println!("Topic {} deleted.", id);
                    }
                } else if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Topic not found"))?
                    );
                } else {
                    println!("Topic not found.");
                }
            }
        },

        Commands::Generate { plan_id } => {
            let outcome = schedule::generate(&db, &locks, plan_id, today)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&outcome))?);
            } else {
                println!(
                    "Generated {} sessions in {} ms.",
                    outcome.sessions, outcome.elapsed_ms
                );
                if outcome.topics_unplaced > 0 {
                    println!(
                        "Warning: {} topics did not fit before the exam date.",
                        outcome.topics_unplaced
                    );
                }
                if outcome.reviews_unplaced > 0 {
                    println!(
                        "Warning: {} reviews found no free slot before their due date.",
                        outcome.reviews_unplaced
                    );
                }
            }
        }

        Commands::Replan { plan_id } => {
            let outcome = schedule::replan_overdue(&db, &locks, plan_id, today)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&outcome))?);
            } else {
                println!("Moved {} overdue sessions.", outcome.moved);
                if outcome.unplaceable > 0 {
                    println!(
                        "{} sessions could not be placed before the exam date and were left as is.",
                        outcome.unplaceable
                    );
                }
            }
        }

        Commands::Schedule { plan_id, from, to } => {
            let entries = db.list_schedule(plan_id, from, to)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&entries))?);
            } else if entries.is_empty() {
                println!("No sessions in range. Run 'examplan generate {}' first.", plan_id);
            } else {
                println!(
                    "{:<5} {:<12} {:<18} {:<20} {:<30} STATUS",
                    "ID", "DATE", "TYPE", "SUBJECT", "TOPIC"
                );
                println!("{}", "-".repeat(95));
                for entry in entries {
                    let kind = if let Some(off) = entry.session.review_offset {
                        format!("{} (+{}d)", entry.session.kind.label(), off)
                    } else {
                        entry.session.kind.label().to_string()
                    };
                    println!(
                        "{:<5} {:<12} {:<18} {:<20} {:<30} {}",
                        entry.session.id,
                        entry.session.date,
                        kind,
                        truncate(entry.subject.as_deref().unwrap_or("-"), 18),
                        truncate(entry.topic.as_deref().unwrap_or("-"), 28),
                        entry.session.status.as_str()
                    );
                }
            }
        }

        Commands::Done {
            session_id,
            questions,
        } => {
            if db.complete_session(session_id, questions)? {
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                } else {
                    println!("Session {} marked done.", session_id);
                }
            } else if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::<()>::err(
                        "Session not found or already done"
                    ))?
                );
            } else {
                println!("Session not found or already done.");
            }
        }

        Commands::Note { session_id, text } => {
            if db.set_session_notes(session_id, &text)? {
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                } else {
                    println!("Notes saved for session {}.", session_id);
                }
            } else if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::<()>::err("Session not found"))?
                );
            } else {
                println!("Session not found.");
            }
        }

        Commands::Stats { plan_id } => {
            let stats = db.stats(plan_id)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&stats))?);
            } else {
                println!("=== Plan {} ===", plan_id);
                println!(
                    "Sessions: {}/{} done",
                    stats.sessions_done, stats.sessions_total
                );
                println!("Topics: {}/{} done", stats.topics_done, stats.topics_total);
                println!("Questions solved: {}", stats.questions_solved);
            }
        }
    }

    Ok(())
}

// Counts chars, not bytes, so accented names never split mid-character.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
