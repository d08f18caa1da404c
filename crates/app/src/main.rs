use std::fmt;
use std::sync::Arc;

use learn_core::LevelProgress;
use learn_core::model::{
    LessonId, SubjectId, ThresholdPolicy, TrackerSettings, UnitId, UserId,
};
use services::{
    CollectingNotifier, LessonView, Mutation, MutationOutcome, Notice, NoteStatus,
    PendingMutation, ProgressTracker,
};
use storage::repository::{CatalogRepository, Storage};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_DB_URL: &str = "sqlite://dev.sqlite3?mode=rwc";
const DEFAULT_LOG_DIRECTIVE: &str = "services=info,storage=info,app=info";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { command: &'static str, name: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidDbUrl { raw: String },
    InvalidUser { raw: String },
    MissingUser,
    InvalidPolicy { raw: String },
    InvalidId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { command, name } => {
                write!(f, "{command} requires <{name}>")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUser { raw } => {
                write!(f, "invalid user id (expected UUID): {raw}")
            }
            ArgsError::MissingUser => write!(f, "no user given (set LEARN_USER_ID or --user)"),
            ArgsError::InvalidPolicy { raw } => {
                write!(f, "invalid threshold policy (expected exact or at-least): {raw}")
            }
            ArgsError::InvalidId { raw } => write!(f, "invalid id: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Subjects,
    Units(SubjectId),
    Unit(UnitId),
    Toggle(LessonId),
    Confidence(LessonId, String),
    Note(LessonId, String),
    Achievements,
    Delete(LessonId),
}

fn parse_id<T: std::str::FromStr>(
    raw: Option<String>,
    command: &'static str,
    name: &'static str,
) -> Result<T, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingArgument { command, name })?;
    raw.parse().map_err(|_| ArgsError::InvalidId { raw })
}

impl Command {
    fn parse(positional: Vec<String>) -> Result<Self, ArgsError> {
        let mut words = positional.into_iter();
        let Some(name) = words.next() else {
            return Ok(Self::Status);
        };
        match name.as_str() {
            "status" => Ok(Self::Status),
            "subjects" => Ok(Self::Subjects),
            "units" => Ok(Self::Units(parse_id(words.next(), "units", "subject")?)),
            "unit" => Ok(Self::Unit(parse_id(words.next(), "unit", "id")?)),
            "toggle" => Ok(Self::Toggle(parse_id(words.next(), "toggle", "lesson")?)),
            "confidence" => {
                let lesson = parse_id(words.next(), "confidence", "lesson")?;
                let level = words.next().ok_or(ArgsError::MissingArgument {
                    command: "confidence",
                    name: "level",
                })?;
                Ok(Self::Confidence(lesson, level))
            }
            "note" => {
                let lesson = parse_id(words.next(), "note", "lesson")?;
                let text = words.collect::<Vec<_>>().join(" ");
                Ok(Self::Note(lesson, text))
            }
            "achievements" => Ok(Self::Achievements),
            "delete" => Ok(Self::Delete(parse_id(words.next(), "delete", "lesson")?)),
            _ => Err(ArgsError::UnknownCommand(name)),
        }
    }
}

struct Args {
    db_url: String,
    user: UserId,
    policy: ThresholdPolicy,
    json: bool,
    command: Command,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [options] <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status                         Global and per-subject XP and level (default)");
    eprintln!("  subjects                       List subjects");
    eprintln!("  units <subject>                Units of a subject in order");
    eprintln!("  unit <id>                      Lessons of a unit with their progress");
    eprintln!("  toggle <lesson>                Mark a lesson done or not done");
    eprintln!("  confidence <lesson> <level>    lost | unsure | neutral | good | confident");
    eprintln!("  note <lesson> <text...>        Replace and save a lesson note");
    eprintln!("  achievements                   Unlocked achievements");
    eprintln!("  delete <lesson>                Remove a lesson (admins only)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: {DEFAULT_DB_URL})");
    eprintln!("  --user <uuid>             Learner id");
    eprintln!("  --policy <policy>         Count threshold policy: exact | at-least");
    eprintln!("  --json                    Print results as JSON");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LEARN_DB_URL, LEARN_USER_ID, LEARN_THRESHOLD_POLICY, RUST_LOG");
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("LEARN_DB_URL")
            .ok()
            .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url);
        let mut user = std::env::var("LEARN_USER_ID").ok();
        let mut policy = std::env::var("LEARN_THRESHOLD_POLICY").ok();
        let mut json = false;
        let mut positional = Vec::new();

        let mut args = args;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => user = Some(require_value(&mut args, "--user")?),
                "--policy" => policy = Some(require_value(&mut args, "--policy")?),
                "--json" => json = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") && positional.is_empty() => {
                    return Err(ArgsError::UnknownArg(flag.to_string()));
                }
                _ => positional.push(arg),
            }
        }

        let raw_user = user.ok_or(ArgsError::MissingUser)?;
        let user = raw_user
            .parse::<UserId>()
            .map_err(|_| ArgsError::InvalidUser { raw: raw_user })?;
        let policy = match policy {
            Some(raw) => raw
                .parse::<ThresholdPolicy>()
                .map_err(|_| ArgsError::InvalidPolicy { raw })?,
            None => ThresholdPolicy::default(),
        };

        Ok(Self {
            db_url,
            user,
            policy,
            json,
            command: Command::parse(positional)?,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}?mode=rwc", absolute.display())
}

//
// ─── OUTPUT ────────────────────────────────────────────────────────────────────
//

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_level(label: &str, xp: u64) {
    let progress = LevelProgress::from_xp(xp);
    println!(
        "{label}: level {} ({xp} xp, {} to next)",
        progress.level, progress.xp_to_next
    );
}

fn print_lesson(view: &LessonView) {
    let mark = if view.completed { "x" } else { " " };
    let confidence = view
        .confidence
        .map(|c| format!(" {} {c}", c.emoji()))
        .unwrap_or_default();
    let dirty = match view.note_status {
        NoteStatus::Dirty => " (unsaved note)",
        NoteStatus::Clean => "",
    };
    println!(
        "[{mark}] {:>3}  {} ({} xp){confidence}{dirty}",
        view.lesson.id,
        view.lesson.title,
        view.lesson.xp()
    );
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        match notice {
            Notice::AchievementUnlocked { title, .. } => println!("Achievement unlocked: {title}"),
            Notice::NoteSaveFailed { message, .. } => println!("{message}"),
            Notice::MutationRolledBack { lesson_id, reason } => {
                println!("Change to lesson {lesson_id} was undone: {reason}");
            }
        }
    }
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

/// Loads the unit owning `lesson` so the tracker can mutate it.
async fn load_lesson_unit(
    tracker: &ProgressTracker,
    catalog: &dyn CatalogRepository,
    lesson: LessonId,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = catalog
        .get_lesson(lesson)
        .await?
        .ok_or_else(|| format!("lesson {lesson} not found"))?;
    tracker.load_unit(record.unit_id).await?;
    Ok(())
}

async fn report(
    pending: PendingMutation,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = pending.outcome().await?;
    if json {
        return print_json(&outcome);
    }
    match outcome {
        MutationOutcome::Persisted { .. } => println!("Saved."),
        MutationOutcome::RolledBack { reason } => println!("Not saved: {reason}"),
        MutationOutcome::Superseded => println!("Replaced by a newer change."),
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;
    let catalog = Arc::clone(&storage.catalog);
    let notifier = CollectingNotifier::new();
    let settings = TrackerSettings::default().with_threshold_policy(args.policy);
    let tracker =
        ProgressTracker::open(args.user, storage, settings, Arc::new(notifier.clone())).await?;
    info!(user = %args.user, policy = %args.policy, "tracker ready");

    match args.command {
        Command::Status => {
            let aggregates = tracker.aggregates();
            if args.json {
                return print_json(&aggregates);
            }
            let global = aggregates.global();
            print_level("Overall", global.xp);
            println!("Completed lessons: {}", global.completed);
            for subject in aggregates.subjects_sorted() {
                print_level(&format!("  {}", subject.name), subject.xp);
            }
        }
        Command::Subjects => {
            let subjects = catalog.list_subjects().await?;
            if args.json {
                return print_json(&subjects);
            }
            for subject in subjects {
                println!("{:>3}  {}", subject.id, subject.name);
            }
        }
        Command::Units(subject) => {
            let units = catalog.list_subject_units(subject).await?;
            if args.json {
                return print_json(&units);
            }
            if units.is_empty() {
                println!("No units for subject {subject}.");
            }
            for unit in units {
                println!("{:>3}  {}", unit.id, unit.title);
            }
        }
        Command::Unit(unit) => {
            let lessons = tracker.load_unit(unit).await?;
            if args.json {
                return print_json(&lessons);
            }
            if let Some(record) = tracker.current_unit() {
                println!("{}", record.title);
            }
            lessons.iter().for_each(print_lesson);
        }
        Command::Toggle(lesson) => {
            load_lesson_unit(&tracker, catalog.as_ref(), lesson).await?;
            let pending = tracker.apply(Mutation::ToggleCompletion(lesson))?;
            report(pending, args.json).await?;
        }
        Command::Confidence(lesson, level) => {
            let mutation = Mutation::change_confidence(lesson, &level)?;
            load_lesson_unit(&tracker, catalog.as_ref(), lesson).await?;
            let pending = tracker.apply(mutation)?;
            report(pending, args.json).await?;
        }
        Command::Note(lesson, text) => {
            load_lesson_unit(&tracker, catalog.as_ref(), lesson).await?;
            tracker.notes().edit(lesson, text)?;
            tracker.notes().save(lesson).await?;
            println!("Note saved.");
        }
        Command::Achievements => {
            let unlocks = tracker.unlocked_achievements().await?;
            if args.json {
                return print_json(&unlocks);
            }
            if unlocks.is_empty() {
                println!("No achievements yet.");
            }
            for unlock in unlocks {
                let title = match catalog.get_achievement(&unlock.achievement_id).await {
                    Ok(Some(def)) => def.title,
                    _ => unlock.achievement_id.to_string(),
                };
                println!("{}  {title}", unlock.unlocked_at.format("%Y-%m-%d"));
            }
        }
        Command::Delete(lesson) => {
            tracker.delete_lesson(lesson).await?;
            println!("Lesson {lesson} deleted.");
        }
    }

    if !args.json {
        print_notices(&notifier.take());
    }
    Ok(())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
