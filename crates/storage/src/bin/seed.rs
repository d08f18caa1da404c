use std::fmt;

use learn_core::model::{
    AchievementDefinition, AchievementId, LessonId, LessonRecord, Profile, SubjectId,
    SubjectRecord, UnitId, UnitRecord, UserId, builtin,
};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    user: Option<UserId>,
    username: Option<String>,
    admin: bool,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidUser { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUser { raw } => {
                write!(f, "invalid --user value (expected UUID): {raw}")
            }
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

fn parse_user(raw: String) -> Result<UserId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidUser { raw })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("LEARN_DB_URL").unwrap_or_else(|_| "sqlite://dev.sqlite3?mode=rwc".into());
        let mut user = std::env::var("LEARN_USER_ID")
            .ok()
            .map(parse_user)
            .transpose()?;
        let mut username = None;
        let mut admin = false;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--user" => {
                    user = Some(parse_user(require_value(&mut args, "--user")?)?);
                }
                "--username" => {
                    username = Some(require_value(&mut args, "--username")?);
                }
                "--admin" => admin = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user,
            username,
            admin,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://dev.sqlite3?mode=rwc)");
    eprintln!("  --user <uuid>             Also write a profile for this user");
    eprintln!("  --username <name>         Username stored on the profile");
    eprintln!("  --admin                   Grant the administrator capability");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  LEARN_DB_URL, LEARN_USER_ID");
}

struct SampleUnit {
    id: u64,
    subject: u64,
    title: &'static str,
    achievement: Option<(&'static str, &'static str)>,
    lessons: &'static [(&'static str, u32)],
}

const SUBJECTS: [(u64, &str); 2] = [(1, "Mathematics"), (2, "German")];

const UNITS: [SampleUnit; 3] = [
    SampleUnit {
        id: 1,
        subject: 1,
        title: "Fractions",
        achievement: Some(("fractions_master", "Fraction Master")),
        lessons: &[("What is a fraction", 10), ("Equivalent fractions", 15), ("Adding fractions", 20)],
    },
    SampleUnit {
        id: 2,
        subject: 1,
        title: "Geometry basics",
        achievement: None,
        lessons: &[("Points and lines", 10), ("Angles", 15)],
    },
    SampleUnit {
        id: 3,
        subject: 2,
        title: "Greetings",
        achievement: Some(("greetings_done", "Guten Tag!")),
        lessons: &[("Hallo and Tschuss", 10), ("Guten Morgen", 10), ("Danke and Bitte", 10)],
    },
];

async fn seed_achievements(storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let builtins = [
        (builtin::FIRST_SPARK, "First Spark", "Complete your first lesson"),
        (builtin::FIVE_LESSONS, "High Five", "Complete five lessons"),
        (builtin::TEN_LESSONS, "Perfect Ten", "Complete ten lessons"),
    ];
    for (key, title, description) in builtins {
        let def = AchievementDefinition::new(
            AchievementId::from_static(key),
            title,
            Some(description.to_string()),
        )?;
        storage.catalog.upsert_achievement(&def).await?;
    }
    Ok(())
}

async fn seed_catalog(storage: &Storage) -> Result<u32, Box<dyn std::error::Error>> {
    for (id, name) in SUBJECTS {
        storage
            .catalog
            .upsert_subject(&SubjectRecord::new(SubjectId::new(id), name)?)
            .await?;
    }

    let mut lesson_id = 0_u64;
    for (unit_order, sample) in (1_u32..).zip(UNITS.iter()) {
        let mut unit = UnitRecord::new(
            UnitId::new(sample.id),
            Some(SubjectId::new(sample.subject)),
            sample.title,
            unit_order,
        )?;
        if let Some((key, title)) = sample.achievement {
            let id = AchievementId::from_static(key);
            let description = format!("Complete every lesson in {}", sample.title);
            storage
                .catalog
                .upsert_achievement(&AchievementDefinition::new(
                    id.clone(),
                    title,
                    Some(description),
                )?)
                .await?;
            unit = unit.with_achievement(id);
        }
        storage.catalog.upsert_unit(&unit).await?;

        for (order, (title, xp)) in (1_u32..).zip(sample.lessons.iter()) {
            lesson_id += 1;
            let lesson =
                LessonRecord::new(LessonId::new(lesson_id), unit.id, *title, Some(*xp), order)?;
            storage.catalog.upsert_lesson(&lesson).await?;
        }
    }

    Ok(u32::try_from(lesson_id)?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    seed_achievements(&storage).await?;
    let lessons = seed_catalog(&storage).await?;

    if let Some(user) = args.user {
        let profile = Profile {
            user_id: user,
            username: args.username.clone(),
            full_name: None,
            is_admin: args.admin,
        };
        storage.profiles.upsert_profile(&profile).await?;
        println!("Wrote profile for {}", profile.display_name());
    }

    println!(
        "Seeded {} subjects, {} units and {} lessons into {}",
        SUBJECTS.len(),
        UNITS.len(),
        lessons,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
