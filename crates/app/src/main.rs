mod i18n;
mod sim;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use course_core::model::{CatalogError, Lesson, LessonCatalog, LessonId, UserId};
use course_core::time::Clock;
use services::{AccountService, AuthProvider, ProgressTracker, StaticAuth};
use storage::repository::Storage;
use tracing::{info, warn};

use crate::i18n::{Language, lesson_title};
use crate::sim::SimulatedProvider;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    UnknownLanguage { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    MissingLesson,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::UnknownLanguage { raw } => write!(f, "unsupported language: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::MissingLesson => write!(f, "this command needs a lesson id"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- dashboard [--db <sqlite_url>] [--user <id>] [--lang <en|de>]");
    eprintln!("  cargo run -p app -- watch <lesson-id> [--duration <secs>] [--rate <x>]");
    eprintln!("  cargo run -p app -- complete <lesson-id>");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:course.sqlite3");
    eprintln!("  --user local-user");
    eprintln!("  --lang en");
    eprintln!("  --duration 120  --rate 20 (watch simulation)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COURSE_DB_URL, COURSE_USER_ID, COURSE_LANG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Dashboard,
    Watch,
    Complete,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "dashboard" => Some(Self::Dashboard),
            "watch" => Some(Self::Watch),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user_id: UserId,
    email: String,
    lang: Language,
    lesson: Option<LessonId>,
    duration_secs: f64,
    rate: f64,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("COURSE_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://course.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = std::env::var("COURSE_USER_ID")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| UserId::new("local-user"), UserId::new);
        let mut email = None;
        let mut lang = std::env::var("COURSE_LANG")
            .ok()
            .and_then(|code| Language::from_code(&code))
            .unwrap_or_default();
        let mut lesson = None;
        let mut duration_secs = 120.0;
        let mut rate = 20.0;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    user_id = UserId::new(require_value(args, "--user")?);
                }
                "--email" => {
                    email = Some(require_value(args, "--email")?);
                }
                "--lang" => {
                    let value = require_value(args, "--lang")?;
                    lang = Language::from_code(&value)
                        .ok_or(ArgsError::UnknownLanguage { raw: value })?;
                }
                "--duration" => {
                    let value = require_value(args, "--duration")?;
                    duration_secs = value.parse().map_err(|_| ArgsError::InvalidNumber {
                        flag: "--duration",
                        raw: value.clone(),
                    })?;
                }
                "--rate" => {
                    let value = require_value(args, "--rate")?;
                    rate = value.parse().map_err(|_| ArgsError::InvalidNumber {
                        flag: "--rate",
                        raw: value.clone(),
                    })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if !arg.starts_with("--") && lesson.is_none() => {
                    lesson = Some(LessonId::new(arg));
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let email = email.unwrap_or_else(|| format!("{user_id}@example.com"));
        Ok(Self {
            db_url,
            user_id,
            email,
            lang,
            lesson,
            duration_secs,
            rate,
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
    format!("sqlite://{}", absolute.display())
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

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// The built-in course: a static ordered list fixed at build time.
fn course_catalog() -> Result<LessonCatalog, CatalogError> {
    LessonCatalog::new(vec![
        Lesson::new(
            LessonId::new("lesson1"),
            "https://www.youtube.com/watch?v=d54ioeKA-jc&t=77s",
        ),
        Lesson::new(
            LessonId::new("lesson2"),
            "https://www.youtube.com/watch?v=S8ukFF6SdGk&t=406s",
        ),
    ])
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("app=info".parse()?)
                .add_directive("services=info".parse()?),
        )
        .init();

    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: the dashboard when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Dashboard,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Dashboard,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && Command::from_arg(&argv[0]).is_some() {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let args = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    info!(lang = args.lang.code(), db = %args.db_url, "starting");

    // Open + migrate SQLite at startup. Keep this in the binary glue so
    // core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;

    let catalog = course_catalog()?;
    let clock = Clock::default_clock();

    // Sign-in: the subscription lives for the whole command and is released
    // when `events` drops on the way out.
    let auth = StaticAuth::signed_in(args.user_id.clone());
    let events = auth.subscribe();
    let Some(user) = events.current() else {
        warn!("no user signed in; nothing to do");
        return Ok(());
    };

    let account = AccountService::new(clock, Arc::clone(&storage.users));
    account.ensure_user_document(&user, &args.email).await?;

    let provider = Arc::new(SimulatedProvider::new(args.duration_secs, args.rate));
    let tracker = ProgressTracker::new(catalog.clone(), Arc::clone(&storage.users), provider);
    tracker.load_initial_state(user).await;

    match cmd {
        Command::Dashboard => {
            print_dashboard(&tracker, &catalog, args.lang);
        }
        Command::Watch => {
            let lesson = args.lesson.ok_or(ArgsError::MissingLesson)?;
            watch_lesson(&tracker, &lesson, args.lang).await?;
        }
        Command::Complete => {
            let lesson = args.lesson.ok_or(ArgsError::MissingLesson)?;
            let strings = args.lang.strings();
            match tracker.toggle_complete(&lesson).await {
                Ok(true) => println!("{}", strings.mark_complete),
                Ok(false) => println!("{}", strings.marked_incomplete),
                Err(err) => {
                    warn!(lesson = %lesson, error = %err, "completion toggle failed");
                    eprintln!("{}", strings.retry_hint);
                }
            }
        }
    }

    tracker.teardown();
    drop(events);
    Ok(())
}

fn print_dashboard(tracker: &ProgressTracker, catalog: &LessonCatalog, lang: Language) {
    let strings = lang.strings();
    println!("{} ({})", strings.dashboard_title, lang.native_name());
    for lesson in catalog.iter() {
        let record = tracker.record(lesson.id());
        let title = lesson_title(lang, lesson.id().as_str()).unwrap_or(lesson.id().as_str());
        let marker = if record.completed {
            format!("  [{}]", strings.completed)
        } else {
            String::new()
        };
        println!(
            "  {title} - {}% {}{marker}",
            record.percent, strings.watched
        );
    }
}

async fn watch_lesson(
    tracker: &ProgressTracker,
    lesson_id: &LessonId,
    lang: Language,
) -> Result<(), Box<dyn std::error::Error>> {
    tracker.expand(lesson_id).await?;
    info!(lesson = %lesson_id, "session attached; waiting for playback");

    let mut was_tracking = false;
    let mut idle_ticks = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let tracking = tracker.is_tracking(lesson_id);
        if tracking {
            was_tracking = true;
            let record = tracker.record(lesson_id);
            info!(lesson = %lesson_id, percent = %record.percent, "watching");
        } else if was_tracking {
            break;
        } else {
            idle_ticks += 1;
            if idle_ticks > 60 {
                warn!(lesson = %lesson_id, "playback never started; giving up");
                break;
            }
        }
    }

    // give the last fire-and-forget write a moment to land
    tokio::time::sleep(Duration::from_millis(500)).await;

    let record = tracker.record(lesson_id);
    println!("{}% {}", record.percent, lang.strings().watched);
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
