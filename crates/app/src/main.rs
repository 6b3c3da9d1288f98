use std::fmt;
use std::sync::Arc;

use log::info;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use quiz_core::model::{ParticipantEmail, Session, SessionError};
use quiz_core::scoring;
use services::{
    Clock, QuestionProvider, QuizTicker, ScoreReport, SessionStore, SessionStoreError,
    SharedSessionStore, TriviaClient, TriviaConfig, can_enter_quiz, can_view_report,
};
use storage::Storage;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidAmount { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidAmount { raw } => write!(f, "invalid --amount value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

struct Args {
    db_url: String,
    trivia: TriviaConfig,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [--db <sqlite_url>] [--amount <n>] [--api-base <url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:quiz.sqlite3");
    eprintln!("  --amount 15");
    eprintln!("  --api-base https://opentdb.com");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_QUESTION_COUNT, QUIZ_API_BASE_URL, RUST_LOG");
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("QUIZ_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://quiz.sqlite3".into(), normalize_sqlite_url);
        let mut trivia = TriviaConfig::from_env();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--amount" => {
                    let value = require_value(args, "--amount")?;
                    let parsed: u32 = value
                        .parse()
                        .ok()
                        .filter(|amount| *amount > 0)
                        .ok_or(ArgsError::InvalidAmount { raw: value.clone() })?;
                    trivia.batch_size = parsed;
                }
                "--api-base" => {
                    trivia.base_url = require_value(args, "--api-base")?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, trivia })
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

//
// ─── SCREENS ───────────────────────────────────────────────────────────────────
//

type Input = Lines<BufReader<Stdin>>;

/// What the user asked a screen to do next.
enum Flow {
    Continue,
    Quit,
}

fn decode(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}

fn format_remaining(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

async fn prompt_line(input: &mut Input, prompt: &str) -> Result<Option<String>, std::io::Error> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush()?;
    input.next_line().await
}

async fn start_screen(
    shared: &SharedSessionStore,
    provider: &dyn QuestionProvider,
    input: &mut Input,
) -> Result<Flow, Box<dyn std::error::Error>> {
    println!();
    println!("Welcome to the trivia quiz. Enter your email to begin (q to quit).");

    loop {
        let Some(line) = prompt_line(input, "email> ").await? else {
            return Ok(Flow::Quit);
        };
        if line.trim() == "q" {
            return Ok(Flow::Quit);
        }
        let email = match ParticipantEmail::new(&line) {
            Ok(email) => email,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        println!("Fetching questions...");
        let questions = match provider.fetch_batch().await {
            Ok(batch) => batch,
            Err(err) => {
                // nothing was started, so the user can simply retry
                println!("could not fetch questions: {err}");
                continue;
            }
        };

        let mut guard = shared.lock().await;
        guard.start(email, questions).await?;
        info!(
            "started attempt with {} questions, {} allotted",
            guard.session().total_questions(),
            format_remaining(guard.session().remaining_seconds())
        );
        return Ok(Flow::Continue);
    }
}

fn render_question(session: &Session) {
    let Some(question) = session.current_question() else {
        return;
    };
    let selected = session.answer_for(question.id());

    println!();
    println!(
        "[{}] question {} of {} ({} / {})",
        format_remaining(session.remaining_seconds()),
        session.current_index() + 1,
        session.total_questions(),
        decode(question.category()),
        question.difficulty(),
    );
    println!("{}", decode(question.prompt()));
    for (slot, choice) in question.choices().iter().enumerate() {
        let marker = if selected == Some(choice.as_str()) {
            "*"
        } else {
            " "
        };
        println!("  {marker}{}. {}", slot + 1, decode(choice));
    }
}

fn print_quiz_help() {
    println!(
        "Commands: <n> answer choice n, n(ext), p(rev), g <pos> jump, v progress map, s(ubmit), q(uit)"
    );
}

/// Status label for one position in the progress map. An answered question
/// counts as answered even if the cursor never lingered on it.
fn position_status(session: &Session, position: usize) -> &'static str {
    if scoring::answered_positions(session).contains(&position) {
        "answered"
    } else if session.visited().contains(&position) {
        "visited"
    } else {
        "not visited"
    }
}

/// Per-question progress map: one row per position, cursor marked.
fn render_overview(session: &Session) {
    println!();
    for position in 0..session.total_questions() {
        let cursor = if position == session.current_index() {
            ">"
        } else {
            " "
        };
        println!("  {cursor}{:>2}. {}", position + 1, position_status(session, position));
    }
}

async fn quiz_screen(
    shared: &SharedSessionStore,
    input: &mut Input,
) -> Result<Flow, Box<dyn std::error::Error>> {
    let ticker = QuizTicker::spawn(Arc::clone(shared));
    print_quiz_help();
    render_question(shared.lock().await.session());

    loop {
        let Some(line) = prompt_line(input, "quiz> ").await? else {
            ticker.stop();
            return Ok(Flow::Quit);
        };
        let line = line.trim();

        let mut guard = shared.lock().await;
        if !guard.session().is_active() {
            println!("Time is up.");
            break;
        }

        let outcome: Result<(), SessionStoreError> = match line {
            "" => Ok(()),
            "v" => {
                render_overview(guard.session());
                continue;
            }
            "q" => {
                ticker.stop();
                return Ok(Flow::Quit);
            }
            "s" => {
                guard.submit().await?;
                break;
            }
            "n" => guard.advance().await.map(|_| ()),
            "p" => guard.retreat().await.map(|_| ()),
            _ if line.starts_with("g ") => match line[2..].trim().parse::<usize>() {
                Ok(position) if position >= 1 => guard.go_to(position - 1).await,
                _ => {
                    println!("usage: g <position>");
                    Ok(())
                }
            },
            _ => match line.parse::<usize>() {
                Ok(slot) => answer_current(&mut guard, slot).await,
                Err(_) => {
                    print_quiz_help();
                    Ok(())
                }
            },
        };

        match outcome {
            Ok(()) => {}
            Err(SessionStoreError::Session(SessionError::NotActive)) => {
                println!("Time is up.");
                break;
            }
            Err(SessionStoreError::Session(err)) => println!("{err}"),
            Err(err) => return Err(err.into()),
        }

        render_question(guard.session());
    }

    ticker.stop();
    Ok(Flow::Continue)
}

/// Record the numbered choice against the question currently on screen.
async fn answer_current(
    store: &mut SessionStore,
    slot: usize,
) -> Result<(), SessionStoreError> {
    let Some(question) = store.session().current_question() else {
        return Ok(());
    };
    let id = question.id();
    let Some(choice) = slot
        .checked_sub(1)
        .and_then(|index| question.choices().get(index))
        .cloned()
    else {
        println!("pick a choice between 1 and {}", question.choices().len());
        return Ok(());
    };
    store.record_answer(id, choice).await
}

async fn report_screen(
    shared: &SharedSessionStore,
    input: &mut Input,
) -> Result<Flow, Box<dyn std::error::Error>> {
    let report = {
        let guard = shared.lock().await;
        ScoreReport::build(guard.session())?
    };

    println!();
    println!("──────── results ────────");
    if let Some(email) = &report.participant_email {
        println!("participant: {email}");
    }
    println!(
        "score: {}/{} ({}%) {}",
        report.score,
        report.total,
        report.percentage,
        if report.passed { "PASS" } else { "FAIL" },
    );
    if report.unanswered > 0 {
        println!("unanswered: {}", report.unanswered);
    }
    for outcome in &report.outcomes {
        let mark = if outcome.is_correct { "+" } else { "-" };
        println!();
        println!("{mark} {}. {}", outcome.position + 1, decode(&outcome.prompt));
        match &outcome.selected {
            Some(choice) if outcome.is_correct => println!("    answered: {}", decode(choice)),
            Some(choice) => {
                println!("    answered: {}", decode(choice));
                println!("    correct:  {}", decode(&outcome.correct_answer));
            }
            None => println!("    correct:  {}", decode(&outcome.correct_answer)),
        }
    }
    println!();

    loop {
        let Some(line) = prompt_line(input, "r to retake, q to quit> ").await? else {
            return Ok(Flow::Quit);
        };
        match line.trim() {
            "r" => {
                shared.lock().await.reset().await?;
                return Ok(Flow::Continue);
            }
            "q" => return Ok(Flow::Quit),
            _ => {}
        }
    }
}

//
// ─── ENTRY ─────────────────────────────────────────────────────────────────────
//

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let mut argv = std::env::args().skip(1);
    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so
    // core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;
    info!("state store ready at {}", parsed.db_url);

    let provider = TriviaClient::new(parsed.trivia);
    let store = SessionStore::hydrate(Clock::default_clock(), Arc::clone(&storage.state)).await?;
    if can_enter_quiz(store.session()) {
        info!(
            "resuming attempt at question {} with {} left",
            store.session().current_index() + 1,
            format_remaining(store.session().remaining_seconds())
        );
    }
    let shared = store.shared();

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let screen = {
            let guard = shared.lock().await;
            if can_view_report(guard.session()) {
                Screen::Report
            } else if can_enter_quiz(guard.session()) {
                Screen::Quiz
            } else {
                Screen::Start
            }
        };

        let flow = match screen {
            Screen::Start => start_screen(&shared, &provider, &mut input).await?,
            Screen::Quiz => quiz_screen(&shared, &mut input).await?,
            Screen::Report => report_screen(&shared, &mut input).await?,
        };
        if matches!(flow, Flow::Quit) {
            break;
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Start,
    Quiz,
    Report,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
