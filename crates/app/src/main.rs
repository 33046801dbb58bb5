use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use assess_core::model::{AssessmentId, AssessmentSummary, Question, TestType};
use backend::{AssessmentBackend, HttpBackend, HttpConfig, SubmissionReceipt};
use services::{
    Advanced, AssessmentRunner, Clock, RunnerError, RunnerEvent, RunnerPhase, RunnerSnapshot,
};

#[derive(Debug, PartialEq, Eq)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidTimeout { raw: String },
    EmptyValue { flag: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidTimeout { raw } => write!(f, "invalid --timeout value: {raw}"),
            ArgsError::EmptyValue { flag } => write!(f, "{flag} must not be empty"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    let value = args.next().ok_or(ArgsError::MissingValue { flag })?;
    if value.trim().is_empty() {
        return Err(ArgsError::EmptyValue { flag });
    }
    Ok(value)
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take    --id <assessment_id> [connection]");
    eprintln!("  cargo run -p app -- start   --type <test_type>   [connection]");
    eprintln!("  cargo run -p app -- history                      [connection]");
    eprintln!();
    eprintln!("Connection:");
    eprintln!("  --url <base_url>   default http://localhost:8001");
    eprintln!("  --token <token>    bearer token");
    eprintln!("  --timeout <secs>   request timeout, default 15");
    eprintln!();
    eprintln!("Test types: aptitude, personality, career_interest, skill_assessment");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ASSESS_API_URL, ASSESS_API_TOKEN, ASSESS_HTTP_TIMEOUT_SECS, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Take { id: AssessmentId },
    Start { test_type: TestType },
    History,
}

#[derive(Debug)]
enum Parsed {
    Run { command: Command, config: HttpConfig },
    Help,
}

fn parse_args(argv: Vec<String>, mut config: HttpConfig) -> Result<Parsed, ArgsError> {
    let mut args = argv.into_iter();
    let name = match args.next() {
        None => return Ok(Parsed::Help),
        Some(first) if matches!(first.as_str(), "--help" | "-h") => return Ok(Parsed::Help),
        Some(first) => first,
    };
    if !matches!(name.as_str(), "take" | "start" | "history") {
        return Err(ArgsError::UnknownCommand(name));
    }

    let mut id = None;
    let mut test_type = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--id" if name == "take" => id = Some(AssessmentId::new(require_value(&mut args, "--id")?)),
            "--type" if name == "start" => {
                test_type = Some(TestType::from(require_value(&mut args, "--type")?));
            }
            "--url" => config.base_url = require_value(&mut args, "--url")?,
            "--token" => config = config.with_token(require_value(&mut args, "--token")?),
            "--timeout" => {
                let value = require_value(&mut args, "--timeout")?;
                let secs: u64 = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidTimeout { raw: value.clone() })?;
                config.timeout = Duration::from_secs(secs);
            }
            "--help" | "-h" => return Ok(Parsed::Help),
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }

    let command = match name.as_str() {
        "take" => Command::Take {
            id: id.ok_or(ArgsError::MissingFlag { flag: "--id" })?,
        },
        "start" => Command::Start {
            test_type: test_type.ok_or(ArgsError::MissingFlag { flag: "--type" })?,
        },
        _ => Command::History,
    };
    Ok(Parsed::Run { command, config })
}

/// One line typed by the user while a question is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Select(usize),
    Advance,
    Quit,
    Unknown,
}

impl Input {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" | "n" | "next" => return Self::Advance,
            "q" | "quit" => return Self::Quit,
            _ => {}
        }
        if let Ok(number) = line.parse::<usize>() {
            return number.checked_sub(1).map_or(Self::Unknown, Self::Select);
        }
        let mut chars = line.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => {
                Self::Select(usize::from(c.to_ascii_uppercase() as u8 - b'A'))
            }
            _ => Self::Unknown,
        }
    }
}

fn render_question(snapshot: &RunnerSnapshot) {
    let Some(question) = &snapshot.question else {
        return;
    };
    println!();
    println!(
        "Question {} of {}  ({}s)",
        snapshot.current_index + 1,
        snapshot.question_count,
        snapshot.time_remaining
    );
    println!("{}", question.text);
    for option in &question.options {
        let marker = if option.selected { '*' } else { ' ' };
        let label = option.label.unwrap_or('?');
        println!(" {marker} {label}. {}", option.text);
    }
    let action = if snapshot.is_last_question() {
        "submit"
    } else {
        "next"
    };
    println!("Pick an option, Enter for {action}, q to quit.");
}

fn render_report(receipt: &SubmissionReceipt) {
    println!();
    println!("Assessment submitted.");
    println!("Score: {:.0}%", receipt.score);
    println!("XP earned: {}", receipt.xp_earned);
    if !receipt.ai_report.is_null() {
        match serde_json::to_string_pretty(&receipt.ai_report) {
            Ok(report) => println!("Report:\n{report}"),
            Err(err) => debug!(error = %err, "could not format report"),
        }
    }
}

fn render_history(items: &[AssessmentSummary]) {
    if items.is_empty() {
        println!("No completed assessments yet.");
        return;
    }
    for item in items {
        let when = item
            .completed_at
            .map_or_else(|| "-".to_owned(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        let score = item
            .score
            .map_or_else(|| "-".to_owned(), |s| format!("{s:.0}%"));
        println!("{when}  {:<24} {score:>5}  {}", item.test_type.title(), item.id);
    }
}

/// What the terminal has shown so far for one run.
#[derive(Debug, Default)]
struct Screen {
    rendered: Option<(usize, RunnerPhase)>,
    warned_at: Option<u32>,
}

impl Screen {
    fn show(&mut self, snapshot: &RunnerSnapshot) {
        let key = (snapshot.current_index, snapshot.phase);
        if snapshot.phase == RunnerPhase::InProgress && self.rendered != Some(key) {
            render_question(snapshot);
            self.rendered = Some(key);
            self.warned_at = None;
        } else if snapshot.phase == RunnerPhase::Submitting && self.rendered != Some(key) {
            println!("Submitting...");
            self.rendered = Some(key);
        }
        if snapshot.phase == RunnerPhase::InProgress
            && snapshot.is_low_time
            && self.warned_at != Some(snapshot.time_remaining)
        {
            println!("  {}s left", snapshot.time_remaining);
            self.warned_at = Some(snapshot.time_remaining);
        }
    }

    /// Index of the question last printed, which is the one the user answers.
    fn displayed_index(&self) -> Option<usize> {
        self.rendered.map(|(index, _)| index)
    }

    /// Apply one line of input. Breaks when the run was abandoned.
    async fn handle(&self, runner: &AssessmentRunner, input: Input) -> ControlFlow<()> {
        match input {
            Input::Select(option) => {
                if runner.select(option) {
                    if let Some(label) = Question::option_label(option) {
                        println!("Selected {label}");
                    }
                } else {
                    println!("No such option.");
                }
            }
            Input::Advance => {
                let Some(index) = self.displayed_index() else {
                    println!("Still loading.");
                    return ControlFlow::Continue(());
                };
                match runner.advance_from(index).await {
                    Ok(Advanced::Ignored) => debug!(index, "question already closed"),
                    Ok(_) | Err(RunnerError::Submit(_)) => {}
                    Err(err) => println!("{err}"),
                }
            }
            Input::Quit => {
                runner.cancel();
                println!("Assessment abandoned.");
                return ControlFlow::Break(());
            }
            Input::Unknown => println!("Type an option letter or number, Enter, or q."),
        }
        ControlFlow::Continue(())
    }
}

/// Drive one run from stdin until it reaches a terminal phase.
async fn take(
    backend: Arc<dyn AssessmentBackend>,
    id: AssessmentId,
) -> Result<(), Box<dyn std::error::Error>> {
    let (runner, mut events) = AssessmentRunner::new(backend, Clock::default());
    let mut snapshots = runner.subscribe();

    tokio::spawn({
        let runner = runner.clone();
        async move {
            if let Err(err) = runner.start(id).await {
                debug!(error = %err, "start did not complete");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut screen = Screen::default();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                screen.show(&snapshot);
            }
            Some(event) = events.recv() => match event {
                RunnerEvent::ShowReport { receipt, .. } => {
                    render_report(&receipt);
                    return Ok(());
                }
                RunnerEvent::NavigateBack { message } => {
                    return Err(message.into());
                }
                RunnerEvent::SubmitFailed { message } => {
                    println!("{message}. Press Enter to retry.");
                }
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    runner.cancel();
                    println!("Assessment abandoned.");
                    return Ok(());
                };
                if screen.handle(&runner, Input::parse(&line)).await.is_break() {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let (command, config) = match parse_args(argv, HttpConfig::from_env()) {
        Ok(Parsed::Run { command, config }) => (command, config),
        Ok(Parsed::Help) => {
            print_usage();
            return Ok(());
        }
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
    };

    info!(base_url = %config.base_url, "using assessment backend");
    let backend: Arc<dyn AssessmentBackend> = Arc::new(HttpBackend::new(config)?);

    match command {
        Command::Take { id } => take(backend, id).await,
        Command::Start { test_type } => {
            let assessment = backend
                .start_assessment(&test_type)
                .await
                .map_err(|e| e.user_message())?;
            println!(
                "{}: {} questions, {}s each.",
                assessment.test_type().title(),
                assessment.question_count(),
                assess_core::QUESTION_TIME_LIMIT_SECS
            );
            take(backend, assessment.id().clone()).await
        }
        Command::History => {
            let items = backend
                .assessment_history()
                .await
                .map_err(|e| e.user_message())?;
            render_history(&items);
            Ok(())
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{Answer, Assessment, QuestionId};
    use assess_core::time::fixed_now;
    use backend::InMemoryBackend;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| (*s).to_owned()).collect()
    }

    fn parse(args: &[&str]) -> Result<Parsed, ArgsError> {
        parse_args(argv(args), HttpConfig::new("http://localhost:8001"))
    }

    #[test]
    fn take_requires_an_id() {
        assert_eq!(
            parse(&["take"]).unwrap_err(),
            ArgsError::MissingFlag { flag: "--id" }
        );
        assert_eq!(
            parse(&["take", "--id"]).unwrap_err(),
            ArgsError::MissingValue { flag: "--id" }
        );
    }

    #[test]
    fn connection_flags_override_config() {
        let Parsed::Run { command, config } = parse(&[
            "take", "--id", "a-9", "--url", "http://api.test", "--token", "t0k", "--timeout", "3",
        ])
        .unwrap() else {
            panic!("expected a command");
        };
        assert_eq!(
            command,
            Command::Take {
                id: AssessmentId::new("a-9")
            }
        );
        assert_eq!(config.base_url, "http://api.test");
        assert_eq!(config.token.as_deref(), Some("t0k"));
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn start_parses_test_type() {
        let Parsed::Run { command, .. } = parse(&["start", "--type", "career_interest"]).unwrap()
        else {
            panic!("expected a command");
        };
        assert_eq!(
            command,
            Command::Start {
                test_type: TestType::CareerInterest
            }
        );
    }

    #[test]
    fn rejects_unknown_input() {
        assert_eq!(
            parse(&["grade"]).unwrap_err(),
            ArgsError::UnknownCommand("grade".into())
        );
        assert_eq!(
            parse(&["history", "--id", "x"]).unwrap_err(),
            ArgsError::UnknownArg("--id".into())
        );
        assert_eq!(
            parse(&["history", "--timeout", "soon"]).unwrap_err(),
            ArgsError::InvalidTimeout { raw: "soon".into() }
        );
        assert!(matches!(parse(&[]).unwrap(), Parsed::Help));
    }

    fn runner_with(questions: i64) -> (AssessmentRunner, InMemoryBackend, AssessmentId) {
        let questions = (1..=questions)
            .map(|i| {
                Question::new(QuestionId::number(i), format!("Q{i}"), vec!["x".into(), "y".into()])
                    .unwrap()
            })
            .collect();
        let assessment =
            Assessment::new(AssessmentId::new("a-1"), TestType::Aptitude, questions).unwrap();
        let id = assessment.id().clone();
        let backend = InMemoryBackend::new();
        backend.insert_assessment(assessment).unwrap();
        let (runner, _events) =
            AssessmentRunner::new(Arc::new(backend.clone()), Clock::fixed(fixed_now()));
        (runner, backend, id)
    }

    #[tokio::test(start_paused = true)]
    async fn enter_after_expiry_does_not_close_the_next_question() {
        let (runner, _backend, id) = runner_with(3);
        runner.start(id).await.unwrap();
        let mut screen = Screen::default();
        screen.show(&runner.snapshot());
        assert_eq!(screen.displayed_index(), Some(0));

        // The countdown closes question 0 before the screen catches up.
        tokio::time::sleep(Duration::from_millis(45_500)).await;
        assert_eq!(runner.snapshot().current_index, 1);

        assert!(screen.handle(&runner, Input::Advance).await.is_continue());
        assert_eq!(runner.snapshot().current_index, 1);
        assert_eq!(runner.answers(), vec![Answer::new(QuestionId::number(1), None)]);

        screen.show(&runner.snapshot());
        assert!(screen.handle(&runner, Input::Advance).await.is_continue());
        assert_eq!(runner.snapshot().current_index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn enter_before_first_render_does_nothing() {
        let (runner, _backend, id) = runner_with(2);
        runner.start(id).await.unwrap();
        let screen = Screen::default();

        assert!(screen.handle(&runner, Input::Advance).await.is_continue());
        assert_eq!(runner.snapshot().current_index, 0);
        assert!(runner.answers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn quit_cancels_without_submitting() {
        let (runner, backend, id) = runner_with(1);
        runner.start(id).await.unwrap();
        let mut screen = Screen::default();
        screen.show(&runner.snapshot());

        assert!(screen.handle(&runner, Input::Quit).await.is_break());
        assert_eq!(
            runner.phase(),
            RunnerPhase::Terminal(services::Termination::Abandoned)
        );
        assert_eq!(backend.submit_calls(), 0);
    }

    #[test]
    fn input_maps_letters_numbers_and_actions() {
        assert_eq!(Input::parse("2"), Input::Select(1));
        assert_eq!(Input::parse("c"), Input::Select(2));
        assert_eq!(Input::parse("A"), Input::Select(0));
        assert_eq!(Input::parse(""), Input::Advance);
        assert_eq!(Input::parse(" n "), Input::Advance);
        assert_eq!(Input::parse("q"), Input::Quit);
        assert_eq!(Input::parse("0"), Input::Unknown);
        assert_eq!(Input::parse("ab"), Input::Unknown);
    }
}
