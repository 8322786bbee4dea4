use std::fmt;
use std::sync::Arc;

use api::{Api, ApiConfig};
use async_trait::async_trait;
use lms_core::model::{CourseId, LessonId, MediaKind, QuestionId};
use services::{
    AttachRequest, Clock, CompletionOutcome, CourseViewer, NoticeLevel, PlayerError,
    PlayerHandle, PlayerHost, ViewerConfig, ViewerEvent,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidAnswers { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidAnswers { raw } => {
                write!(f, "invalid --answers value: {raw} (expected <question>=<option>,...)")
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- show     --course <id>");
    eprintln!("  cargo run -p app -- complete --course <id> --lesson <id>");
    eprintln!("  cargo run -p app -- quiz     --course <id> --lesson <id> --answers <q>=<i>,...");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LMS_API_URL (default http://localhost:8080/api), LMS_API_TOKEN, LMS_COURSE_ID");
    eprintln!("  LMS_HEARTBEAT_SECS, LMS_PLAYER_READY_TIMEOUT_SECS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Show,
    Complete,
    Quiz,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "show" => Some(Self::Show),
            "complete" => Some(Self::Complete),
            "quiz" => Some(Self::Quiz),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    course_id: Option<CourseId>,
    lesson_id: Option<LessonId>,
    answers: Vec<(QuestionId, usize)>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            course_id: std::env::var("LMS_COURSE_ID")
                .ok()
                .and_then(|value| value.parse::<CourseId>().ok()),
            ..Self::default()
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--course" => {
                    let value = require_value(args, "--course")?;
                    let id = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--course",
                        raw: value.clone(),
                    })?;
                    parsed.course_id = Some(id);
                }
                "--lesson" => {
                    let value = require_value(args, "--lesson")?;
                    let id = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--lesson",
                        raw: value.clone(),
                    })?;
                    parsed.lesson_id = Some(id);
                }
                "--answers" => {
                    let value = require_value(args, "--answers")?;
                    parsed.answers = parse_answers(&value)?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn course(&self) -> Result<CourseId, ArgsError> {
        self.course_id
            .ok_or(ArgsError::MissingFlag { flag: "--course" })
    }

    fn lesson(&self) -> Result<LessonId, ArgsError> {
        self.lesson_id
            .ok_or(ArgsError::MissingFlag { flag: "--lesson" })
    }
}

fn parse_answers(raw: &str) -> Result<Vec<(QuestionId, usize)>, ArgsError> {
    let invalid = || ArgsError::InvalidAnswers { raw: raw.to_owned() };
    raw.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let (question, option) = pair.split_once('=').ok_or_else(invalid)?;
            let question: QuestionId = question.parse().map_err(|_| invalid())?;
            let option: usize = option.trim().parse().map_err(|_| invalid())?;
            Ok((question, option))
        })
        .collect()
}

/// A terminal has nowhere to mount a video player, so streaming lessons stay gated.
struct HeadlessPlayer;

#[async_trait]
impl PlayerHost for HeadlessPlayer {
    async fn ready(&self) -> Result<(), PlayerError> {
        Err(PlayerError::Unavailable("no video player in a terminal".into()))
    }

    fn attach(&self, request: AttachRequest) -> Result<Box<dyn PlayerHandle>, PlayerError> {
        Err(PlayerError::Attach {
            container_id: request.container_id,
            reason: "headless".into(),
        })
    }
}

fn media_label(kind: &MediaKind) -> String {
    match kind {
        MediaKind::None => "text".into(),
        MediaKind::StreamingVideo(id) => format!("video {id}"),
        MediaKind::RawVideo(_) => "video file".into(),
        MediaKind::Image(_) => "image".into(),
        MediaKind::Document => "document".into(),
        MediaKind::Other => "link".into(),
    }
}

fn print_events(events: Vec<ViewerEvent>) {
    for event in events {
        match event {
            ViewerEvent::Notice(notice) => {
                let level = match notice.level {
                    NoticeLevel::Info => "info",
                    NoticeLevel::Success => "ok",
                    NoticeLevel::Warning => "warn",
                    NoticeLevel::Error => "error",
                };
                println!("[{level}] {}", notice.message);
            }
            ViewerEvent::AssessmentRequested(lesson_id) => {
                println!("[quiz] lesson {lesson_id} needs its quiz passed");
            }
            ViewerEvent::LessonCompleted {
                lesson_id,
                progress,
            } => {
                println!(
                    "[done] lesson {lesson_id} completed, course at {}%",
                    progress.rounded_percent()
                );
            }
            ViewerEvent::SignedOut => println!("[auth] session expired, sign in again"),
        }
    }
}

fn print_course(viewer: &CourseViewer) {
    let course = viewer.course();
    println!("{} (course {})", course.title, course.id);
    if let Some(description) = &course.description {
        println!("  {description}");
    }
    for lesson in viewer.session().lessons() {
        let mark = if viewer.session().is_completed(lesson.id) {
            "x"
        } else {
            " "
        };
        println!(
            "  [{mark}] {:>3}. {} (lesson {}, {})",
            lesson.position,
            lesson.title,
            lesson.id,
            media_label(&lesson.media_kind())
        );
    }
    let progress = viewer.progress();
    println!(
        "Progress: {}/{} lessons, {}%",
        progress.completed,
        progress.total,
        progress.rounded_percent()
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let course_id = args.course()?;
    tracing::debug!(%course_id, command = ?cmd, "opening course");

    let api = Api::http(ApiConfig::from_env())?;
    let mut viewer = CourseViewer::open(
        api,
        Arc::new(HeadlessPlayer),
        ViewerConfig::from_env(),
        Clock::system(),
        course_id,
    )
    .await?;
    print_events(viewer.drain_events());

    match cmd {
        Command::Show => print_course(&viewer),
        Command::Complete => {
            viewer.activate_lesson(args.lesson()?).await?;
            let outcome = viewer.attempt_complete().await?;
            print_events(viewer.drain_events());
            match outcome {
                CompletionOutcome::AlreadyCompleted => println!("Lesson was already completed."),
                CompletionOutcome::Failed(err) => return Err(err.into()),
                _ => {}
            }
        }
        Command::Quiz => {
            viewer.activate_lesson(args.lesson()?).await?;
            print_events(viewer.drain_events());
            if viewer.quiz().quiz().is_none() {
                println!("This lesson has no quiz.");
                return Ok(());
            }
            for (question, option) in &args.answers {
                viewer.select_option(*question, *option)?;
            }
            let result = viewer.submit_quiz().await?;
            if let Some(result) = result {
                for review in &result.review {
                    let verdict = if review.is_correct { "correct" } else { "wrong" };
                    println!("  {verdict:<7} {}", review.question_text);
                }
                println!(
                    "Score {:.0}% ({}/{}), {}",
                    result.score,
                    result.correct_count,
                    result.total_count,
                    if result.passed { "passed" } else { "not passed" }
                );
            }
            print_events(viewer.drain_events());
        }
    }

    viewer.close();
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(&mut raw.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn parses_course_lesson_and_answers() {
        let parsed = args(&["--course", "3", "--lesson", "12", "--answers", "5=1, 7=0"]).unwrap();
        assert_eq!(parsed.course().unwrap(), CourseId::new(3));
        assert_eq!(parsed.lesson().unwrap(), LessonId::new(12));
        assert_eq!(
            parsed.answers,
            vec![(QuestionId::new(5), 1), (QuestionId::new(7), 0)]
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            args(&["--course"]),
            Err(ArgsError::MissingValue { flag: "--course" })
        ));
        assert!(matches!(
            args(&["--lesson", "abc"]),
            Err(ArgsError::InvalidId { flag: "--lesson", .. })
        ));
        assert!(matches!(
            args(&["--answers", "5:1"]),
            Err(ArgsError::InvalidAnswers { .. })
        ));
        assert!(matches!(args(&["--quiz"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn missing_lesson_is_reported() {
        let parsed = args(&["--course", "1"]).unwrap();
        assert!(matches!(
            parsed.lesson(),
            Err(ArgsError::MissingFlag { flag: "--lesson" })
        ));
    }

    #[test]
    fn streaming_lessons_are_labelled_with_video_id() {
        let kind = lms_core::model::classify(Some("https://youtu.be/dQw4w9WgXcQ"));
        assert_eq!(media_label(&kind), "video dQw4w9WgXcQ");
        assert_eq!(media_label(&MediaKind::Document), "document");
    }
}
