//! cnb: exchange rosters, submissions, and grades between Canvas LMS and nbgrader
//!
//! The heavy lifting lives in the library; this binary wires configuration,
//! opens the connection, and runs the requested listing or export.

use anyhow::Result;
use clap::{Arg, ArgAction, Command as ClapCommand};
use std::path::{Path, PathBuf};

use canvas_nbgrader::canvas::CanvasClient;
use canvas_nbgrader::config::{Config, Overrides};
use canvas_nbgrader::course::CanvasCourse;
use canvas_nbgrader::nbgrader;

const COURSE_ID_UNDEFINED_MESSAGE: &str = "Course-id undefined";

fn cli() -> ClapCommand {
    ClapCommand::new("cnb")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Exchange rosters, submissions, and grades between Canvas LMS and nbgrader")
        .arg(
            Arg::new("course-id")
                .short('c')
                .long("course-id")
                .value_parser(clap::value_parser!(u64))
                .help("Course ID"),
        )
        .arg(
            Arg::new("assignment")
                .short('a')
                .long("assignment")
                .value_parser(clap::value_parser!(u64))
                .help("List ungraded submissions for this assignment ID"),
        )
        .arg(
            Arg::new("list-students")
                .short('l')
                .long("list-students")
                .action(ArgAction::SetTrue)
                .help("List students registered in the course"),
        )
        .arg(
            Arg::new("list-courses")
                .long("list-courses")
                .action(ArgAction::SetTrue)
                .help("List your courses on Canvas"),
        )
        .arg(
            Arg::new("download-students")
                .long("download-students")
                .action(ArgAction::SetTrue)
                .help("Save the course roster as students.csv for nbgrader import"),
        )
        .arg(
            Arg::new("config-file")
                .short('i')
                .long("config-file")
                .value_name("PATH")
                .help("Config file with a [default] table"),
        )
        .arg(
            Arg::new("verify")
                .short('v')
                .long("verify")
                .action(ArgAction::SetTrue)
                .help("Verify the Canvas connection"),
        )
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Reports which connection values are missing, or confirms the connection
/// by fetching the authenticated user.
async fn verify_connection(config: &Config) -> Result<()> {
    let mut missing = false;
    if config.canvas_url.is_none() {
        println!("CANVAS_URL not defined");
        missing = true;
    }
    if config.canvas_token.is_none() {
        println!("CANVAS_TOKEN not defined");
        missing = true;
    }
    if missing {
        return Ok(());
    }

    let client = CanvasClient::from_config(config)?;
    let user = client.current_user().await?;
    println!("Connected to {} as {}", client.base_url(), user.sortable_name);
    Ok(())
}

/// Lists ungraded submissions for an assignment: URL submissions first,
/// then attachment submissions.
async fn list_ungraded(course: &CanvasCourse, assignment_id: u64) -> Result<()> {
    let submissions = course.submissions(assignment_id).await?;

    for s in submissions.iter().filter(|s| s.grade.is_none()) {
        if let Some(url) = &s.url {
            let name = course.student_name(s.user_id).unwrap_or("unknown");
            println!("{name} {} {url}", s.user_id);
        }
    }
    for s in submissions.iter().filter(|s| s.grade.is_none()) {
        if let Some(attachment) = s.attachments.first() {
            let name = course.student_name(s.user_id).unwrap_or("unknown");
            println!("{name} {} {}", s.user_id, attachment.url);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = cli().get_matches();

    let overrides = Overrides {
        course_id: matches.get_one::<u64>("course-id").copied(),
        config_file: matches.get_one::<String>("config-file").map(PathBuf::from),
        ..Overrides::default()
    };
    let config = Config::resolve(overrides)?;

    if matches.get_flag("verify") {
        verify_connection(&config).await?;
        return Ok(());
    }

    if matches.get_flag("list-courses") {
        let client = CanvasClient::from_config(&config)?;
        for course in client.list_courses().await? {
            println!("{} {}", course.id, course.name);
        }
        return Ok(());
    }

    if config.course_id.is_none() {
        println!("{COURSE_ID_UNDEFINED_MESSAGE}");
        return Ok(());
    }

    let course = CanvasCourse::connect(&config).await?;

    if matches.get_flag("list-students") {
        course.list_students();
    }

    if matches.get_flag("download-students") {
        course.download_students(Path::new(nbgrader::STUDENTS_CSV))?;
    }

    if let Some(assignment_id) = matches.get_one::<u64>("assignment").copied() {
        list_ungraded(&course, assignment_id).await?;
    }

    Ok(())
}
