//! Out-of-process bridge to the nbgrader toolchain
//!
//! nbgrader is never reimplemented here; every operation spawns its CLI
//! with a timeout and reports the outcome. This module also manages the
//! download area layout nbgrader's `zip_collect` expects.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const NBGRADER_TIMEOUT_SECS: u64 = 600;

pub const OK: &str = "\x1b[32m\u{2713}\x1b[0m";
pub const XX: &str = "\x1b[31m\u{2717}\x1b[0m";

/// Roster file exchanged with `nbgrader db student import`
pub const STUDENTS_CSV: &str = "students.csv";
/// Grade file produced by `nbgrader export`
pub const GRADES_CSV: &str = "grades.csv";

/// An autograde run that did not succeed
#[derive(Debug)]
pub struct AutogradeFailure {
    pub user_id: u64,
    pub error: String,
}

/// Runs nbgrader with the given arguments under a timeout.
/// Returns (success, stdout, stderr).
async fn run_nbgrader(args: &[&str]) -> Result<(bool, String, String)> {
    debug!(?args, "spawning nbgrader");
    let timeout_duration = Duration::from_secs(NBGRADER_TIMEOUT_SECS);

    let result = tokio::time::timeout(
        timeout_duration,
        Command::new("nbgrader").args(args).output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => Ok((
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(anyhow!(
            "nbgrader not found in PATH (is nbgrader installed?)"
        )),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(anyhow!(
            "nbgrader operation timed out after {} seconds",
            NBGRADER_TIMEOUT_SECS
        )),
    }
}

fn ensure_success(result: (bool, String, String), action: &str) -> Result<()> {
    let (success, _stdout, stderr) = result;
    if success {
        Ok(())
    } else {
        Err(anyhow!("{action} failed: {stderr}"))
    }
}

/// Checks whether the nbgrader CLI is available in PATH.
pub async fn check_nbgrader_installed() -> bool {
    match Command::new("nbgrader").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Imports the roster export into the nbgrader database.
///
/// Call: `nbgrader db student import students.csv`
pub async fn import_students() -> Result<()> {
    ensure_success(
        run_nbgrader(&["db", "student", "import", STUDENTS_CSV]).await?,
        "student import",
    )
}

/// Exports the grade database to `grades.csv`.
///
/// Call: `nbgrader export`
pub async fn export_grades() -> Result<()> {
    ensure_success(run_nbgrader(&["export"]).await?, "grade export")
}

/// Collects downloaded submission archives into the exchange layout.
///
/// Call: `nbgrader zip_collect <assignment> --force`
pub async fn zip_collect(assignment: &str) -> Result<()> {
    ensure_success(
        run_nbgrader(&["zip_collect", assignment, "--force"]).await?,
        "zip_collect",
    )
}

/// Scaffolds a new nbgrader course directory.
///
/// Call: `nbgrader quickstart <course>`
pub async fn quickstart(course: &str) -> Result<()> {
    ensure_success(run_nbgrader(&["quickstart", course]).await?, "quickstart")
}

/// Generates the student version of an assignment.
///
/// Call: `nbgrader generate_assignment <assignment> --force`
pub async fn generate_assignment(assignment: &str) -> Result<()> {
    ensure_success(
        run_nbgrader(&["generate_assignment", assignment, "--force"]).await?,
        "generate_assignment",
    )
}

/// Autogrades each submission in turn, printing a per-student outcome.
/// Returns the failed runs so the caller can retry or inspect them.
pub async fn autograde(
    assignment: &str,
    submissions: &[crate::canvas::Submission],
) -> Result<Vec<AutogradeFailure>> {
    let mut failed = Vec::new();
    for submission in submissions {
        let student_id = submission.user_id.to_string();
        let (success, _stdout, stderr) =
            run_nbgrader(&["autograde", assignment, "--student", &student_id, "--force"]).await?;

        let grade = submission.grade.as_deref().unwrap_or("-");
        if success {
            println!("{} {} {}", submission.user_id, grade, OK);
        } else {
            println!("{} {} {}", submission.user_id, grade, XX);
            println!("---ERROR---\n{stderr}\n");
            failed.push(AutogradeFailure {
                user_id: submission.user_id,
                error: stderr,
            });
        }
    }
    Ok(failed)
}

/// Creates the download area for a lab: `downloaded/<lab>/archive`.
pub fn init_downloads_area(lab: &str) -> Result<PathBuf> {
    let path = Path::new("downloaded").join(lab).join("archive");
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    Ok(path)
}
