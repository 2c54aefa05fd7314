//! Grade exchange between the nbgrader database export and Canvas
//!
//! The nbgrader side is a `grades.csv` file produced by `nbgrader export`;
//! the Canvas side is the submissions endpoint, one edit per student.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::canvas::Submission;
use crate::course::CanvasCourse;

pub const PASS: &str = "\x1b[32mPASSED\x1b[0m";
pub const FAIL: &str = "\x1b[31mFAILED\x1b[0m";

/// One row of the nbgrader grade export. The export carries many more
/// columns; these are the ones the exchange needs.
#[derive(Debug, Deserialize)]
struct GradeRow {
    assignment: String,
    student_id: String,
    score: Option<f64>,
}

/// Reads scores from an nbgrader `grades.csv` export, optionally filtered
/// to one assignment. Rows without a score are dropped. Keys are student
/// ids as imported from the roster, i.e. Canvas user ids as strings.
pub fn read_nbgrader_grades(
    csv_file: &Path,
    assignment: Option<&str>,
) -> Result<HashMap<String, f64>> {
    let mut reader = csv::Reader::from_path(csv_file)
        .with_context(|| format!("failed to open {}", csv_file.display()))?;

    let mut grades = HashMap::new();
    for row in reader.deserialize::<GradeRow>() {
        let row = row.with_context(|| format!("malformed row in {}", csv_file.display()))?;
        if let Some(wanted) = assignment {
            if row.assignment != wanted {
                continue;
            }
        }
        if let Some(score) = row.score {
            grades.insert(row.student_id, score);
        }
    }
    Ok(grades)
}

/// Fetches the current Canvas grade of every enrolled student for an
/// assignment.
pub async fn lms_grades(
    course: &CanvasCourse,
    assignment_id: u64,
) -> Result<HashMap<u64, Option<String>>> {
    let mut grades = HashMap::new();
    for student in course.students() {
        let submission = course
            .client()
            .get_submission(course.course.id, assignment_id, student.id)
            .await?;
        grades.insert(student.id, submission.grade);
    }
    Ok(grades)
}

async fn post_grade(
    course: &CanvasCourse,
    assignment_id: u64,
    user_id: u64,
    grade: &str,
) -> Result<()> {
    course
        .client()
        .edit_submission(
            course.course.id,
            assignment_id,
            user_id,
            &[("submission[posted_grade]", grade.to_string())],
        )
        .await
}

/// Marks every submission complete, reporting each student.
pub async fn update_to_pass(
    course: &CanvasCourse,
    assignment_id: u64,
    submissions: &[Submission],
) -> Result<()> {
    for submission in submissions {
        println!("{} {}", submission.user_id, PASS);
        post_grade(course, assignment_id, submission.user_id, "complete").await?;
    }
    Ok(())
}

/// Marks every submission incomplete, reporting each student.
pub async fn update_to_fail(
    course: &CanvasCourse,
    assignment_id: u64,
    submissions: &[Submission],
) -> Result<()> {
    for submission in submissions {
        println!("{} {}", submission.user_id, FAIL);
        post_grade(course, assignment_id, submission.user_id, "incomplete").await?;
    }
    Ok(())
}

/// Posts numeric scores from an nbgrader score map. Scores are truncated
/// to whole points; a student missing from the map is reported and skipped.
pub async fn set_scores(
    course: &CanvasCourse,
    assignment_id: u64,
    submissions: &[Submission],
    scores: &HashMap<String, f64>,
) -> Result<()> {
    for submission in submissions {
        match scores.get(&submission.user_id.to_string()) {
            Some(score) => {
                let points = *score as i64;
                println!("{} {}", submission.user_id, points);
                post_grade(course, assignment_id, submission.user_id, &points.to_string())
                    .await?;
            }
            None => println!("{} not in grades", submission.user_id),
        }
    }
    Ok(())
}

/// Posts grade strings from a grade map; same skip behavior as
/// [`set_scores`].
pub async fn set_grades(
    course: &CanvasCourse,
    assignment_id: u64,
    submissions: &[Submission],
    grades: &HashMap<String, String>,
) -> Result<()> {
    for submission in submissions {
        match grades.get(&submission.user_id.to_string()) {
            Some(grade) => {
                println!("{} {grade}", submission.user_id);
                post_grade(course, assignment_id, submission.user_id, grade).await?;
            }
            None => println!("{} not in grades", submission.user_id),
        }
    }
    Ok(())
}

/// Attaches the same text comment to every submission in the set.
pub async fn add_comment(
    course: &CanvasCourse,
    assignment_id: u64,
    submissions: &[Submission],
    text: &str,
) -> Result<()> {
    for submission in submissions {
        course
            .client()
            .edit_submission(
                course.course.id,
                assignment_id,
                submission.user_id,
                &[("comment[text_comment]", text.to_string())],
            )
            .await?;
    }
    Ok(())
}
