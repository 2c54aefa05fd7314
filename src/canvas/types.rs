//! Canvas REST resource models
//!
//! Only the fields this tool reads are modeled; the full schemas belong to
//! the Canvas API.

use serde::Deserialize;

/// A course the authenticated user can see
#[derive(Debug, Clone, Deserialize)]
pub struct Course {
    pub id: u64,
    // Courses restricted by date come back without a name
    #[serde(default)]
    pub name: String,
}

/// A Canvas user record, as returned by roster and profile endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: u64,
    /// "Last, First" ordering, used for roster export and filenames
    pub sortable_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// An assignment within a course
#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    pub id: u64,
    pub name: String,
}

/// A file uploaded with a submission
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    /// Pre-signed download URL; carries the file id as `files/<id>/download`
    pub url: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A student's submission for one assignment
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub user_id: u64,
    #[serde(default)]
    pub grade: Option<String>,
    /// Set for URL-type submissions
    #[serde(default)]
    pub url: Option<String>,
    /// False when the student resubmitted after grading
    #[serde(default)]
    pub grade_matches_current_submission: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}
