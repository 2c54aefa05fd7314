//! # canvas-nbgrader
//!
//! `canvas-nbgrader` bridges course data between a Canvas LMS instance and
//! the nbgrader grading toolchain. It powers the `cnb` CLI tool and is
//! equally usable from a notebook-driven workflow or a script.
//!
//! ## Core Features
//!
//! - **Canvas access**: authenticated, paginated client for courses,
//!   rosters, assignments, and submissions.
//! - **Roster export**: write a course roster as the CSV that
//!   `nbgrader db student import` consumes.
//! - **Submission archives**: concurrent attachment downloads packed into
//!   the zip layout `nbgrader zip_collect` expects.
//! - **Grade exchange**: push nbgrader scores, pass/fail marks, and
//!   comments back to Canvas submissions.
//! - **Toolchain bridge**: drive the external `nbgrader` CLI (import,
//!   export, autograde, zip_collect).
//!
//! ## Example
//!
//! ```rust,no_run
//! use canvas_nbgrader::canvas::CanvasClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CanvasClient::new("https://canvas.example.edu", "token")?;
//!     for course in client.list_courses().await? {
//!         println!("{} {}", course.id, course.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod canvas;
pub mod config;
pub mod course;
pub mod grades;
pub mod nbgrader;
pub mod submissions;
