//! Canvas web API access: the authenticated client and the resource
//! models it returns.

pub mod client;
pub mod types;

pub use client::CanvasClient;
pub use types::{Assignment, Attachment, Course, Submission, User};
