//! Submission filtering, attachment download, and archive assembly
//!
//! Mirrors what the Canvas web client produces for "download submissions":
//! every kept submission's first attachment, renamed to a unique filename,
//! packed into `downloaded/<lab>/archive/submissions.zip`.

use anyhow::{anyhow, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::canvas::{Submission, User};
use crate::course::{split_sortable_name, CanvasCourse};
use crate::nbgrader;

// Downloads are I/O-bound; cap mirrors the git-operation cap rather than
// raw CPU count
const DOWNLOAD_CONCURRENT_CAP: usize = 12;
const DOWNLOAD_PROGRESS_TEMPLATE: &str = "{bar:30} {pos}/{len} {wide_msg}";
const PROGRESS_CHARS: &str = "##-";

lazy_static! {
    static ref FILE_ID_RE: Regex =
        Regex::new(r"files/(\d+)/download").expect("file id pattern is valid");
}

/// A predicate selecting submissions to keep
pub type SubmissionFilter = Box<dyn Fn(&Submission) -> bool + Send + Sync>;

/// Keeps submissions carrying at least one attachment.
pub fn has_attachments() -> SubmissionFilter {
    Box::new(|s| !s.attachments.is_empty())
}

/// Keeps URL-type submissions.
pub fn has_url() -> SubmissionFilter {
    Box::new(|s| s.url.is_some())
}

/// Keeps submissions with either an attachment or a URL.
pub fn has_attachment_or_url() -> SubmissionFilter {
    Box::new(|s| !s.attachments.is_empty() || s.url.is_some())
}

/// Keeps submissions that have not been graded yet.
pub fn ungraded() -> SubmissionFilter {
    Box::new(|s| s.grade.is_none())
}

/// Keeps resubmissions: the recorded grade no longer matches the current
/// submission.
pub fn unmatching_grade() -> SubmissionFilter {
    Box::new(|s| !s.grade_matches_current_submission)
}

/// Keeps ungraded submissions and resubmissions.
pub fn ungraded_or_unmatching() -> SubmissionFilter {
    Box::new(|s| s.grade.is_none() || !s.grade_matches_current_submission)
}

/// Keeps submissions belonging to one user.
pub fn from_user(user_id: u64) -> SubmissionFilter {
    Box::new(move |s| s.user_id == user_id)
}

/// Applies every filter; a submission must pass all of them.
pub fn apply_filters(submissions: Vec<Submission>, filters: &[SubmissionFilter]) -> Vec<Submission> {
    submissions
        .into_iter()
        .filter(|submission| filters.iter().all(|keep| keep(submission)))
        .collect()
}

/// Builds the unique archive member name for a submission's first
/// attachment: `<lastfirst>_<user_id>_<file_id>_<notebook>`, with `.ipynb`
/// appended when missing.
pub fn unique_filename(student: &User, submission: &Submission, nb_name: &str) -> Result<String> {
    let attachment = submission.attachments.first().ok_or_else(|| {
        anyhow!(
            "submission from user {} has no attachments",
            submission.user_id
        )
    })?;

    let file_id = FILE_ID_RE
        .captures(&attachment.url)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| anyhow!("no file id in attachment url {}", attachment.url))?;

    let (last, first) = split_sortable_name(&student.sortable_name);
    let lastfirst = format!("{last}{first}").replace(' ', "").to_lowercase();

    let mut name = format!("{lastfirst}_{}_{file_id}_{nb_name}", submission.user_id);
    if !name.ends_with(".ipynb") {
        name.push_str(".ipynb");
    }
    Ok(name)
}

/// Concurrency for attachment downloads: cores + 2, capped.
fn download_concurrency() -> usize {
    (num_cpus::get() + 2).min(DOWNLOAD_CONCURRENT_CAP)
}

/// Downloads the attachments of all matching submissions for an assignment
/// and packs them into `downloaded/<lab_name>/archive/submissions.zip`.
/// Returns the archive path.
pub async fn download_submissions_with_attachments(
    course: &CanvasCourse,
    assignment_id: u64,
    lab_name: &str,
    nb_name: &str,
    filters: &[SubmissionFilter],
) -> Result<PathBuf> {
    let submissions = course.submissions(assignment_id).await?;
    let kept = apply_filters(
        submissions
            .into_iter()
            .filter(|s| !s.attachments.is_empty())
            .collect(),
        filters,
    );

    // Resolve filenames before spawning anything so an unknown student or
    // malformed URL fails the whole run up front
    let mut jobs = Vec::with_capacity(kept.len());
    for submission in &kept {
        let student = course.student(submission.user_id).ok_or_else(|| {
            anyhow!(
                "user {} is not enrolled in {}",
                submission.user_id,
                course.course.name
            )
        })?;
        let filename = unique_filename(student, submission, nb_name)?;
        let url = submission.attachments[0].url.clone();
        jobs.push((filename, url));
    }

    let archive_dir = nbgrader::init_downloads_area(lab_name)?;
    let zip_path = archive_dir.join("submissions.zip");

    let start_time = Instant::now();
    let total = jobs.len();
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(DOWNLOAD_PROGRESS_TEMPLATE)?
            .progress_chars(PROGRESS_CHARS),
    );

    let semaphore = Arc::new(tokio::sync::Semaphore::new(download_concurrency()));
    let mut futures = FuturesUnordered::new();
    for (filename, url) in jobs {
        let semaphore = Arc::clone(&semaphore);
        let progress = progress.clone();
        let client = course.client();

        futures.push(async move {
            let _permit = semaphore
                .acquire()
                .await
                .expect("download semaphore closed");
            let body = client.download(&url).await;
            progress.inc(1);
            (filename, body)
        });
    }

    let mut downloads = Vec::with_capacity(total);
    while let Some((filename, body)) = futures.next().await {
        let body = body.with_context(|| format!("download of {filename} failed"))?;
        downloads.push((filename, body));
    }
    progress.finish_and_clear();

    // FuturesUnordered completes in arbitrary order; keep the archive stable
    downloads.sort_by(|a, b| a.0.cmp(&b.0));

    zip_downloads(&zip_path, &downloads)?;
    println!(
        "✅ Downloaded {} submissions in {:.1}s",
        total,
        start_time.elapsed().as_secs_f64()
    );
    Ok(zip_path)
}

/// Writes the downloaded bodies into a deflate zip archive, printing each
/// member name and the final archive path.
pub fn zip_downloads(zip_path: &Path, downloads: &[(String, Vec<u8>)]) -> Result<()> {
    let file = std::fs::File::create(zip_path)
        .with_context(|| format!("failed to create {}", zip_path.display()))?;
    let mut archive = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, body) in downloads {
        archive.start_file(name.as_str(), options)?;
        archive.write_all(body)?;
        println!(" {name}");
    }
    archive.finish()?;
    println!("-> {}", zip_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Attachment;

    fn submission(user_id: u64, grade: Option<&str>, url: Option<&str>) -> Submission {
        Submission {
            user_id,
            grade: grade.map(String::from),
            url: url.map(String::from),
            grade_matches_current_submission: true,
            attachments: Vec::new(),
        }
    }

    fn with_attachment(mut s: Submission, url: &str) -> Submission {
        s.attachments.push(Attachment {
            url: url.to_string(),
            display_name: None,
        });
        s
    }

    #[test]
    fn ungraded_keeps_only_missing_grades() {
        let submissions = vec![
            submission(1, Some("ok"), None),
            submission(2, None, None),
            submission(3, Some("not ok"), None),
            submission(4, None, None),
        ];

        let kept = apply_filters(submissions, &[ungraded()]);
        let ids: Vec<u64> = kept.iter().map(|s| s.user_id).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[test]
    fn attachment_and_url_filters() {
        let with = with_attachment(submission(1, None, None), "http://x/files/7/download");
        let with_url = submission(2, None, Some("http://x"));
        let without = submission(3, None, None);

        let kept = apply_filters(
            vec![with.clone(), with_url.clone(), without.clone()],
            &[has_attachments()],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].user_id, 1);

        let kept = apply_filters(
            vec![with.clone(), with_url.clone(), without.clone()],
            &[has_url()],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].user_id, 2);

        let kept = apply_filters(vec![with, with_url, without], &[has_attachment_or_url()]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn resubmissions_are_detected() {
        let mut resubmitted = submission(1, Some("5"), None);
        resubmitted.grade_matches_current_submission = false;
        let graded = submission(2, Some("5"), None);
        let fresh = submission(3, None, None);

        let kept = apply_filters(
            vec![resubmitted.clone(), graded.clone(), fresh.clone()],
            &[unmatching_grade()],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].user_id, 1);

        let kept = apply_filters(
            vec![resubmitted, graded, fresh],
            &[ungraded_or_unmatching()],
        );
        let ids: Vec<u64> = kept.iter().map(|s| s.user_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn from_user_selects_one_student() {
        let submissions = vec![submission(1, None, None), submission(2, None, None)];
        let kept = apply_filters(submissions, &[from_user(2)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].user_id, 2);
    }

    #[test]
    fn filters_compose() {
        let ungraded_with = with_attachment(submission(1, None, None), "http://x/files/7/download");
        let graded_with =
            with_attachment(submission(2, Some("ok"), None), "http://x/files/8/download");
        let ungraded_without = submission(3, None, None);

        let kept = apply_filters(
            vec![ungraded_with, graded_with, ungraded_without],
            &[has_attachments(), ungraded()],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].user_id, 1);
    }

    #[test]
    fn unique_filenames_follow_the_canvas_pattern() {
        let cases = [
            ("Doe, Jane", 1, "http://xyz/files/2/download...", "doejane_1_2_nb_name.ipynb"),
            ("Doe, John", 3, "http://xyz/files/4/download...", "doejohn_3_4_nb_name.ipynb"),
            ("Mehta, Tanvi", 5, "http://xyz/files/6/download...", "mehtatanvi_5_6_nb_name.ipynb"),
        ];

        for (name, user_id, url, expected) in cases {
            let student = User {
                id: user_id,
                sortable_name: name.to_string(),
                email: None,
            };
            let s = with_attachment(submission(user_id, None, None), url);
            assert_eq!(unique_filename(&student, &s, "nb_name.ipynb").unwrap(), expected);
        }
    }

    #[test]
    fn ipynb_suffix_is_appended_when_missing() {
        let student = User {
            id: 1,
            sortable_name: "Doe, Jane".to_string(),
            email: None,
        };
        let s = with_attachment(submission(1, None, None), "http://xyz/files/2/download");
        assert_eq!(
            unique_filename(&student, &s, "lab1").unwrap(),
            "doejane_1_2_lab1.ipynb"
        );
    }

    #[test]
    fn attachment_url_without_file_id_is_an_error() {
        let student = User {
            id: 1,
            sortable_name: "Doe, Jane".to_string(),
            email: None,
        };
        let s = with_attachment(submission(1, None, None), "http://xyz/uploads/foo.ipynb");
        assert!(unique_filename(&student, &s, "lab1").is_err());
    }
}
