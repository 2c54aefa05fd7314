//! Authenticated HTTP client for the Canvas web API
//!
//! All requests go to `https://<base>/api/v1/...` with a bearer access
//! token. List endpoints are paginated via the `Link` response header;
//! pages are followed until no `rel="next"` remains.

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, LINK};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canvas::types::{Assignment, Course, Submission, User};
use crate::config::Config;

const PER_PAGE: &str = "100";

/// Canvas error payload: `{"errors": [{"message": "..."}]}`
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorMessage>,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Builds the error for a non-2xx response, pulling the message out of the
/// Canvas error body when there is one.
async fn api_error(path: &str, status: StatusCode, response: reqwest::Response) -> anyhow::Error {
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.errors.into_iter().next());
    match detail {
        Some(error) => anyhow!(
            "Canvas returned HTTP {status} for {path}: {}",
            error.message
        ),
        None => anyhow!("Canvas returned HTTP {status} for {path}"),
    }
}

/// Connection to one Canvas instance
pub struct CanvasClient {
    http: reqwest::Client,
    base_url: String,
}

impl CanvasClient {
    /// Builds a client for the given instance and access token.
    pub fn new(canvas_url: &str, canvas_token: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {canvas_token}"))
            .context("canvas_token is not a valid header value")?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: canvas_url.trim_end_matches('/').to_string(),
        })
    }

    /// Builds a client from resolved configuration, failing with the
    /// specific config error when the URL or token is missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let (url, token) = config.credentials()?;
        Self::new(url, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a single JSON resource.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.api_url(path);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(path, status, response).await);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode response from {path}"))
    }

    /// GET a paginated collection, following `Link: rel="next"` headers.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let first = self.api_url(path);
        debug!(url = %first, "GET (paginated)");
        let mut request = self
            .http
            .get(&first)
            .query(query)
            .query(&[("per_page", PER_PAGE)]);

        let mut results = Vec::new();
        loop {
            let response = request
                .send()
                .await
                .with_context(|| format!("request to {path} failed"))?;

            let status = response.status();
            if !status.is_success() {
                return Err(api_error(path, status, response).await);
            }

            let next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_next_link);

            let mut page: Vec<T> = response
                .json()
                .await
                .with_context(|| format!("failed to decode response from {path}"))?;
            results.append(&mut page);

            match next {
                // The next URL already carries the query parameters
                Some(url) => {
                    debug!(%url, "GET (next page)");
                    request = self.http.get(url);
                }
                None => break,
            }
        }
        Ok(results)
    }

    /// PUT a form-encoded update to an API path.
    async fn put_form<T: Serialize + ?Sized>(&self, path: &str, form: &T) -> Result<()> {
        let url = self.api_url(path);
        debug!(%url, "PUT");
        let response = self
            .http
            .put(&url)
            .form(form)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(path, status, response).await);
        }
        Ok(())
    }

    /// Lists the courses visible to the authenticated user.
    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        self.get_paginated("courses", &[]).await
    }

    /// Fetches the authenticated user. Fails on a bad URL or token, which
    /// makes it the connection check.
    pub async fn current_user(&self) -> Result<User> {
        self.get_json("users/self").await
    }

    pub async fn get_course(&self, course_id: u64) -> Result<Course> {
        self.get_json(&format!("courses/{course_id}")).await
    }

    /// Lists the users registered as students in a course.
    pub async fn list_students(&self, course_id: u64) -> Result<Vec<User>> {
        self.get_paginated(
            &format!("courses/{course_id}/users"),
            &[("enrollment_type[]", "student")],
        )
        .await
    }

    pub async fn get_assignment(&self, course_id: u64, assignment_id: u64) -> Result<Assignment> {
        self.get_json(&format!("courses/{course_id}/assignments/{assignment_id}"))
            .await
    }

    pub async fn list_submissions(
        &self,
        course_id: u64,
        assignment_id: u64,
    ) -> Result<Vec<Submission>> {
        self.get_paginated(
            &format!("courses/{course_id}/assignments/{assignment_id}/submissions"),
            &[],
        )
        .await
    }

    pub async fn get_submission(
        &self,
        course_id: u64,
        assignment_id: u64,
        user_id: u64,
    ) -> Result<Submission> {
        self.get_json(&format!(
            "courses/{course_id}/assignments/{assignment_id}/submissions/{user_id}"
        ))
        .await
    }

    /// Edits a submission: post a grade, a comment, or both.
    pub async fn edit_submission(
        &self,
        course_id: u64,
        assignment_id: u64,
        user_id: u64,
        params: &[(&str, String)],
    ) -> Result<()> {
        self.put_form(
            &format!("courses/{course_id}/assignments/{assignment_id}/submissions/{user_id}"),
            params,
        )
        .await
    }

    /// Downloads an attachment by its pre-signed URL. These URLs are
    /// absolute and carry their own authorization.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!(%url, "GET (download)");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("download from {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("download from {url} returned HTTP {status}"));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Extracts the `rel="next"` URL from a `Link` header value.
fn parse_next_link(header: &str) -> Option<String> {
    for part in header.split(',') {
        let mut sections = part.trim().split(';');
        let url = match sections.next() {
            Some(url) => url.trim(),
            None => continue,
        };
        if !url.starts_with('<') || !url.ends_with('>') {
            continue;
        }
        if sections.any(|param| param.trim() == "rel=\"next\"") {
            return Some(url[1..url.len() - 1].to_string());
        }
    }
    None
}
