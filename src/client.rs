//! HTTP client for the agent server API.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::stream;
use crate::types::{AgentRunRequest, ArtifactUpload, Content, Event, Session};

/// HTTP client for the agent server.
///
/// Holds the connection scope for one command invocation: the underlying
/// pool is acquired at construction and released when the client drops,
/// on every exit path.
///
/// # Example
///
/// ```rust,no_run
/// use agentctl::ApiClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::new("http://localhost:8000")?;
/// let apps = client.list_apps().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the server (e.g., "http://localhost:8000")
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
        })
    }

    /// Create a new client with a custom reqwest client.
    pub fn with_client(base_url: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self { base_url, http })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ─────────────────────────────────────────────────────────────────────────
    // App management
    // ─────────────────────────────────────────────────────────────────────────

    /// List all available apps.
    pub async fn list_apps(&self) -> Result<Vec<String>> {
        self.get_json("/list-apps").await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session management
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new session, optionally with a fixed id and initial state.
    pub async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        state: Option<Value>,
    ) -> Result<Session> {
        let path = match session_id {
            Some(id) => format!("/apps/{app_name}/users/{user_id}/sessions/{id}"),
            None => format!("/apps/{app_name}/users/{user_id}/sessions"),
        };
        let body = match state {
            Some(state) => serde_json::json!({ "state": state }),
            None => serde_json::json!({}),
        };
        self.post_json(&path, &body).await
    }

    /// Get session details.
    pub async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session> {
        self.get_json(&format!(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}"
        ))
        .await
    }

    /// List all sessions for a user.
    pub async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<Session>> {
        self.get_json(&format!("/apps/{app_name}/users/{user_id}/sessions"))
            .await
    }

    /// Delete a session.
    pub async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<()> {
        self.delete(&format!(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}"
        ))
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agent interaction
    // ─────────────────────────────────────────────────────────────────────────

    /// Run the agent with a message and collect the full event sequence.
    pub async fn run_agent(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        message: &str,
        streaming: bool,
    ) -> Result<Vec<Event>> {
        let request = run_request(app_name, user_id, session_id, message, streaming);
        self.post_json("/run", &request).await
    }

    /// Run the agent with a streaming response.
    ///
    /// Text fragments are written to `out` as they decode; the return
    /// value is their concatenation. A non-success initiating response
    /// surfaces as [`Error::Api`] before any frame is processed.
    pub async fn run_agent_streaming<W>(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        message: &str,
        out: &mut W,
    ) -> Result<String>
    where
        W: AsyncWrite + Unpin,
    {
        let request = run_request(app_name, user_id, session_id, message, true);
        let url = self.url("/run_sse");
        debug!(%url, "POST (streaming)");
        let response = self.http.post(url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        stream::decode_event_stream(response.bytes_stream(), out).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Artifact management
    // ─────────────────────────────────────────────────────────────────────────

    /// List artifacts for a session.
    pub async fn list_artifacts(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<String>> {
        self.get_json(&format!(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts"
        ))
        .await
    }

    /// Get an artifact, optionally at a specific version.
    ///
    /// A JSON body is returned structured; any other content type comes
    /// back wrapped as `{"text": <body>}`.
    pub async fn get_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        artifact_name: &str,
        version: Option<u32>,
    ) -> Result<Value> {
        let base =
            format!("/apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts/{artifact_name}");
        let path = match version {
            Some(v) => format!("{base}/versions/{v}"),
            None => base,
        };
        let url = self.url(&path);
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        Self::handle_json_or_text(response).await
    }

    /// Upload a local file as an artifact.
    pub async fn upload_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        file_path: &Path,
        artifact_name: Option<&str>,
    ) -> Result<ArtifactUpload> {
        let bytes = tokio::fs::read(file_path).await?;
        let filename = artifact_name.map(str::to_owned).unwrap_or_else(|| {
            file_path
                .file_name()
                .map_or_else(|| "artifact".to_owned(), |n| n.to_string_lossy().into_owned())
        });
        let mime = mime_guess::from_path(file_path).first_or_octet_stream();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str(mime.as_ref())?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(name) = artifact_name {
            form = form.text("filename", name.to_owned());
        }

        let url = self.url(&format!(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts/upload"
        ));
        debug!(%url, "POST (multipart)");
        let response = self.http.post(url).multipart(form).send().await?;
        Self::handle_response(response).await
    }

    /// Delete an artifact.
    pub async fn delete_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        artifact_name: &str,
    ) -> Result<()> {
        self.delete(&format!(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}/artifacts/{artifact_name}"
        ))
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Evaluation management
    // ─────────────────────────────────────────────────────────────────────────

    /// List evaluation sets for an app.
    pub async fn list_eval_sets(&self, app_name: &str) -> Result<Vec<String>> {
        self.get_json(&format!("/apps/{app_name}/eval_sets")).await
    }

    /// Create an evaluation set.
    pub async fn create_eval_set(&self, app_name: &str, eval_set_id: &str) -> Result<()> {
        let url = self.url(&format!("/apps/{app_name}/eval_sets/{eval_set_id}"));
        debug!(%url, "POST");
        let response = self.http.post(url).send().await?;
        Self::handle_empty(response).await
    }

    /// List evaluations in a set.
    pub async fn list_evals_in_set(
        &self,
        app_name: &str,
        eval_set_id: &str,
    ) -> Result<Vec<String>> {
        self.get_json(&format!("/apps/{app_name}/eval_sets/{eval_set_id}/evals"))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a resource path to the base URL, keeping any path prefix
    /// the base carries (`http://host/api` + `/run` = `http://host/api/run`).
    fn url(&self, path: &str) -> Url {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}")).unwrap_or_else(|_| self.base_url.clone())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        Self::handle_response(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        Self::handle_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        debug!(%url, "DELETE");
        let response = self.http.delete(url).send().await?;
        Self::handle_empty(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    /// Success with a body we don't inspect (delete-style operations).
    async fn handle_empty(response: reqwest::Response) -> Result<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::api_error(response).await)
        }
    }

    /// Parse a JSON body as structured data; wrap any other content type
    /// as `{"text": <body>}`.
    async fn handle_json_or_text(response: reqwest::Response) -> Result<Value> {
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            Ok(response.json().await?)
        } else {
            Ok(serde_json::json!({ "text": response.text().await? }))
        }
    }

    async fn api_error(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".into());
        Error::Api { status, message }
    }
}

fn run_request(
    app_name: &str,
    user_id: &str,
    session_id: &str,
    message: &str,
    streaming: bool,
) -> AgentRunRequest {
    AgentRunRequest {
        app_name: app_name.to_owned(),
        user_id: user_id.to_owned(),
        session_id: session_id.to_owned(),
        new_message: Content::user_text(message),
        streaming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_paths_against_base() {
        let client = ApiClient::new("http://localhost:8000").unwrap();
        assert_eq!(
            client.url("/apps/a/users/u/sessions").as_str(),
            "http://localhost:8000/apps/a/users/u/sessions"
        );
    }

    #[test]
    fn url_keeps_base_path_prefix() {
        let client = ApiClient::new("http://localhost:8000/api/v1/").unwrap();
        assert_eq!(
            client.url("/list-apps").as_str(),
            "http://localhost:8000/api/v1/list-apps"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            ApiClient::new("not a url"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn identifiers_are_passed_through_opaque() {
        let client = ApiClient::new("http://localhost:8000").unwrap();
        // Identifier validation belongs to the server.
        let url = client.url("/apps/my app/users/u-1/sessions/s~2");
        assert!(url.path().contains("users/u-1"));
    }
}
