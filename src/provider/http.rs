use super::report::StatusReport;
use super::StatusProvider;
use crate::error::{ProgressError, ProgressResult};
use crate::pipeline::RunId;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls `GET {base_url}/api/task/{run_id}` on the task manager
pub struct HttpStatusProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpStatusProvider {
    /// Create a provider for the task manager at `base_url`
    ///
    /// # Errors
    /// Returns `ProgressError::InvalidConfig` if the URL does not parse or
    /// cannot carry a path, and `ProgressError::Network` if the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str) -> ProgressResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> ProgressResult<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ProgressError::InvalidConfig(format!(
                "status URL cannot carry a path: {}",
                base_url
            )));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    /// Full status URL for a run
    pub fn status_url(&self, run_id: &RunId) -> ProgressResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ProgressError::InvalidConfig(format!(
                    "status URL cannot carry a path: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["api", "task", run_id.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl StatusProvider for HttpStatusProvider {
    async fn fetch_status(&self, run_id: &RunId) -> ProgressResult<StatusReport> {
        let url = self.status_url(run_id)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProgressError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let report = response.json::<StatusReport>().await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RemoteStatus;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response on a local port
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_status_url() {
        let provider = HttpStatusProvider::new("http://localhost:5000").unwrap();
        let url = provider.status_url(&RunId::new("abc-123")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/task/abc-123");
    }

    #[test]
    fn test_status_url_with_prefix_and_trailing_slash() {
        let provider = HttpStatusProvider::new("https://example.com/labeling/").unwrap();
        let url = provider.status_url(&RunId::new("t 1")).unwrap();
        assert_eq!(url.as_str(), "https://example.com/labeling/api/task/t%201");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpStatusProvider::new("not a url"),
            Err(ProgressError::InvalidConfig(_))
        ));
        assert!(matches!(
            HttpStatusProvider::new("mailto:ops@example.com"),
            Err(ProgressError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_running_status() {
        let base = serve_once(
            "200 OK",
            r#"{"task_id": "t-1", "status": "processing", "progress": 40.0, "current_step": "classifier"}"#,
        )
        .await;
        let provider = HttpStatusProvider::new(&base).unwrap();

        let report = provider.fetch_status(&RunId::new("t-1")).await.unwrap();
        assert_eq!(report.status, RemoteStatus::Running);
        assert_eq!(report.progress, Some(40.0));
        assert_eq!(report.current_step.as_deref(), Some("classifier"));
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let base = serve_once("404 Not Found", r#"{"error": "Task not found"}"#).await;
        let provider = HttpStatusProvider::new(&base).unwrap();

        let err = provider.fetch_status(&RunId::new("gone")).await.unwrap_err();
        match err {
            ProgressError::HttpStatus { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("Task not found"));
            }
            other => panic!("Expected HttpStatus error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_undecodable_body() {
        let base = serve_once("200 OK", r#"{"state": "odd"}"#).await;
        let provider = HttpStatusProvider::new(&base).unwrap();

        let err = provider.fetch_status(&RunId::new("t-2")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = HttpStatusProvider::new(&format!("http://{}", addr)).unwrap();
        let err = provider.fetch_status(&RunId::new("t-3")).await.unwrap_err();
        assert!(matches!(err, ProgressError::Network(_)));
    }
}
