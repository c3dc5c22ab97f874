//! Outbound calls to the control plane.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use cast_models::rpc::routes::control_plane as routes;
use cast_models::{
    Ack, ErrorBody, HeartbeatRequest, RegisterRequest, SelfStreamRequest, SelfStreamResponse,
};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::retry::{retry_linear, RetryConfig, RetryResult};

/// Attempts made when asking for a self-stream.
pub const SELF_STREAM_RETRIES: u32 = 5;

/// The calls a worker makes to the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn register(&self, request: &RegisterRequest) -> WorkerResult<()>;

    async fn heartbeat(&self, request: &HeartbeatRequest) -> WorkerResult<()>;

    async fn request_self_stream(
        &self,
        request: &SelfStreamRequest,
    ) -> WorkerResult<SelfStreamResponse>;
}

/// JSON-over-HTTP control-plane client.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    base_url: String,
}

impl HttpControlPlane {
    pub fn new(base_url: &str, timeout: Duration) -> WorkerResult<Self> {
        url::Url::parse(base_url).map_err(|e| {
            WorkerError::config_error(format!("invalid control plane URL {}: {}", base_url, e))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> WorkerResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.detail)
                .unwrap_or_else(|_| status.to_string());
            return Err(WorkerError::control_plane(format!(
                "{} returned {}: {}",
                path, status, detail
            )));
        }

        Ok(response.json::<Resp>().await?)
    }

    async fn post_ack<Req>(&self, path: &str, body: &Req) -> WorkerResult<()>
    where
        Req: Serialize + Sync,
    {
        let ack: Ack = self.post(path, body).await?;
        if ack.ok {
            Ok(())
        } else {
            Err(WorkerError::control_plane(format!("{} was not acknowledged", path)))
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn register(&self, request: &RegisterRequest) -> WorkerResult<()> {
        self.post_ack(routes::REGISTER, request).await
    }

    async fn heartbeat(&self, request: &HeartbeatRequest) -> WorkerResult<()> {
        self.post_ack(routes::HEARTBEAT, request).await
    }

    async fn request_self_stream(
        &self,
        request: &SelfStreamRequest,
    ) -> WorkerResult<SelfStreamResponse> {
        self.post(routes::SELF_STREAM, request).await
    }
}

/// Ask which scheduled stream `stream_key` belongs to, retrying with
/// linear backoff. Exhaustion is logged and returned, never fatal.
pub async fn request_self_stream(
    control_plane: &dyn ControlPlane,
    stream_key: &str,
    unit: Duration,
    cancel: &CancellationToken,
) -> WorkerResult<SelfStreamResponse> {
    let config = RetryConfig::new("self-stream request")
        .with_budget(SELF_STREAM_RETRIES)
        .with_unit(unit)
        .with_cancel(cancel.clone());
    let request = SelfStreamRequest {
        stream_key: stream_key.to_string(),
    };
    let request = &request;

    let result = retry_linear(&config, move |_| async move {
        let response = control_plane.request_self_stream(request).await;
        if response.is_err() {
            metrics::record_control_plane_failure("self_stream");
        }
        response
    })
    .await;

    match result {
        RetryResult::Success(response) => Ok(response),
        RetryResult::Cancelled { .. } => Err(WorkerError::cancelled("self-stream request")),
        RetryResult::Failed { error, attempts } => {
            error!(
                "Giving up on self-stream request after {} attempts: {}",
                attempts, error
            );
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ControlPlane for Flaky {
        async fn register(&self, _: &RegisterRequest) -> WorkerResult<()> {
            Ok(())
        }

        async fn heartbeat(&self, _: &HeartbeatRequest) -> WorkerResult<()> {
            Ok(())
        }

        async fn request_self_stream(
            &self,
            _: &SelfStreamRequest,
        ) -> WorkerResult<SelfStreamResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(WorkerError::control_plane("unreachable"));
            }
            Ok(SelfStreamResponse {
                stream: 3,
                course: 4,
                version: Default::default(),
                end: chrono::Utc::now(),
                upload_vod: false,
            })
        }
    }

    #[tokio::test]
    async fn test_self_stream_retries_then_succeeds() {
        let cp = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let response = request_self_stream(
            &cp,
            "key",
            Duration::from_millis(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(response.stream, 3);
        assert_eq!(cp.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_self_stream_exhaustion_is_an_error() {
        let cp = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let err = request_self_stream(
            &cp,
            "key",
            Duration::from_millis(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkerError::ControlPlane(_)));
        assert_eq!(cp.calls.load(Ordering::SeqCst), SELF_STREAM_RETRIES);
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(HttpControlPlane::new("not a url", Duration::from_secs(1)).is_err());
        let cp = HttpControlPlane::new("http://gocast:50056/", Duration::from_secs(1)).unwrap();
        assert_eq!(cp.base_url(), "http://gocast:50056");
    }
}
