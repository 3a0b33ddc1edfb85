use crate::offline::{FetchError, FetchRequest, FetchResponse, Fetcher, OfflineWorker};
use crate::proxy::{
    AnalyzeRequest, AnalyzeResponse, ErrorBody, QuizRequest, QuizResponse, SummaryRequest,
    SummaryResponse,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Network(#[from] FetchError),
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// How the client reaches the proxy.
pub trait ApiTransport: Send + Sync {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalyzeRequest,
    ) -> BoxFuture<'a, Result<AnalyzeResponse, ClientError>>;

    fn quiz<'a>(&'a self, request: &'a QuizRequest)
    -> BoxFuture<'a, Result<QuizResponse, ClientError>>;

    fn summary<'a>(
        &'a self,
        request: &'a SummaryRequest,
    ) -> BoxFuture<'a, Result<SummaryResponse, ClientError>>;

    fn health(&self) -> BoxFuture<'_, Result<bool, ClientError>>;

    /// Called once on start-up; transports with an offline cache install it here.
    fn prepare_offline(&self) -> BoxFuture<'_, ()> {
        async {}.boxed()
    }
}

/// JSON-over-HTTP transport. Every request passes through the offline worker.
pub struct HttpTransport<F> {
    worker: OfflineWorker<F>,
}

impl<F: Fetcher> HttpTransport<F> {
    pub fn new(worker: OfflineWorker<F>) -> Self {
        Self { worker }
    }

    pub fn worker(&self) -> &OfflineWorker<F> {
        &self.worker
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_string(body)?;
        let response = self
            .worker
            .handle(&FetchRequest::post_json(path, payload))
            .await?;
        decode(response)
    }
}

fn decode<T: DeserializeOwned>(response: FetchResponse) -> Result<T, ClientError> {
    if !response.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&response.body)
            .map(|body| body.error)
            .unwrap_or_else(|_| format!("Request failed with status {}", response.status));
        return Err(ClientError::Server {
            status: response.status,
            message,
        });
    }
    Ok(serde_json::from_str(&response.body)?)
}

impl<F: Fetcher> ApiTransport for HttpTransport<F> {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalyzeRequest,
    ) -> BoxFuture<'a, Result<AnalyzeResponse, ClientError>> {
        self.post("/api/analyze", request).boxed()
    }

    fn quiz<'a>(
        &'a self,
        request: &'a QuizRequest,
    ) -> BoxFuture<'a, Result<QuizResponse, ClientError>> {
        self.post("/api/quiz", request).boxed()
    }

    fn summary<'a>(
        &'a self,
        request: &'a SummaryRequest,
    ) -> BoxFuture<'a, Result<SummaryResponse, ClientError>> {
        self.post("/api/summary", request).boxed()
    }

    fn health(&self) -> BoxFuture<'_, Result<bool, ClientError>> {
        async move {
            let response = self.worker.handle(&FetchRequest::get("/api/health")).await?;
            let body: serde_json::Value = decode(response)?;
            Ok(body.get("status").and_then(|s| s.as_str()) == Some("ok"))
        }
        .boxed()
    }

    fn prepare_offline(&self) -> BoxFuture<'_, ()> {
        async move {
            if let Err(err) = self.worker.install().await {
                warn!(error = %err, "offline shell not cached");
                return;
            }
            self.worker.activate();
        }
        .boxed()
    }
}
