use std::time::Duration;

use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use stockpost_domain::{ErpConfig, StockpostError};
use tracing::debug;

use crate::errors::InfraError;

const LOGIN_ATTEMPTS: u32 = 3;
const LOGIN_BACKOFF: Duration = Duration::from_millis(250);

/// Transport for Service Layer calls.
///
/// Two delivery modes exist. [`send_login`](Self::send_login) may repeat the
/// request, since a login creates nothing on the ERP side. Document POSTs go
/// through [`send_once`](Self::send_once) and are never repeated here.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    login_attempts: u32,
    login_backoff: Duration,
}

impl HttpClient {
    /// Build a client for the configured Service Layer endpoint.
    pub fn for_erp(config: &ErpConfig) -> Result<Self, StockpostError> {
        let client = ReqwestClient::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("stockpost/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .no_proxy()
            .build()
            .map_err(into_domain)?;

        Ok(Self { client, login_attempts: LOGIN_ATTEMPTS, login_backoff: LOGIN_BACKOFF })
    }

    /// Shorten the pause between login attempts.
    #[cfg(test)]
    fn with_login_backoff(mut self, backoff: Duration) -> Self {
        self.login_backoff = backoff;
        self
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Send a login request, repeating it while the server is unreachable
    /// or answers with a gateway error.
    pub async fn send_login(&self, builder: RequestBuilder) -> Result<Response, StockpostError> {
        let mut attempt = 1;
        loop {
            let request = builder.try_clone().ok_or_else(|| {
                StockpostError::Internal("login request is not repeatable".into())
            })?;

            let last = attempt >= self.login_attempts;
            match self.execute(request, attempt).await {
                Ok(response) if !last && is_gateway_error(response.status()) => {}
                Ok(response) => return Ok(response),
                Err(err) if !last && is_transient(&err) => {}
                Err(err) => return Err(into_domain(err)),
            }

            tokio::time::sleep(self.login_backoff.saturating_mul(attempt)).await;
            attempt += 1;
        }
    }

    /// Send the request exactly once, whatever the outcome.
    pub async fn send_once(&self, builder: RequestBuilder) -> Result<Response, StockpostError> {
        self.execute(builder, 1).await.map_err(into_domain)
    }

    async fn execute(
        &self,
        builder: RequestBuilder,
        attempt: u32,
    ) -> Result<Response, reqwest::Error> {
        let request = builder.build()?;
        let method = request.method().clone();
        let path = request.url().path().to_string();

        match self.client.execute(request).await {
            Ok(response) => {
                debug!(attempt, %method, path, status = %response.status(), "ERP HTTP response");
                Ok(response)
            }
            Err(err) => {
                debug!(attempt, %method, path, error = %err, "ERP HTTP request failed");
                Err(err)
            }
        }
    }
}

/// The Service Layer sits behind a load balancer that answers 502-504 while
/// it restarts.
fn is_gateway_error(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn into_domain(err: reqwest::Error) -> StockpostError {
    StockpostError::from(InfraError::from(err))
}
