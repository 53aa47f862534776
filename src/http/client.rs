use std::time::Duration;

use ::http::{Request, Response};
use reqwest::blocking::{Client, Response as BlockingResponse};

use crate::http::breaker::CircuitBreaker;
use crate::http_client::{HttpClient as DashboardHttpClient, HttpClientError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const BREAKER_FAILURE_THRESHOLD: u32 = 5;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(30);

/// Blocking reqwest-backed client used against the dashboard, fronted by a
/// circuit breaker.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    breaker: CircuitBreaker,
}

impl HttpClient {
    pub fn new() -> Result<Self, HttpBuildError> {
        let builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_native_certs(true)
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_TIMEOUT);

        let client = builder
            .build()
            .map_err(|err| HttpBuildError::ClientBuilder(err.to_string()))?;

        Ok(Self {
            client,
            breaker: CircuitBreaker::new(BREAKER_FAILURE_THRESHOLD, BREAKER_COOLDOWN),
        })
    }

    fn send_inner(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError> {
        let req = self
            .client
            .request(request.method().into(), request.uri().to_string().as_str())
            .headers(request.headers().clone())
            .body(request.body().to_vec());

        let res = req
            .send()
            .map_err(|err| HttpClientError::TransportError(err.to_string()))?;

        try_build_response(res)
    }
}

fn try_build_response(res: BlockingResponse) -> Result<Response<Vec<u8>>, HttpClientError> {
    let status = res.status();
    let version = res.version();
    let headers = res.headers().clone();

    let body: Vec<u8> = res
        .bytes()
        .map_err(|err| HttpClientError::InvalidResponse(err.to_string()))?
        .into();

    let mut response_builder = Response::builder().status(status).version(version);
    // The expiry detector needs the response headers.
    if let Some(header_map) = response_builder.headers_mut() {
        *header_map = headers;
    }

    response_builder
        .body(body)
        .map_err(|err| HttpClientError::InvalidResponse(err.to_string()))
}

impl DashboardHttpClient for HttpClient {
    fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError> {
        self.breaker.check()?;

        match self.send_inner(req) {
            Ok(response) => {
                self.breaker.record_success();
                Ok(response)
            }
            Err(err) => {
                if matches!(err, HttpClientError::TransportError(_)) {
                    self.breaker.record_failure();
                }
                Err(err)
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HttpBuildError {
    #[error("could not build the http client: {0}")]
    ClientBuilder(String),
}
