use crate::{HttpRequest, RemoteError, Transport};
use std::io::Read;
use ureq::http::{Method, Request};

/// Blocking HTTP client for remote sources.
///
/// Status codes are inspected here rather than by `ureq`, so that a non-2xx
/// response still yields its body for the error message.
pub struct HttpClient {
    agent: ureq::Agent,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn build(&self, request: &HttpRequest) -> Result<ureq::http::request::Builder, RemoteError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| RemoteError::InvalidMethod(request.method.clone()))?;
        let mut builder = Request::builder().method(method).uri(&request.url);
        for (key, values) in &request.header {
            for value in values {
                builder = builder.header(key.as_str(), value.as_str());
            }
        }
        Ok(builder)
    }
}

impl Transport for HttpClient {
    fn fetch(&self, request: &HttpRequest) -> Result<Vec<u8>, RemoteError> {
        let builder = self.build(request)?;
        tracing::debug!("{} {}", request.method, request.url);

        let result = if request.body.is_empty() {
            let req = builder
                .body(())
                .map_err(|e| RemoteError::Http(e.to_string()))?;
            self.agent.run(req)
        } else {
            let req = builder
                .body(request.body.clone().into_bytes())
                .map_err(|e| RemoteError::Http(e.to_string()))?;
            self.agent.run(req)
        };
        let resp = result.map_err(|e| RemoteError::Http(e.to_string()))?;

        let code = resp.status().as_u16();
        let mut body = Vec::new();
        resp.into_body().into_reader().read_to_end(&mut body)?;

        if !(200..300).contains(&code) {
            return Err(RemoteError::Status {
                url: request.url.clone(),
                method: request.method.clone(),
                code,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        tracing::debug!("{} {} -> {code} ({} bytes)", request.method, request.url, body.len());
        Ok(body)
    }
}
