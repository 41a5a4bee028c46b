use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{
    header::HeaderMap,
    multipart::{Form, Part},
    Body, Client,
};
use tracing::debug;

use crate::{
    builder::{Attachment, ConcreteBody, ConcreteRequest},
    error::DispatchError,
};

use super::models::HttpResponse;

/// Sends one request. Consumes it, so any attachment handles are released
/// when the call returns, whatever the outcome.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ConcreteRequest) -> Result<HttpResponse, DispatchError>;
}

pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("colrun/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| DispatchError::Other(err.to_string()))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ConcreteRequest) -> Result<HttpResponse, DispatchError> {
        let ConcreteRequest {
            method,
            url,
            headers,
            basic_auth,
            body,
        } = request;

        let mut builder = self.client.request(method, &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some((username, password)) = basic_auth {
            builder = builder.basic_auth(username, Some(password));
        }

        builder = match body {
            ConcreteBody::None => builder,
            ConcreteBody::Text(text) => builder.body(text),
            ConcreteBody::Json(value) => builder.json(&value),
            ConcreteBody::Form(pairs) => builder.form(&pairs),
            ConcreteBody::Multipart { fields, files } => {
                builder.multipart(multipart_form(fields, files)?)
            }
        };

        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, self.timeout))?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(err, self.timeout))?;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(status, bytes = body.len(), duration_ms, "response received");

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
            duration_ms,
        })
    }
}

fn multipart_form(fields: Vec<(String, String)>, files: Vec<Attachment>) -> Result<Form, DispatchError> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for attachment in files {
        let Attachment {
            field,
            file_name,
            len,
            file,
            ..
        } = attachment;
        let part = Part::stream_with_length(Body::from(tokio::fs::File::from_std(file)), len)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|err| DispatchError::Other(err.to_string()))?;
        form = form.part(field, part);
    }
    Ok(form)
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> DispatchError {
    if err.is_timeout() {
        return DispatchError::Timeout(timeout);
    }
    if err.is_connect() || err.is_request() {
        return DispatchError::Network(err.to_string());
    }
    DispatchError::Other(err.to_string())
}

fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_headers_preserves_values() {
        let mut map = HeaderMap::new();
        map.insert("X-Test", "value".parse().unwrap());
        map.insert("content-type", "application/json".parse().unwrap());

        let headers = collect_headers(&map);
        assert!(headers
            .iter()
            .any(|(name, value)| name == "x-test" && value == "value"));
        assert!(headers
            .iter()
            .any(|(name, value)| name == "content-type" && value == "application/json"));
    }

    #[test]
    fn transport_builds_with_timeout() {
        let transport = ReqwestTransport::new(Duration::from_millis(250)).unwrap();
        assert_eq!(transport.timeout, Duration::from_millis(250));
    }
}
