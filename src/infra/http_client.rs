use crate::app::ports::{HttpClientPort, HttpMethod, HttpRequest, HttpResponse};
use crate::common::error::Result;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

const USER_AGENT: &str = concat!("roxie_scraper/", env!("CARGO_PKG_VERSION"));

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, String> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse { status, bytes, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ScraperError;

    #[test]
    fn test_builds_with_timeout() {
        assert!(ReqwestHttp::new(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_reqwest_errors_convert_to_http_variant() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(matches!(ScraperError::from(err), ScraperError::Http(_)));
    }
}
