use crate::config::DEFAULT_USER_AGENT;
use crate::net::Response;
use http::HeaderMap;
use lazy_static::lazy_static;
use url::Url;

lazy_static! {
    // Shared client so connections are reused across requests
    static ref CLIENT: reqwest::Client = reqwest::Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .unwrap_or_default();
}

/// A single buffered request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: http::Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: http::Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

// Loads an URL and returns the response in a result if any
pub async fn fetch(request: FetchRequest) -> Result<Response, reqwest::Error> {
    let mut builder = CLIENT
        .request(request.method, request.url)
        .headers(request.headers);
    if let Some(body) = request.body {
        builder = builder.body(body);
    }
    let res = builder.send().await?;

    // Fetch results
    let final_url = res.url().clone();
    let status = res.status().as_u16();
    let status_text = res.status().canonical_reason().unwrap_or("Unknown").to_string();
    let headers = res.headers().clone();

    // Fetch body. We don't do streaming yet
    let body = res.bytes().await?.to_vec();

    Ok(Response {
        url: final_url,
        status,
        status_text,
        headers,
        body,
    })
}
