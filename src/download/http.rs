//! HTTP fetch client (spec.md §4.4 "Request"/"Response capture").
//!
//! Uses `reqwest` with rustls, gzip and deflate decompression, and streaming
//! bodies — the crate and feature set the retrieved `thalamiq-zunder` server
//! and several pack manifests use for outbound HTTP with compression support;
//! none of the teacher candidates needed an HTTP client of their own, so this
//! one is adopted from the wider pack (see `DESIGN.md`).

use std::time::Duration;

use chrono::Utc;
use futures_core::Stream;
use reqwest::{Client, Response};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::OpenOptions;
use crate::entity::resource::ResponseMetadata;
use crate::error::CrystalError;

pub fn build_client(options: &OpenOptions) -> Result<Client, CrystalError> {
    Client::builder()
        .user_agent(options.user_agent.clone())
        .connect_timeout(options.connect_timeout)
        .gzip(true)
        .deflate(true)
        .build()
        .map_err(CrystalError::from)
}

pub struct FetchOutcome {
    pub metadata: ResponseMetadata,
    pub body: Vec<u8>,
}

/// spec.md §4.4 step 2: "issue a GET... Timeout: configurable; default 10s
/// to first byte, then body has unlimited duration but is aborted if
/// transfer stalls > 30s." `cookie_header` is the project-wide merged
/// cookie header, if any.
pub async fn fetch(
    client: &Client,
    url: &str,
    cookie_header: Option<&str>,
    stall_timeout: Duration,
) -> Result<FetchOutcome, CrystalError> {
    let mut request = client.get(url);
    if let Some(cookie) = cookie_header {
        request = request.header(reqwest::header::COOKIE, cookie);
    }
    let response = request.send().await?;
    let metadata = response_metadata(&response);

    let body = read_body_with_stall_timeout(response, stall_timeout).await?;
    Ok(FetchOutcome { metadata, body })
}

fn response_metadata(response: &Response) -> ResponseMetadata {
    let http_version = match response.version() {
        reqwest::Version::HTTP_10 => 10,
        _ => 11,
    };
    let status_code = response.status().as_u16();
    let reason_phrase = response
        .status()
        .canonical_reason()
        .unwrap_or("")
        .to_string();
    let mut headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();

    // RFC 7231 §7.1.1.2: populate Date if the origin omitted it.
    if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("date")) {
        headers.push(("date".to_string(), Utc::now().to_rfc2822()));
    }

    ResponseMetadata {
        http_version,
        status_code,
        reason_phrase,
        headers,
    }
}

async fn read_body_with_stall_timeout(
    response: Response,
    stall_timeout: Duration,
) -> Result<Vec<u8>, CrystalError> {
    use futures::StreamExt;

    let mut buffer = Vec::new();
    let mut stream = response.bytes_stream();
    loop {
        match tokio::time::timeout(stall_timeout, stream.next()).await {
            Ok(Some(Ok(chunk))) => buffer.extend_from_slice(&chunk),
            Ok(Some(Err(e))) => return Err(CrystalError::from(e)),
            Ok(None) => break,
            Err(_) => {
                return Err(CrystalError::DownloadTimeout(format!(
                    "transfer stalled for more than {stall_timeout:?}"
                )))
            }
        }
    }
    Ok(buffer)
}

/// spec.md §4.4 step 3: "write body to temp via `copy_large(reader,
/// writer)` that reuses a single buffer". Generalized from the teacher's
/// sync single-reused-buffer copy discipline to an async `tokio::io::copy`
/// over a streamed body.
pub async fn copy_large<S, W>(mut stream: S, mut writer: W) -> Result<u64, CrystalError>
where
    S: Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
    W: AsyncWrite + Unpin,
{
    use futures::StreamExt;

    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(CrystalError::from)?;
        writer.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    writer.flush().await?;
    Ok(total)
}
