// Dashboard HTTP client
//
// What a dashboard session does against the server: fetch the call log,
// send mutations and follow the live channel.

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::call_log::{CallLogRecord, NewCallLog};
use crate::dashboard::BroadcastEvent;
use crate::reconcile::LogCache;
use crate::stats::LogQuery;
use crate::{CallboardError, Result};

#[derive(Clone, Debug)]
pub struct DashboardClient {
    http: reqwest::Client,
    base_url: String,
}

impl DashboardClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn fetch_logs(&self, query: &LogQuery) -> Result<Vec<CallLogRecord>> {
        let response = self.http.get(self.url("/api/logs")).query(query).send().await?;
        Ok(check(response, None).await?.json().await?)
    }

    /// Returns the id assigned to the new record
    pub async fn create(&self, request: &NewCallLog) -> Result<i64> {
        let response = self.http.post(self.url("/api/logs")).json(request).send().await?;
        let body: Value = check(response, None).await?.json().await?;
        body.get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| CallboardError::Storage("create response without id".into()))
    }

    pub async fn hide(&self, id: i64) -> Result<()> {
        let response = self
            .http
            .post(self.url("/api/logs/hide"))
            .query(&[("id", id)])
            .send()
            .await?;
        check(response, Some(id)).await?;
        Ok(())
    }

    pub async fn annotate(&self, id: i64, text: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url("/api/logs/note"))
            .json(&json!({ "id": id, "text": text }))
            .send()
            .await?;
        check(response, Some(id)).await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let response = self
            .http
            .delete(self.url("/api/logs/delete"))
            .query(&[("id", id)])
            .send()
            .await?;
        check(response, Some(id)).await?;
        Ok(())
    }

    /// Follow the live channel. The stream ends when the server closes it.
    pub async fn events(&self) -> Result<impl Stream<Item = BroadcastEvent>> {
        let response = self.http.get(self.url("/api/events")).send().await?;
        let mut body = Box::pin(check(response, None).await?.bytes_stream());

        Ok(async_stream::stream! {
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(target: "dashboard", error = %e, "Live channel read failed");
                        break;
                    }
                };
                for data in decoder.push(&chunk) {
                    match serde_json::from_str::<BroadcastEvent>(&data) {
                        Ok(event) => yield event,
                        Err(e) => warn!(target: "dashboard", error = %e, "Ignoring malformed event"),
                    }
                }
            }
            debug!(target: "dashboard", "Live channel ended");
        })
    }
}

async fn check(response: reqwest::Response, id: Option<i64>) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| status.to_string());

    Err(match (status, id) {
        (StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, _) => {
            CallboardError::Validation(message)
        }
        (StatusCode::NOT_FOUND, Some(id)) => CallboardError::NotFound(id),
        _ => CallboardError::Storage(format!("{status}: {message}")),
    })
}

/// Incremental decoder for `text/event-stream` bodies
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes; returns the `data` of every frame completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = find(&self.buffer, b"\n\n") {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&frame[..end]);
            let data: Vec<&str> = text
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|d| d.strip_prefix(' ').unwrap_or(d))
                .collect();
            if !data.is_empty() {
                frames.push(data.join("\n"));
            }
        }
        frames
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// A dashboard's view of the call log kept in step with the server
pub struct DashboardSession {
    client: DashboardClient,
    cache: LogCache,
}

impl DashboardSession {
    pub fn new(client: DashboardClient) -> Self {
        Self {
            client,
            cache: LogCache::new(),
        }
    }

    pub fn client(&self) -> &DashboardClient {
        &self.client
    }

    pub fn cache(&self) -> &LogCache {
        &self.cache
    }

    /// Refetch everything, hidden records included, and merge it in
    pub async fn refresh(&mut self) -> Result<()> {
        let snapshot = self
            .client
            .fetch_logs(&LogQuery::including_hidden())
            .await?;
        self.cache.reconcile(snapshot);
        Ok(())
    }

    /// Returns whether the event caused a refetch
    pub async fn handle_event(&mut self, event: &BroadcastEvent) -> Result<bool> {
        if !LogCache::needs_refetch(event) {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    pub fn edit_note(&mut self, id: i64, text: impl Into<String>) -> bool {
        self.cache.begin_note_edit(id, text)
    }

    /// Send the pending note for `id`; a no-op when nothing is being edited
    pub async fn save_note(&mut self, id: i64) -> Result<()> {
        let Some(text) = self.cache.pending_note(id).map(str::to_string) else {
            return Ok(());
        };
        self.client.annotate(id, &text).await?;
        self.cache.note_saved(id, text);
        Ok(())
    }
}
