use futures_util::StreamExt;
use memchr::memchr;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(payload: &str, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send(StreamMessage::End);
        return true;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(choice) = response.choices.first() {
                if let Some(content) = &choice.delta.content {
                    let _ = tx.send(StreamMessage::Chunk(content.clone()));
                }
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }

            let formatted_error = format_api_error(None, payload);
            let _ = tx.send(StreamMessage::Error(formatted_error));
            let _ = tx.send(StreamMessage::End);
            true
        }
    }
}

fn process_sse_line(line: &str, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx))
        .unwrap_or(false)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format a provider failure as `API Error: <code> - <message>`.
///
/// The code comes from the error body (`error.code`, then `error.type`) when
/// the provider supplies one, falling back to the HTTP status. The message is
/// the body's `error.message` when present, else the collapsed body text.
fn format_api_error(status: Option<StatusCode>, body: &str) -> String {
    let trimmed = body.trim();
    let parsed = serde_json::from_str::<serde_json::Value>(trimmed).ok();

    let code = parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/code")
                .or_else(|| v.pointer("/error/type"))
        })
        .and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .or_else(|| status.map(|s| s.as_u16().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    let message = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(|v| v.as_str())
        .map(collapse_whitespace)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if trimmed.is_empty() {
                status
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                collapse_whitespace(trimmed)
            }
        });

    format!("API Error: {code} - {message}")
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub api_messages: Vec<ChatMessage>,
    pub cancel_token: CancellationToken,
}

/// Issue a streaming chat-completion request on a background task. Chunk,
/// error, and end events arrive on the returned channel; the channel closing
/// without an End means the task was cancelled.
pub fn spawn_stream(params: StreamParams) -> mpsc::UnboundedReceiver<StreamMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let StreamParams {
            client,
            base_url,
            api_key,
            model,
            api_messages,
            cancel_token,
        } = params;

        let request = ChatRequest {
            model,
            messages: api_messages,
            stream: true,
        };

        tokio::select! {
            _ = run_stream(client, base_url, api_key, request, tx.clone(), cancel_token.clone()) => {}
            _ = cancel_token.cancelled() => {}
        }
    });
    rx
}

async fn run_stream(
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    request: ChatRequest,
    tx: mpsc::UnboundedSender<StreamMessage>,
    cancel_token: CancellationToken,
) {
    let chat_url = construct_api_url(&base_url, "chat/completions");
    let mut http_request = client
        .post(chat_url)
        .header("Content-Type", "application/json");
    if !api_key.is_empty() {
        http_request = http_request.header("Authorization", format!("Bearer {api_key}"));
    }

    match http_request.json(&request).send().await {
        Ok(response) => {
            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                let _ = tx.send(StreamMessage::Error(format_api_error(
                    Some(status),
                    &error_text,
                )));
                let _ = tx.send(StreamMessage::End);
                return;
            }

            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                if cancel_token.is_cancelled() {
                    return;
                }

                match chunk {
                    Ok(chunk_bytes) => {
                        buffer.extend_from_slice(&chunk_bytes);

                        while let Some(newline_pos) = memchr(b'\n', &buffer) {
                            let line = match std::str::from_utf8(&buffer[..newline_pos]) {
                                Ok(s) => s.trim().to_string(),
                                Err(e) => {
                                    tracing::warn!("invalid UTF-8 in stream: {e}");
                                    buffer.drain(..=newline_pos);
                                    continue;
                                }
                            };

                            let should_end = process_sse_line(&line, &tx);
                            buffer.drain(..=newline_pos);
                            if should_end {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamMessage::Error(format_api_error(
                            e.status(),
                            &e.to_string(),
                        )));
                        let _ = tx.send(StreamMessage::End);
                        return;
                    }
                }
            }

            let _ = tx.send(StreamMessage::End);
        }
        Err(e) => {
            let _ = tx.send(StreamMessage::Error(format_api_error(
                e.status(),
                &e.to_string(),
            )));
            let _ = tx.send(StreamMessage::End);
        }
    }
}
