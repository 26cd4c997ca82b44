//! Adapter over an OpenAI-compatible chat-completion API.
//!
//! A call builds a one-message conversation, sends it, and hands back either
//! the whole (trimmed) completion or a lazy stream of its characters.
//!
//! Failures while *starting* a call never reach the caller as errors: they are
//! rendered into the reply text (`"Error calling chat API: ..."`). Callers
//! that need to tell the two apart cannot; that is the observable contract of
//! this endpoint. A stream that breaks half-way does yield an `Err` item.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ChatSettings;

pub const CHAT_ERROR_PREFIX: &str = "Error calling chat API";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected chat response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("chat response contained no choices")]
    EmptyChoices,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Characters of a streamed completion, in arrival order. Single pass.
pub type CharStream = BoxStream<'static, Result<char, ChatError>>;

pub enum ChatReply {
    Complete(String),
    Stream(CharStream),
}

impl ChatReply {
    /// Drain the reply into one string.
    pub async fn into_text(self) -> Result<String, ChatError> {
        match self {
            Self::Complete(text) => Ok(text),
            Self::Stream(mut chars) => {
                let mut text = String::new();
                while let Some(c) = chars.next().await {
                    text.push(c?);
                }
                Ok(text)
            }
        }
    }
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
}

impl ChatClient {
    pub fn new(settings: &ChatSettings) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            temperature: settings.temperature,
        })
    }

    /// Send `message` as a single user turn.
    pub async fn send(&self, message: &str, model: &str, stream: bool) -> ChatReply {
        let messages = [ChatMessage::user(message)];
        match self.complete(&messages, model, stream).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat completion failed: {}", e);
                ChatReply::Complete(format!("{CHAT_ERROR_PREFIX}: {e}"))
            }
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        stream: bool,
    ) -> Result<ChatReply, ChatError> {
        let body = CompletionRequest {
            model,
            messages,
            temperature: self.temperature,
            stream,
        };

        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        if stream {
            debug!("Streaming completion from {}", model);
            return Ok(ChatReply::Stream(char_stream(response.bytes_stream())));
        }

        let text = response.text().await?;
        let completion: Completion = serde_json::from_str(&text)?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(ChatError::EmptyChoices)?;

        Ok(ChatReply::Complete(
            choice.message.content.unwrap_or_default().trim().to_string(),
        ))
    }
}

enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &[u8]) -> Result<SseLine, ChatError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments, `event:` / `id:` fields
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|content| !content.is_empty())
        .map_or(SseLine::Skip, SseLine::Delta))
}

struct SseState<S> {
    upstream: std::pin::Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<char>,
    done: bool,
}

impl<S> SseState<S> {
    fn apply(&mut self, line: &[u8]) -> Result<(), ChatError> {
        match parse_sse_line(line)? {
            SseLine::Delta(text) => self.pending.extend(text.chars()),
            SseLine::Done => self.done = true,
            SseLine::Skip => {}
        }
        Ok(())
    }

    fn fail(mut self, err: ChatError) -> Option<(Result<char, ChatError>, Self)> {
        self.done = true;
        self.pending.clear();
        self.buffer.clear();
        Some((Err(err), self))
    }
}

/// Turn a server-sent-events byte stream into the characters of each
/// non-empty delta. Lines may be split across network chunks.
fn char_stream<S, B>(upstream: S) -> CharStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        upstream: Box::pin(upstream),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(c) = st.pending.pop_front() {
                return Some((Ok(c), st));
            }
            if st.done {
                return None;
            }

            if let Some(pos) = st.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = st.buffer.drain(..=pos).collect();
                if let Err(e) = st.apply(&line) {
                    return st.fail(e);
                }
                continue;
            }

            match st.upstream.next().await {
                Some(Ok(bytes)) => st.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => return st.fail(e.into()),
                None => {
                    let rest = std::mem::take(&mut st.buffer);
                    if let Err(e) = st.apply(&rest) {
                        return st.fail(e);
                    }
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}
