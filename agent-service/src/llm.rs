//! Language model client.
//!
//! Talks to an Ollama server through its `/api/chat` endpoint. Responses are
//! streamed as newline-delimited JSON; content deltas are forwarded to the
//! caller as they arrive and the assembled message is returned at the end.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use common::config::LlmConfig;
use common::errors::{AppError, AppResult};

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message of a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on `tool` messages: which tool produced the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A tool result handed back to the model.
    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(name.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// A tool declaration advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function",
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Receives reply text fragments as they stream in.
pub type OnDelta<'a> = dyn for<'s> FnMut(&'s str) + Send + 'a;

/// A chat model that may stream its reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Sends the conversation and returns the assistant reply.
    ///
    /// `on_delta` receives content fragments as they arrive.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        on_delta: &mut OnDelta<'_>,
    ) -> AppResult<ChatMessage>;

    /// Model identifier.
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "<[ToolSpec]>::is_empty")]
    tools: &'a [ToolSpec],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

/// One line of the streamed response.
#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Splits a byte stream into NDJSON chunks, buffering partial lines.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    /// Feeds bytes and returns every complete line decoded.
    pub fn push(&mut self, bytes: &[u8]) -> AppResult<Vec<ChatChunk>> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(chunk) = decode_line(&line)? {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    /// Decodes whatever is left once the stream ends.
    pub fn finish(&mut self) -> AppResult<Option<ChatChunk>> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }
}

fn decode_line(line: &[u8]) -> AppResult<Option<ChatChunk>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(line)
        .map(Some)
        .map_err(|e| AppError::Llm(format!("invalid stream chunk: {}", e)))
}

/// Accumulates streamed chunks into one assistant message.
#[derive(Debug)]
struct ReplyBuilder {
    message: ChatMessage,
    done: bool,
}

impl ReplyBuilder {
    fn new() -> Self {
        Self {
            message: ChatMessage::assistant(""),
            done: false,
        }
    }

    fn apply(&mut self, chunk: ChatChunk, on_delta: &mut OnDelta<'_>) -> AppResult<()> {
        if let Some(error) = chunk.error {
            return Err(AppError::Llm(error));
        }
        if let Some(message) = chunk.message {
            if !message.content.is_empty() {
                on_delta(&message.content);
                self.message.content.push_str(&message.content);
            }
            self.message.tool_calls.extend(message.tool_calls);
        }
        self.done |= chunk.done;
        Ok(())
    }
}

/// Ollama chat client.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Llm(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        on_delta: &mut OnDelta<'_>,
    ) -> AppResult<ChatMessage> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            tools,
            stream: true,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        tracing::debug!(model = %self.model, messages = messages.len(), "Sending chat request");
        let mut response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!("Ollama API error ({}): {}", status, error_text)));
        }

        let mut decoder = NdjsonDecoder::default();
        let mut reply = ReplyBuilder::new();
        while let Some(bytes) = response
            .chunk()
            .await
            .map_err(|e| AppError::Llm(format!("Ollama stream interrupted: {}", e)))?
        {
            for chunk in decoder.push(&bytes)? {
                reply.apply(chunk, on_delta)?;
            }
        }
        if let Some(chunk) = decoder.finish()? {
            reply.apply(chunk, on_delta)?;
        }

        if !reply.done {
            return Err(AppError::Llm("Ollama stream ended before completion".into()));
        }
        Ok(reply.message)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decoder_reassembles_split_lines() {
        let mut decoder = NdjsonDecoder::default();
        let first = decoder
            .push(br#"{"message":{"role":"assistant","content":"Hel"},"done":false}
{"message":{"role":"assis"#)
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].message.as_ref().unwrap().content, "Hel");

        let second = decoder
            .push(br#"tant","content":"lo"},"done":false}"#)
            .unwrap();
        assert!(second.is_empty());

        let second = decoder.push(b"\n\n").unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].message.as_ref().unwrap().content, "lo");

        let last = decoder.push(br#"{"done":true}"#).unwrap();
        assert!(last.is_empty());
        assert!(decoder.finish().unwrap().unwrap().done);
        assert!(decoder.finish().unwrap().is_none());
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut decoder = NdjsonDecoder::default();
        assert!(matches!(decoder.push(b"not json\n"), Err(AppError::Llm(_))));
    }

    #[test]
    fn test_reply_builder_collects_content_and_tool_calls() {
        let mut decoder = NdjsonDecoder::default();
        let chunks = decoder
            .push(
                concat!(
                    r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"MySQLTool","arguments":{"prompt":"select all"}}}]},"done":false}"#,
                    "\n",
                    r#"{"message":{"role":"assistant","content":"ok"},"done":true}"#,
                    "\n"
                )
                .as_bytes(),
            )
            .unwrap();

        let mut deltas = Vec::new();
        let mut reply = ReplyBuilder::new();
        for chunk in chunks {
            reply.apply(chunk, &mut |d: &str| deltas.push(d.to_string())).unwrap();
        }
        assert!(reply.done);
        assert_eq!(deltas, vec!["ok"]);
        assert_eq!(reply.message.content, "ok");
        assert_eq!(reply.message.tool_calls.len(), 1);
        assert_eq!(reply.message.tool_calls[0].function.name, "MySQLTool");
        assert_eq!(
            reply.message.tool_calls[0].function.arguments,
            json!({"prompt": "select all"})
        );
    }

    #[test]
    fn test_error_chunk_fails_reply() {
        let mut reply = ReplyBuilder::new();
        let chunk = ChatChunk {
            message: None,
            done: false,
            error: Some("model 'llama3:latest' not found".into()),
        };
        let err = reply.apply(chunk, &mut |_: &str| {}).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::tool("MySQLTool", "[]"),
        ];
        let tools = vec![ToolSpec::function(
            "MySQLTool",
            "Runs SQL",
            json!({"type": "object"}),
        )];
        let body = ChatRequest {
            model: "llama3:latest",
            messages: &messages,
            tools: &tools,
            stream: true,
            options: ChatOptions { temperature: 0.5 },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(
            value["messages"][2],
            json!({"role": "tool", "content": "[]", "tool_name": "MySQLTool"})
        );
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "MySQLTool");
        assert_eq!(value["options"]["temperature"], 0.5);

        let no_tools = ChatRequest {
            model: "llama3:latest",
            messages: &messages,
            tools: &[],
            stream: true,
            options: ChatOptions { temperature: 0.5 },
        };
        assert!(serde_json::to_value(&no_tools).unwrap().get("tools").is_none());
    }
}
