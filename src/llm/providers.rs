//! rig-core adapters for [`ChatModel`] and [`Embedder`].

use std::sync::Arc;

use async_trait::async_trait;
use rig::OneOrMany;
use rig::client::{CompletionClient, EmbeddingsClient};
use rig::completion::{AssistantContent, CompletionModel, Message as RigMessage, ToolDefinition};
use rig::embeddings::EmbeddingModel;
use rig::message::{ToolResultContent, UserContent};
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

use super::{ChatModel, ChatRequest, ChatResponse, Embedder, TokenUsage};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Message, Role, ToolCall};
use crate::telemetry::genai::{
    record_embedding_dimensions, record_token_usage, record_tool_calls, start_chat_span,
    start_embedding_span,
};
use crate::telemetry::metrics;

/// Create an OpenAI (or OpenAI-compatible, via `base_url`) client from a secret key.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn openai_client(
    api_key: &SecretString,
    base_url: Option<&str>,
) -> std::result::Result<rig::providers::openai::Client, rig::http_client::Error> {
    let builder = rig::providers::openai::Client::builder().api_key(api_key.expose_secret());
    match base_url {
        Some(url) => builder.base_url(url).build(),
        None => builder.build(),
    }
}

/// Build the shared chat model described by `config`.
pub fn chat_model_from_config(config: &Config) -> Result<Arc<dyn ChatModel>> {
    let client = openai_client(&config.llm_api_key, config.llm_base_url.as_deref())
        .map_err(|e| Error::Config(format!("cannot build LLM client: {e}")))?;
    let model = client.completion_model(&config.llm_model);
    Ok(Arc::new(RigChatModel::new(model, &config.llm_model, "openai")))
}

/// Build the embedding service, or `None` when no embedding model is configured.
pub fn embedder_from_config(config: &Config) -> Result<Option<Arc<dyn Embedder>>> {
    let Some(name) = config.embedding_model.as_deref() else {
        return Ok(None);
    };
    let client = openai_client(&config.llm_api_key, config.llm_base_url.as_deref())
        .map_err(|e| Error::Config(format!("cannot build embedding client: {e}")))?;
    let model = client.embedding_model_with_ndims(name, config.embedding_dim);
    Ok(Some(Arc::new(RigEmbedder::new(model, name, "openai"))))
}

/// [`ChatModel`] backed by any rig-core completion model.
pub struct RigChatModel<M> {
    inner: M,
    model: String,
    provider: String,
}

impl<M> RigChatModel<M> {
    pub fn new(inner: M, model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            inner,
            model: model.into(),
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl<M> ChatModel for RigChatModel<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let span = start_chat_span(&self.model, &self.provider);
        let (preamble, mut history) = to_rig_messages(&request.messages)?;
        let prompt = history
            .pop()
            .ok_or_else(|| Error::Llm("request has no user, assistant or tool message".to_string()))?;

        let mut builder = self.inner.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if !request.tools.is_empty() {
            builder = builder.tools(
                request
                    .tools
                    .into_iter()
                    .map(|tool| ToolDefinition {
                        name: tool.name,
                        description: tool.description,
                        parameters: tool.parameters,
                    })
                    .collect(),
            );
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        let response = builder
            .send()
            .instrument(span.clone())
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;

        let usage = TokenUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        };
        record_token_usage(&span, usage.input_tokens, usage.output_tokens);
        metrics::record_llm_tokens(&self.model, &self.provider, usage);

        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for content in response.choice.into_iter() {
            match content {
                AssistantContent::Text(text) => texts.push(text.text),
                AssistantContent::ToolCall(call) => tool_calls.push(ToolCall::new(
                    call.id,
                    call.function.name,
                    call.function.arguments,
                )),
                _ => {}
            }
        }

        record_tool_calls(&span, tool_calls.len());

        Ok(ChatResponse {
            content: texts.join("\n"),
            tool_calls,
            usage: Some(usage),
        })
    }
}

/// Split off system messages into a preamble and convert the rest.
///
/// rig carries system instructions as a preamble, so system messages found
/// mid-conversation are concatenated into it in order.
fn to_rig_messages(messages: &[Message]) -> Result<(Option<String>, Vec<RigMessage>)> {
    let mut preamble: Vec<String> = Vec::new();
    let mut converted = Vec::with_capacity(messages.len());

    for message in messages {
        let text = message.text();
        match message.role {
            Role::System => preamble.push(text),
            Role::User => converted.push(RigMessage::user(text)),
            Role::Assistant if message.tool_calls.is_empty() => {
                converted.push(RigMessage::assistant(text))
            }
            Role::Assistant => {
                let mut contents = Vec::with_capacity(message.tool_calls.len() + 1);
                if !text.is_empty() {
                    contents.push(AssistantContent::text(text));
                }
                for call in &message.tool_calls {
                    contents.push(AssistantContent::tool_call(
                        call.id.clone(),
                        call.name.clone(),
                        call.arguments.clone(),
                    ));
                }
                let content = OneOrMany::many(contents)
                    .map_err(|e| Error::Llm(format!("empty assistant message: {e}")))?;
                converted.push(RigMessage::Assistant { id: None, content });
            }
            Role::Tool => {
                let call_id = message.tool_call_id.clone().unwrap_or_default();
                converted.push(RigMessage::User {
                    content: OneOrMany::one(UserContent::tool_result(
                        call_id,
                        OneOrMany::one(ToolResultContent::text(text)),
                    )),
                });
            }
        }
    }

    let preamble = (!preamble.is_empty()).then(|| preamble.join("\n\n"));
    Ok((preamble, converted))
}

/// [`Embedder`] backed by any rig-core embedding model.
pub struct RigEmbedder<E> {
    inner: E,
    model: String,
    provider: String,
}

impl<E> RigEmbedder<E> {
    pub fn new(inner: E, model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            inner,
            model: model.into(),
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl<E> Embedder for RigEmbedder<E>
where
    E: EmbeddingModel + Send + Sync + 'static,
{
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let span = start_embedding_span(&self.model, &self.provider);
        let embedding = self
            .inner
            .embed_text(text)
            .instrument(span.clone())
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;
        record_embedding_dimensions(&span, embedding.vec.len());
        Ok(embedding.vec.into_iter().map(|x| x as f32).collect())
    }
}
