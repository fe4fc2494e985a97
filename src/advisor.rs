//! Preventative health advice: context, prompt and completion call.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::context::{build_context_for, ContextSummary, FilterCriteria};
use crate::dataset::Dataset;
use crate::error::{AdvisorError, AdvisorResult};
use crate::prompt::advice_prompt;

/// A text-completion service.
#[allow(async_fn_in_trait)]
pub trait CompletionClient {
    async fn complete(&self, prompt: &str) -> AdvisorResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> AdvisorResult<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AdvisorError::EmptyCompletion)
    }
}

/// Client for an OpenAI-compatible chat completions endpoint (Groq by default).
pub struct GroqClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl GroqClient {
    pub fn new(config: &CompletionConfig) -> AdvisorResult<Self> {
        let api_key = config.require_api_key()?.to_string();
        Ok(GroqClient {
            http: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CompletionClient for GroqClient {
    async fn complete(&self, prompt: &str) -> AdvisorResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        debug!("POST {} model={}", self.endpoint, self.model);
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(completion_error(response).await);
        }
        response.json::<ChatResponse>().await?.into_text()
    }
}

async fn completion_error(response: reqwest::Response) -> AdvisorError {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!("could not read completion error body: {}", e);
            String::new()
        }
    };
    AdvisorError::Completion { status, body }
}

/// Advice for one request, with the context it was generated from.
#[derive(Debug, Clone)]
pub struct Advice {
    pub summary: ContextSummary,
    pub prompt: String,
    pub text: String,
}

pub struct Advisor<C> {
    dataset: Dataset,
    client: C,
}

impl<C: CompletionClient> Advisor<C> {
    pub fn new(dataset: Dataset, client: C) -> Self {
        Advisor { dataset, client }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Build the context and prompt for `criteria` without calling the client.
    pub fn prepare(&self, criteria: &FilterCriteria) -> AdvisorResult<(ContextSummary, String)> {
        let summary = build_context_for(&self.dataset, criteria)?;
        let prompt = advice_prompt(&summary);
        Ok((summary, prompt))
    }

    pub async fn preventative_health_advice(&self, criteria: &FilterCriteria) -> AdvisorResult<Advice> {
        let (summary, prompt) = self.prepare(criteria)?;
        info!(
            "requesting advice for {} / {} ({} matching patients)",
            criteria.age_category,
            criteria.smoker_status,
            summary.matched_rows()
        );
        let text = self.client.complete(&prompt).await?;
        Ok(Advice {
            summary,
            prompt,
            text,
        })
    }
}
