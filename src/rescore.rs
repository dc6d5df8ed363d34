//! Second-stage scoring against a chat-completion model.
//!
//! The model is asked to rate each candidate's relevance to the query as a
//! percentage, one `Match N: NN%` line per candidate. Lines that fail to
//! parse leave a gap rather than failing the batch; the caller falls back to
//! the primary score for that candidate.

use crate::config::RescoringConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Minimal chat-completion surface. Decoupled from the HTTP client so tests
/// can script responses.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(config: &RescoringConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("rescoring.model is required")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            // Low temperature keeps the percentage lines parseable.
            temperature: 0.1,
            max_tokens: 150,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Rescoring request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Rescoring request failed with {}: {}", status, text);
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse rescoring response")?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("Rescoring response had no choices")?;
        Ok(choice.message.content)
    }
}

/// Two-stage rescorer wrapping a [`TextGenerator`].
pub struct Rescorer {
    generator: Arc<dyn TextGenerator>,
}

fn match_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*Match\s+(\d+)\s*:\s*(\d{1,3})\s*%").unwrap())
}

fn percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})\s*%").unwrap())
}

impl Rescorer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn from_config(config: &RescoringConfig) -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .context("OPENROUTER_API_KEY or OPENAI_API_KEY must be set for rescoring")?;
        Ok(Self::new(Arc::new(OpenAiGenerator::new(config, api_key)?)))
    }

    fn batch_prompt(query: &str, candidates: &[String]) -> String {
        let mut prompt = format!(
            "Rate how well each match answers the query.\n\nQuery: {}\n\nMatches:\n",
            query
        );
        for (i, candidate) in candidates.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, candidate));
        }
        prompt.push_str(
            "\nRespond with one line per match, exactly in the form:\n\
             Match 1: NN%\nMatch 2: NN%\n...\nwhere NN is a percentage from 0 to 100.",
        );
        prompt
    }

    /// Score a batch of candidates in one model call. Returns one slot per
    /// candidate; `None` where the response did not include a usable line.
    pub async fn rescore(&self, query: &str, candidates: &[String]) -> Result<Vec<Option<f64>>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = Self::batch_prompt(query, candidates);
        let response = self.generator.complete(&prompt).await?;

        let mut scores: Vec<Option<f64>> = vec![None; candidates.len()];
        for cap in match_line_regex().captures_iter(&response) {
            let index: usize = cap[1].parse().unwrap_or(0);
            let percent: u32 = cap[2].parse().unwrap_or(0);
            if index >= 1 && index <= candidates.len() {
                scores[index - 1] = Some(percent.min(100) as f64 / 100.0);
            }
        }
        Ok(scores)
    }

    /// Score one query/target pair. Takes the first percentage found anywhere
    /// in the response.
    pub async fn pairwise(&self, query: &str, target: &str) -> Result<f64> {
        let prompt = format!(
            "Rate how similar the following two texts are as a percentage from 0 to 100.\n\n\
             Text A: {}\n\nText B: {}\n\nRespond with a single percentage, e.g. 85%.",
            query, target
        );
        let response = self.generator.complete(&prompt).await?;

        let cap = percent_regex()
            .captures(&response)
            .with_context(|| format!("No percentage in rescoring response: {:?}", response))?;
        let percent: u32 = cap[1].parse().unwrap_or(0);
        Ok(percent.min(100) as f64 / 100.0)
    }
}
