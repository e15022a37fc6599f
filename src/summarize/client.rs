use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::error::ServiceError;

pub type SummaryChunkCallback = Arc<dyn Fn(String) + Send + Sync>;

const DIAGNOSES_SYSTEM_PROMPT: &str = "\
You are a clinical decision-support assistant following a live consultation. \
From the call transcript, maintain a short differential of likely diagnoses. \
Respond with a JSON object of the form \
{\"likely_diagnoses\": [{\"name\": \"...\", \"symptoms\": [\"...\"]}]} where \
each entry names a plausible diagnosis and lists the symptoms from the \
transcript that support it. Carry forward previous diagnoses that still fit, \
drop any the new transcript rules out, and return an empty list when the \
transcript has no clinical content.";

const TREATMENT_SYSTEM_PROMPT: &str = "\
You are a clinical decision-support assistant. Given a chosen diagnosis and \
the consultation transcript, outline a concise, evidence-based treatment \
plan in markdown: first-line treatment, relevant tests or referrals, and any \
red flags that warrant urgent escalation. Address the clinician, not the \
patient.";

/// One candidate diagnosis with the symptoms supporting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub name: String,
    pub symptoms: Vec<String>,
}

/// Validated shape of a diagnosis response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosisSet {
    #[serde(default)]
    pub likely_diagnoses: Vec<Diagnosis>,
}

/// Streaming client for the transcript summarizer, an OpenAI-compatible
/// chat completion endpoint.
///
/// Text is surfaced through the chunk callback as it arrives so the caller
/// can render progress; structured results are parsed and validated only
/// from the complete accumulated response.
pub struct SummaryClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl SummaryClient {
    pub fn from_config(config: &SummarizerConfig) -> Result<Self, ServiceError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ServiceError::validation(format!(
                "{} is not set; the summarizer needs an API key",
                config.api_key_env
            ))
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    /// Stream a refreshed differential for the running transcript.
    ///
    /// Previous diagnoses are handed back to the model so the differential
    /// evolves instead of resetting on every call.
    pub async fn stream_diagnoses(
        &self,
        prev_diagnoses: &[Diagnosis],
        transcript: &str,
        on_chunk: SummaryChunkCallback,
    ) -> Result<DiagnosisSet, ServiceError> {
        let prev = serde_json::to_string_pretty(prev_diagnoses)
            .map_err(|e| ServiceError::validation(e.to_string()))?;
        let user_content = format!(
            "Here are the previous diagnoses you suggested:\n<prev_diagnoses>\n{prev}\n</prev_diagnoses>\n\n\
             Analyze the updated call transcript and provide a list of likely diagnoses with their \
             corresponding symptoms:\n<current_transcript>\n{transcript}\n</current_transcript>"
        );

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": DIAGNOSES_SYSTEM_PROMPT },
                { "role": "user", "content": user_content },
            ],
            "response_format": { "type": "json_object" },
            "stream": true,
        });

        let full = self.stream_completion(body, &on_chunk).await?;
        parse_diagnoses(&full)
    }

    /// Stream a treatment plan for one chosen diagnosis. Returns the full
    /// trimmed markdown once the stream completes.
    pub async fn stream_treatment_plan(
        &self,
        diagnosis: &str,
        transcript: &str,
        on_chunk: SummaryChunkCallback,
    ) -> Result<String, ServiceError> {
        let user_content = format!("Diagnosis: {diagnosis}\n\nTranscript:\n{transcript}");

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": TREATMENT_SYSTEM_PROMPT },
                { "role": "user", "content": user_content },
            ],
            "stream": true,
        });

        let full = self.stream_completion(body, &on_chunk).await?;
        Ok(full.trim().to_string())
    }

    async fn stream_completion(
        &self,
        body: serde_json::Value,
        on_chunk: &SummaryChunkCallback,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Streaming completion from {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::connection("summarizer", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ServiceError::connection(
                "summarizer",
                format!("completion request failed ({status}): {detail}"),
            ));
        }

        let mut stream = response.bytes_stream();
        let mut pending = String::new();
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| ServiceError::connection("summarizer", e.to_string()))?;
            pending.push_str(&String::from_utf8_lossy(&chunk));

            // SSE events can split across reads; only parse whole lines
            while let Some(newline) = pending.find('\n') {
                let line = pending[..newline].trim_end_matches('\r').to_string();
                pending.drain(..=newline);
                if let Some(delta) = delta_from_sse_line(&line) {
                    full.push_str(&delta);
                    on_chunk(delta);
                }
            }
        }

        Ok(full)
    }
}

/// Extract the content delta from one SSE line, if it carries one.
fn delta_from_sse_line(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data: ")?;
    if payload == "[DONE]" {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value["choices"][0]["delta"]["content"]
        .as_str()
        .map(|s| s.to_string())
}

/// Validate the accumulated model output as a diagnosis set.
fn parse_diagnoses(raw: &str) -> Result<DiagnosisSet, ServiceError> {
    serde_json::from_str(raw).map_err(|e| {
        ServiceError::validation(format!("diagnosis response is not valid JSON: {e}"))
    })
}
