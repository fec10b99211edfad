use gradewise_domain::entities::{Completion, RewritePrompt};
use gradewise_domain::ports::Rewriter;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Offline rewriter: hands the text back untouched.
pub struct EchoRewriter;

#[async_trait]
impl Rewriter for EchoRewriter {
    async fn rewrite(&self, prompt: &RewritePrompt) -> anyhow::Result<Completion> {
        Ok(Completion { text: prompt.text.clone(), model: Some(self.name().into()) })
    }
    fn name(&self) -> &'static str { "echo" }
}

/// Replays a fixed script of replies; `Err` entries become provider errors.
/// Once the script runs out the fallback reply is repeated, if any.
#[derive(Default)]
pub struct ScriptedRewriter {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<RewritePrompt>>,
}

impl ScriptedRewriter {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        Self { replies: Mutex::new(replies.into_iter().collect()), ..Default::default() }
    }

    pub fn repeating(reply: impl Into<String>) -> Self {
        Self { fallback: Some(reply.into()), ..Default::default() }
    }

    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn calls(&self) -> usize { self.prompts.lock().len() }

    pub fn prompts(&self) -> Vec<RewritePrompt> { self.prompts.lock().clone() }
}

#[async_trait]
impl Rewriter for ScriptedRewriter {
    async fn rewrite(&self, prompt: &RewritePrompt) -> anyhow::Result<Completion> {
        self.prompts.lock().push(prompt.clone());
        let next = self.replies.lock().pop_front();
        let reply = match next {
            Some(r) => r,
            None => self.fallback.clone().ok_or_else(|| "script exhausted".to_string()),
        };
        match reply {
            Ok(text) => Ok(Completion { text, model: Some(self.name().into()) }),
            Err(e) => Err(anyhow::anyhow!("{}", e)),
        }
    }
    fn name(&self) -> &'static str { "scripted" }
}

/// System instruction sent ahead of the passage.
pub fn system_message(prompt: &RewritePrompt) -> String {
    format!(
        "You rewrite passages for a {} reading level. {} \
         Preserve the meaning and facts. Reply with the rewritten passage only, without commentary or quotes.",
        prompt.target_level.label(),
        prompt.guidance.trim()
    )
}

#[cfg(any(feature = "openai-async", feature = "ollama-async"))]
fn categorize(status: reqwest::StatusCode) -> &'static str {
    use reqwest::StatusCode;
    match status {
        StatusCode::TOO_MANY_REQUESTS => "rate_limit",
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "auth",
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => "invalid_request",
        _ if status.is_server_error() => "upstream_error",
        _ => "request_error",
    }
}

/// Back-off before retry `attempt + 1`: doubling from 200 ms, small
/// deterministic jitter, capped at 2 s.
pub fn retry_wait_ms(attempt: u32) -> u64 {
    let base = 200u64.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
    let jitter = (attempt as u64 * 37) % 100;
    base.saturating_add(jitter).min(2000)
}

/// Sends the request built by `request` up to `retries + 1` times and returns
/// the JSON body of the first successful response.
#[cfg(any(feature = "openai-async", feature = "ollama-async"))]
async fn post_with_retries<F>(provider: &'static str, retries: u32, request: F) -> anyhow::Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 0..=retries {
        match request().send().await {
            Ok(resp) => {
                let status = resp.status();
                let v: serde_json::Value = resp.json().await.unwrap_or(serde_json::json!({"error":"invalid json"}));
                if status.is_success() {
                    return Ok(v);
                }
                last_err = Some(anyhow::anyhow!("{}: {} [{}]: {}", categorize(status), provider, status, v));
            }
            Err(e) => {
                let category = if e.is_timeout() { "timeout" } else { "network_error" };
                last_err = Some(anyhow::anyhow!("{}: {} request failed: {}", category, provider, e));
            }
        }
        if attempt < retries {
            let wait = retry_wait_ms(attempt);
            tracing::debug!(target: "gradewise.providers", provider, attempt, wait_ms = wait, "provider retry");
            tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} unknown error", provider)))
}

#[cfg(any(feature = "openai-async", feature = "ollama-async"))]
fn client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs.max(1)))
        .build()?)
}

#[cfg(feature = "openai-async")]
pub mod openai_async {
    use super::*;

    #[derive(Clone)]
    pub struct OpenAiRewriter {
        pub api_key: String,
        pub model: String,
        pub base_url: String,
        pub timeout_secs: u64,
        pub retries: u32,
    }

    #[async_trait]
    impl Rewriter for OpenAiRewriter {
        async fn rewrite(&self, prompt: &RewritePrompt) -> anyhow::Result<Completion> {
            let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
            let body = serde_json::json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system_message(prompt)},
                    {"role": "user", "content": prompt.text}
                ],
                "temperature": prompt.temperature
            });
            let client = client(self.timeout_secs)?;
            let v = post_with_retries(self.name(), self.retries, || {
                client.post(&url).bearer_auth(&self.api_key).json(&body)
            })
            .await?;
            let text = v["choices"][0]["message"]["content"].as_str().unwrap_or("").to_string();
            Ok(Completion { text, model: Some(self.model.clone()) })
        }
        fn name(&self) -> &'static str { "openai" }
    }
}

#[cfg(feature = "ollama-async")]
pub mod ollama_async {
    use super::*;

    #[derive(Clone)]
    pub struct OllamaRewriter {
        pub base_url: String,
        pub model: String,
        pub timeout_secs: u64,
        pub retries: u32,
    }

    #[async_trait]
    impl Rewriter for OllamaRewriter {
        async fn rewrite(&self, prompt: &RewritePrompt) -> anyhow::Result<Completion> {
            let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
            let body = serde_json::json!({
                "model": self.model,
                "system": system_message(prompt),
                "prompt": prompt.text,
                "stream": false,
                "options": {"temperature": prompt.temperature}
            });
            let client = client(self.timeout_secs)?;
            let v = post_with_retries(self.name(), self.retries, || client.post(&url).json(&body)).await?;
            let text = v["response"].as_str().unwrap_or("").to_string();
            Ok(Completion { text, model: Some(self.model.clone()) })
        }
        fn name(&self) -> &'static str { "ollama" }
    }
}

pub struct ProviderFactory;

impl ProviderFactory {
    /// Picks a rewriter from `GRADEWISE_PROVIDER` (`echo`, `openai`, `ollama`).
    /// Without it, OpenAI is used when an API key is present, otherwise echo.
    pub fn from_env() -> anyhow::Result<Arc<dyn Rewriter>> {
        let choice = std::env::var("GRADEWISE_PROVIDER").ok().map(|s| s.to_ascii_lowercase());
        match choice.as_deref() {
            Some("echo") => Ok(Arc::new(EchoRewriter)),
            Some("openai") => Self::openai_from_env(),
            Some("ollama") => Self::ollama_from_env(),
            Some(other) => Err(anyhow::anyhow!("unknown provider: {}", other)),
            None => Ok(Self::openai_from_env().unwrap_or_else(|_| Arc::new(EchoRewriter))),
        }
    }

    pub fn openai_from_env() -> anyhow::Result<Arc<dyn Rewriter>> {
        #[cfg(feature = "openai-async")]
        {
            let api_key = std::env::var("GRADEWISE_OPENAI_API_KEY")?;
            let model = std::env::var("GRADEWISE_OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            let base_url = std::env::var("GRADEWISE_OPENAI_BASE").unwrap_or_else(|_| "https://api.openai.com".to_string());
            Ok(Arc::new(openai_async::OpenAiRewriter { api_key, model, base_url, timeout_secs: 30, retries: 2 }))
        }
        #[cfg(not(feature = "openai-async"))]
        {
            Err(anyhow::anyhow!("openai-async feature not enabled"))
        }
    }

    pub fn ollama_from_env() -> anyhow::Result<Arc<dyn Rewriter>> {
        #[cfg(feature = "ollama-async")]
        {
            let base_url = std::env::var("GRADEWISE_OLLAMA_BASE").unwrap_or_else(|_| "http://localhost:11434".to_string());
            let model = std::env::var("GRADEWISE_OLLAMA_MODEL").unwrap_or_else(|_| "llama3".to_string());
            Ok(Arc::new(ollama_async::OllamaRewriter { base_url, model, timeout_secs: 60, retries: 2 }))
        }
        #[cfg(not(feature = "ollama-async"))]
        {
            Err(anyhow::anyhow!("ollama-async feature not enabled"))
        }
    }
}
