//! AI completion port and an HTTP chat-completion adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use diagfix_storage::{Fix, FixEdit};

use crate::config::AiConfig;
use crate::error::{EngineError, Result};
use crate::strategy::FixContext;
use crate::syntax::SourceLanguage;

/// Strategy name recorded for completion-generated fixes
pub const AI_STRATEGY_ID: &str = "ai_completion";

/// Lines of source shown on each side of the diagnostic
const CONTEXT_RADIUS: u32 = 6;

const SYSTEM_PROMPT: &str = "You repair a single type-checker diagnostic. \
Reply with a JSON object: {\"explanation\": string, \"replacement\": string, \
\"confidence\": number between 0 and 1, \"alternatives\": [string]}. \
\"replacement\" is the full corrected text of the flagged line, without a trailing newline.";

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub code: String,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub language: String,
    /// The flagged line as it is now
    pub line_text: String,
    /// Numbered lines around the flagged one
    pub context: String,
}

impl CompletionRequest {
    pub fn from_context(ctx: &FixContext<'_>) -> Self {
        let d = ctx.diagnostic;
        let first = d.line.saturating_sub(CONTEXT_RADIUS).max(1);
        let last = d.line.saturating_add(CONTEXT_RADIUS);
        let context = (first..=last)
            .filter_map(|n| ctx.line_text(n).map(|text| format!("{:>5} | {}", n, text)))
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            code: d.code.clone(),
            message: d.message.clone(),
            file: d.file.display().to_string(),
            line: d.line,
            column: d.column,
            language: SourceLanguage::from_path(&d.file)
                .map(|l| l.as_str().to_string())
                .unwrap_or_else(|| "text".to_string()),
            line_text: ctx.line_text(d.line).unwrap_or_default().to_string(),
            context,
        }
    }

    fn prompt(&self) -> String {
        format!(
            "{} diagnostic {} at {}:{}:{}\n{}\n\nFlagged line:\n{}\n\nContext:\n{}",
            self.language,
            self.code,
            self.file,
            self.line,
            self.column,
            self.message,
            self.line_text,
            self.context
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSuggestion {
    #[serde(default)]
    pub explanation: String,
    pub replacement: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

fn default_confidence() -> f64 {
    0.5
}

impl CompletionSuggestion {
    /// Turn the suggestion into a fix that replaces the flagged line
    pub fn into_fix(self, ctx: &FixContext<'_>) -> Result<Fix> {
        let d = ctx.diagnostic;
        let (start, end) = ctx
            .line_span(d.line)
            .ok_or_else(|| EngineError::strategy(AI_STRATEGY_ID, format!("line {} not in file", d.line)))?;

        let replacement = self.replacement.trim_end_matches(&['\n', '\r'][..]);
        if replacement == &ctx.source[start..end] {
            return Err(EngineError::strategy(AI_STRATEGY_ID, "suggestion does not change the line"));
        }
        if replacement.trim().is_empty() {
            return Err(EngineError::strategy(AI_STRATEGY_ID, "empty suggestion"));
        }

        let confidence = (self.confidence.clamp(0.0, 1.0) * 100.0).round() as i32;
        let description = if self.explanation.is_empty() {
            format!("AI suggestion for {}", d.code)
        } else {
            self.explanation.clone()
        };
        Ok(Fix::new(
            d.id,
            AI_STRATEGY_ID,
            description,
            vec![FixEdit::new(d.file.clone(), start, end, replacement)],
        )
        .generated()
        .with_confidence(confidence)
        .with_metadata(json!({ "alternatives": self.alternatives })))
    }
}

/// Source of AI-assisted suggestions
#[async_trait]
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &str;

    async fn suggest(&self, request: &CompletionRequest) -> Result<CompletionSuggestion>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completion client in JSON mode
pub struct HttpCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl HttpCompletionClient {
    /// The API key is read from the environment variable named in the config
    pub fn new(config: &AiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EngineError::external("completion", e))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl CompletionService for HttpCompletionClient {
    fn name(&self) -> &str {
        "http_completion"
    }

    async fn suggest(&self, request: &CompletionRequest) -> Result<CompletionSuggestion> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": request.prompt() },
            ],
        });

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EngineError::external("completion", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::external("completion", format!("HTTP {}", status)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::external("completion", e))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EngineError::external("completion", "response has no content"))?;

        debug!(code = %request.code, bytes = content.len(), "completion received");
        parse_suggestion(&content)
    }
}

/// Parse a suggestion, tolerating markdown code fences around the JSON
fn parse_suggestion(content: &str) -> Result<CompletionSuggestion> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```")
        .map(|rest| {
            let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
            body.trim_end().trim_end_matches("```").trim()
        })
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced).map_err(|e| EngineError::external("completion", format!("malformed suggestion: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolIndex;
    use diagfix_storage::Diagnostic;
    use std::path::Path;

    #[test]
    fn test_parse_suggestion_with_fence() {
        let content = "```json\n{\"explanation\": \"coerce\", \"replacement\": \"let x = 1;\", \"confidence\": 0.8}\n```";
        let suggestion = parse_suggestion(content).unwrap();
        assert_eq!(suggestion.replacement, "let x = 1;");
        assert_eq!(suggestion.confidence, 0.8);
        assert!(suggestion.alternatives.is_empty());

        assert!(parse_suggestion("not json").is_err());
    }

    #[test]
    fn test_suggestion_replaces_flagged_line() {
        let source = "const a = 1;\nconst b: number = '2';\nconst c = 3;\n";
        let d = Diagnostic::new("TS2322", "Type 'string' is not assignable to type 'number'.", "a.ts", 2, 7);
        let symbols = SymbolIndex::new();
        let ctx = FixContext::new(&d, source, &symbols, Path::new(""));

        let request = CompletionRequest::from_context(&ctx);
        assert_eq!(request.line_text, "const b: number = '2';");
        assert_eq!(request.language, "typescript");
        assert!(request.context.contains("    3 | const c = 3;"));

        let fix = CompletionSuggestion {
            explanation: "use a number literal".to_string(),
            replacement: "const b: number = 2;\n".to_string(),
            confidence: 1.7,
            alternatives: vec!["const b = Number('2');".to_string()],
        }
        .into_fix(&ctx)
        .unwrap();

        assert_eq!(fix.strategy, AI_STRATEGY_ID);
        assert!(fix.is_generated);
        assert_eq!(fix.confidence(), 100);
        assert_eq!(fix.edits[0].start_offset, 13);
        assert_eq!(fix.edits[0].new_text, "const b: number = 2;");
    }

    #[test]
    fn test_unchanged_suggestion_rejected() {
        let source = "let x = 1;\n";
        let d = Diagnostic::new("TS2322", "m", "a.ts", 1, 1);
        let symbols = SymbolIndex::new();
        let ctx = FixContext::new(&d, source, &symbols, Path::new(""));
        let suggestion = CompletionSuggestion {
            explanation: String::new(),
            replacement: "let x = 1;".to_string(),
            confidence: 0.9,
            alternatives: vec![],
        };
        assert!(suggestion.into_fix(&ctx).is_err());
    }
}
