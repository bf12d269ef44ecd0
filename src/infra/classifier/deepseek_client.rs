use crate::core::moderation::{
    CheckType, ClassifierError, ClassifierOptions, ClassifierVerdict, ContentClassifier, RiskLevel,
};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

lazy_static! {
    /// Outermost `{...}` block; the model sometimes wraps the JSON in prose.
    static ref JSON_BLOCK: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

/// Phrases that mark a refusal when the model ignored the JSON format.
const REJECTION_MARKERS: [&str; 6] = [
    "不通过",
    "违规",
    "敏感",
    "not approved",
    "violation",
    "sensitive",
];

/// DeepSeek chat-completion API used as a content classifier.
///
/// One HTTP call per `evaluate`. Retries and timeouts belong to the engine.
pub struct DeepSeekClassifier {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl DeepSeekClassifier {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl ContentClassifier for DeepSeekClassifier {
    async fn evaluate(
        &self,
        text: &str,
        options: &ClassifierOptions,
    ) -> Result<ClassifierVerdict, ClassifierError> {
        let url = format!("{}/chat/completions", self.base_url);

        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": build_prompt(text, options) }],
            "temperature": 0.1,
            "max_tokens": 1000,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ClassifierError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ClassifierError::Malformed("response has no message content".into()))?;

        parse_verdict(content)
    }
}

fn classify_status(status: StatusCode, body: &str) -> ClassifierError {
    let message = format!("DeepSeek API error: {} - {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ClassifierError::Transient(message)
    } else {
        ClassifierError::Permanent(message)
    }
}

fn check_type_label(check: CheckType) -> &'static str {
    match check {
        CheckType::Political => "politically sensitive content",
        CheckType::Violence => "violence",
        CheckType::Sexual => "sexual content",
        CheckType::Hate => "hate speech",
        CheckType::Spam => "spam",
        CheckType::Privacy => "leaked private information",
    }
}

fn build_prompt(text: &str, options: &ClassifierOptions) -> String {
    let strictness = match options.strict_level {
        1 => "lenient",
        3 => "strict",
        _ => "moderate",
    };
    let checks = options
        .check_types
        .iter()
        .map(|c| check_type_label(*c))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Review the following content. Strictness: {strictness}.\n\
         Check for: {checks}.\n\n\
         Answer with JSON only, in this shape:\n\
         {{\n\
         \x20 \"passed\": true/false,\n\
         \x20 \"score\": 0.0-1.0,\n\
         \x20 \"risk_level\": \"low/medium/high\",\n\
         \x20 \"reasons\": [\"...\"],\n\
         \x20 \"suggestions\": [\"...\"],\n\
         \x20 \"flagged_keywords\": [\"...\"]\n\
         }}\n\n\
         Content:\n{text}"
    )
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Read the model's answer. Missing fields take permissive defaults; the
/// score is clamped to `[0, 1]` and an unknown risk level is derived from it.
fn parse_verdict(content: &str) -> Result<ClassifierVerdict, ClassifierError> {
    let parsed = JSON_BLOCK
        .find(content)
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .filter(Value::is_object);

    let Some(result) = parsed else {
        let lowered = content.to_lowercase();
        if REJECTION_MARKERS.iter().any(|m| lowered.contains(m)) {
            return Ok(ClassifierVerdict {
                passed: false,
                score: 0.8,
                risk_level: RiskLevel::High,
                reasons: vec!["Content may contain sensitive material".to_string()],
                suggestions: vec!["Revise the flagged passages and resubmit".to_string()],
                flagged_keywords: Vec::new(),
            });
        }
        return Err(ClassifierError::Malformed(format!(
            "no JSON object in classifier answer: {}",
            content.chars().take(200).collect::<String>()
        )));
    };

    let score = result["score"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
    let risk_level = result["risk_level"]
        .as_str()
        .and_then(|s| s.parse::<RiskLevel>().ok())
        .unwrap_or_else(|| RiskLevel::from_score(score));

    Ok(ClassifierVerdict {
        passed: result["passed"].as_bool().unwrap_or(true),
        score,
        risk_level,
        reasons: string_list(&result["reasons"]),
        suggestions: string_list(&result["suggestions"]),
        flagged_keywords: string_list(&result["flagged_keywords"]),
    })
}
