use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::{
    error::{GenerationError, SemanticFailure},
    media::{preview, EncodedImage},
    orchestrator::{GenerationRequest, ImageGenerator},
};

const SAFETY_FINISH_REASONS: &[&str] = &["SAFETY", "IMAGE_SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn redact(&self, text: &str) -> String {
        if self.api_key.is_empty() {
            return text.to_string();
        }
        text.replace(&self.api_key, "***")
    }

    fn request_body(request: &GenerationRequest) -> serde_json::Value {
        json!({
            "contents": [{
                "parts": [
                    {"inlineData": {"mimeType": request.user_image.mime_type, "data": request.user_image.data}},
                    {"inlineData": {"mimeType": request.model_image.mime_type, "data": request.model_image.data}},
                    {"text": request.instruction}
                ]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
                "candidateCount": 1
            }
        })
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<EncodedImage, GenerationError> {
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, self.model, self.api_key);
        info!("🔗 Making request to: {}", self.redact(&url));

        let request_body = Self::request_body(request);
        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut logged = request_body.clone();
            truncate_base64_in_json(&mut logged);
            debug!("📤 Request body: {}", serde_json::to_string_pretty(&logged).unwrap_or_default());
        }

        let response = self.client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                let message = self.redact(&e.to_string());
                error!("❌ Gemini request failed to send: {} (timeout={}, connect={})", message, e.is_timeout(), e.is_connect());
                GenerationError::Transport(message)
            })?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(self.redact(&e.to_string())))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", truncate_for_log(&response_text, 2000));
            return Err(classify_error_status(status, &response_text));
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(mut value) = serde_json::from_str::<serde_json::Value>(&response_text) {
                truncate_base64_in_json(&mut value);
                debug!("📥 Raw Gemini API response: {}", value);
            }
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text).map_err(|e| {
            GenerationError::Unknown(format!("parse error: {}: {}", e, truncate_for_log(&response_text, 500)))
        })?;

        let image = interpret_response(parsed)?;
        info!("🖼️ Extracted {} image from API response: {}", image.mime_type, preview(&image.data));
        Ok(image)
    }
}

/// Demo-mode generator producing an SVG card instead of calling the service.
pub struct PlaceholderGenerator;

impl PlaceholderGenerator {
    fn render(instruction: &str) -> String {
        let palette = [
            "#6366F1", // Indigo
            "#EC4899", // Pink
            "#10B981", // Green
            "#F59E0B", // Amber
            "#0EA5E9", // Sky
        ];
        let color = palette[instruction.len() % palette.len()];

        let svg = format!(r#"<svg width="400" height="533" xmlns="http://www.w3.org/2000/svg">
            <defs>
                <linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">
                    <stop offset="0%" style="stop-color:{};stop-opacity:1" />
                    <stop offset="100%" style="stop-color:{};stop-opacity:0.6" />
                </linearGradient>
            </defs>
            <rect width="400" height="533" fill="url(#grad)" />
            <text x="200" y="260" font-family="Arial, sans-serif" font-size="24" font-weight="bold"
                  text-anchor="middle" fill="white">
                Photoshoot Preview
            </text>
            <text x="200" y="300" font-family="Arial, sans-serif" font-size="12"
                  text-anchor="middle" fill="white" opacity="0.8">
                Demo mode: set GEMINI_API_KEY to generate images
            </text>
        </svg>"#, color, color);

        base64::engine::general_purpose::STANDARD.encode(svg.as_bytes())
    }
}

#[async_trait]
impl ImageGenerator for PlaceholderGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<EncodedImage, GenerationError> {
        info!("Using demo mode - no real images generated");
        let data = Self::render(&request.instruction);
        info!("📦 Generated placeholder image: {}", preview(&data));
        Ok(EncodedImage { mime_type: "image/svg+xml".to_string(), data })
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text { text: String },
    #[allow(dead_code)]
    Other(serde_json::Value)
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn interpret_response(resp: GeminiResponse) -> Result<EncodedImage, GenerationError> {
    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        warn!("⚠️ Prompt blocked by Gemini: {}", reason);
        return Err(SemanticFailure::SafetyBlocked { reason }.into());
    }

    let mut texts = Vec::new();
    let mut blocked_reason = None;
    for candidate in resp.candidates {
        for part in candidate.content.parts {
            match part {
                Part::Inline { inline_data } if inline_data.mime_type.starts_with("image/") && !inline_data.data.is_empty() => {
                    info!("🎯 Found image data with mime type: {}", inline_data.mime_type);
                    return Ok(EncodedImage { mime_type: inline_data.mime_type, data: inline_data.data });
                }
                Part::Text { text } if !text.trim().is_empty() => texts.push(text.trim().to_string()),
                _ => {}
            }
        }
        if let Some(reason) = candidate.finish_reason {
            if SAFETY_FINISH_REASONS.contains(&reason.as_str()) {
                blocked_reason.get_or_insert(reason);
            }
        }
    }

    if let Some(reason) = blocked_reason {
        warn!("⚠️ Candidate withheld by safety filter: {}", reason);
        return Err(SemanticFailure::SafetyBlocked { reason }.into());
    }

    info!("⚠️ No inline image data found in response structure");
    let text = if texts.is_empty() { None } else { Some(texts.join("\n")) };
    Err(SemanticFailure::NoImage { text }.into())
}

fn classify_error_status(status: StatusCode, body: &str) -> GenerationError {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let api_status = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/status"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let message = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| truncate_for_log(body.trim(), 500));

    match (status, api_status.as_deref()) {
        (StatusCode::TOO_MANY_REQUESTS, _) | (_, Some("RESOURCE_EXHAUSTED")) => {
            SemanticFailure::QuotaExceeded(message).into()
        }
        (StatusCode::BAD_REQUEST, Some("INVALID_ARGUMENT")) => SemanticFailure::InvalidInput(message).into(),
        _ => GenerationError::Transport(format!("status={} body={}", status, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "gemini-2.5-flash-image-preview";

    fn request() -> GenerationRequest {
        GenerationRequest {
            user_image: EncodedImage { mime_type: "image/png".into(), data: "dXNlcg==".into() },
            model_image: EncodedImage { mime_type: "image/jpeg".into(), data: "bW9kZWw=".into() },
            instruction: "place the model on a beach".into(),
        }
    }

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new("test-key".into(), server.uri(), MODEL.into())
    }

    async fn respond(status: u16, body: serde_json::Value) -> (MockServer, GeminiClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/models/{MODEL}:generateContent")))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);
        (server, client)
    }

    #[tokio::test]
    async fn sends_both_images_and_instruction_in_one_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/models/{MODEL}:generateContent")))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{"parts": [
                    {"inlineData": {"mimeType": "image/png", "data": "dXNlcg=="}},
                    {"inlineData": {"mimeType": "image/jpeg", "data": "bW9kZWw="}},
                    {"text": "place the model on a beach"}
                ]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [
                    {"text": "Here is your photo"},
                    {"inlineData": {"mimeType": "image/png", "data": "aW1hZ2U="}}
                ]}, "finishReason": "STOP"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let image = client_for(&server).generate(&request()).await.unwrap();
        assert_eq!(image, EncodedImage { mime_type: "image/png".into(), data: "aW1hZ2U=".into() });
    }

    #[tokio::test]
    async fn success_without_image_is_semantic_failure() {
        let (_server, client) = respond(200, json!({
            "candidates": [{"content": {"parts": [{"text": "I cannot do that"}]}, "finishReason": "STOP"}]
        })).await;

        let err = client.generate(&request()).await.unwrap_err();
        match err {
            GenerationError::Semantic(SemanticFailure::NoImage { text }) => {
                assert_eq!(text.as_deref(), Some("I cannot do that"));
            }
            other => panic!("expected no-image failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blocked_prompt_is_safety_failure() {
        let (_server, client) = respond(200, json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })).await;

        let err = client.generate(&request()).await.unwrap_err();
        assert_eq!(err.kind(), "safety_blocked");
    }

    #[tokio::test]
    async fn safety_finish_reason_is_safety_failure() {
        let (_server, client) = respond(200, json!({
            "candidates": [{"finishReason": "IMAGE_SAFETY"}]
        })).await;

        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Semantic(SemanticFailure::SafetyBlocked { reason }) if reason == "IMAGE_SAFETY"));
    }

    #[tokio::test]
    async fn rate_limit_is_quota_failure() {
        let (_server, client) = respond(429, json!({
            "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        })).await;

        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Semantic(SemanticFailure::QuotaExceeded(msg)) if msg == "Quota exceeded"));
    }

    #[tokio::test]
    async fn invalid_argument_is_invalid_input() {
        let (_server, client) = respond(400, json!({
            "error": {"code": 400, "message": "Unsupported MIME type", "status": "INVALID_ARGUMENT"}
        })).await;

        let err = client.generate(&request()).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn resource_exhausted_is_quota_failure_whatever_the_status() {
        let (_server, client) = respond(403, json!({
            "error": {"code": 403, "message": "Project quota exhausted", "status": "RESOURCE_EXHAUSTED"}
        })).await;

        let err = client.generate(&request()).await.unwrap_err();
        assert_eq!(err.kind(), "quota_exceeded");
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn unparseable_success_body_is_unknown_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/models/{MODEL}:generateContent")))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).generate(&request()).await.unwrap_err();
        assert_eq!(err.kind(), "unknown");
    }

    #[tokio::test]
    async fn server_error_is_transport_failure() {
        let (_server, client) = respond(503, json!({
            "error": {"code": 503, "message": "The model is overloaded", "status": "UNAVAILABLE"}
        })).await;

        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Transport(msg) if msg.contains("overloaded")));
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_failure_with_key_redacted() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let client = GeminiClient::new("test-key".into(), uri, MODEL.into());
        let err = client.generate(&request()).await.unwrap_err();
        match err {
            GenerationError::Transport(msg) => assert!(!msg.contains("test-key")),
            other => panic!("expected transport failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn placeholder_returns_svg() {
        let image = PlaceholderGenerator.generate(&request()).await.unwrap();
        assert_eq!(image.mime_type, "image/svg+xml");
        let svg = String::from_utf8(image.decode().unwrap()).unwrap();
        assert!(svg.contains("Photoshoot Preview"));
    }

    #[test]
    fn truncates_inline_data_for_logs() {
        let mut value = json!({"parts": [{"inlineData": {"data": "A".repeat(400)}}]});
        truncate_base64_in_json(&mut value);
        let data = value["parts"][0]["inlineData"]["data"].as_str().unwrap();
        assert!(data.ends_with("[truncated 350 chars]"));
    }

    #[test]
    fn leaves_non_base64_data_untouched() {
        let text = "é".repeat(120);
        let mut value = json!({"inlineData": {"data": text}});
        truncate_base64_in_json(&mut value);
        assert_eq!(value["inlineData"]["data"].as_str().unwrap(), text);
    }
}
