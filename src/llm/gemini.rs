use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::{detect_mime_type, ImageInput};
use crate::storyboard::error::{Result, StoryboardError};
use crate::storyboard::{SceneAnalysis, SceneAnalyzer};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

pub const SCENE_ANALYSIS_PROMPT: &str = r#"Analyze the uploaded reference image(s).
Extract a detailed visual description of the subject (character or object), their clothing/appearance, the environment/background, lighting conditions, and the overall artistic style (e.g., cinematic, cyberpunk, oil painting).

The description should be optimized for an AI image generator prompt.

Return the result as a JSON object with two fields:
- "en": The description in English.
- "cn": The description in Chinese (Simplified)."#;

static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid code fence regex")
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiSceneAnalyzer {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiSceneAnalyzer {
    pub fn new(
        client: Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            get_http_client().clone(),
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.gemini_base_url.clone(),
            Duration::from_secs(config.gemini_timeout_seconds),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    async fn call_generate_content(&self, payload: &Value) -> Result<GeminiResponse> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                target: "llm.gemini",
                model = %self.model,
                payload = %summarize_payload(payload)
            );
        }

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect()
                );
                StoryboardError::AnalysisService(format!("Gemini request failed: {err_text}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&self.redact(&body));
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            let detail = message.unwrap_or(body_summary);
            return Err(StoryboardError::AnalysisService(format!(
                "Gemini request failed with status {status}: {detail}"
            )));
        }

        response.json::<GeminiResponse>().await.map_err(|err| {
            StoryboardError::AnalysisService(format!(
                "Gemini returned an unreadable response: {}",
                self.redact(&err.to_string())
            ))
        })
    }
}

impl SceneAnalyzer for GeminiSceneAnalyzer {
    async fn analyze(&self, images: &[ImageInput]) -> Result<SceneAnalysis> {
        if images.is_empty() {
            return Err(StoryboardError::EmptyInput);
        }
        if self.api_key.trim().is_empty() {
            return Err(StoryboardError::AnalysisService(
                "GEMINI_API_KEY is not configured".to_string(),
            ));
        }

        let payload = build_analysis_payload(images)?;
        let metadata = json!({ "images": images.len() });
        log_llm_timing(
            "gemini",
            &self.model,
            "analyze_scene",
            Some(metadata),
            move || async move {
                let response = self.call_generate_content(&payload).await?;
                let text = extract_text_from_response(&response)?;
                parse_scene_analysis(&text)
            },
        )
        .await
    }
}

fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => lowered,
    }
}

fn gemini_supports_image_mime(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "image/png" | "image/jpeg" | "image/webp" | "image/heic" | "image/heif"
    )
}

fn gemini_mime_for_image(image: &ImageInput) -> Option<String> {
    let mut candidates = Vec::new();
    if !image.mime_type.trim().is_empty() {
        candidates.push(image.mime_type.clone());
    }
    if let Some(detected) = detect_mime_type(&image.bytes) {
        candidates.push(detected);
    }

    candidates
        .into_iter()
        .map(|candidate| normalize_image_mime_type(&candidate))
        .find(|candidate| gemini_supports_image_mime(candidate))
}

fn build_analysis_payload(images: &[ImageInput]) -> Result<Value> {
    let mut parts = Vec::with_capacity(images.len() + 1);
    for (index, image) in images.iter().enumerate() {
        let mime_type = gemini_mime_for_image(image).ok_or_else(|| {
            StoryboardError::AnalysisService(format!(
                "Unsupported image type {} for {}",
                image.mime_type,
                image.label(index)
            ))
        })?;
        parts.push(json!({
            "inlineData": {
                "mimeType": mime_type,
                "data": general_purpose::STANDARD.encode(&image.bytes)
            }
        }));
    }
    parts.push(json!({ "text": SCENE_ANALYSIS_PROMPT }));

    Ok(json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "en": { "type": "STRING" },
                    "cn": { "type": "STRING" }
                },
                "required": ["en", "cn"]
            }
        }
    }))
}

fn extract_text_from_response(response: &GeminiResponse) -> Result<String> {
    let mut text_parts = Vec::new();
    let mut finish_reason = None;
    for candidate in response.candidates.as_deref().unwrap_or(&[]) {
        if finish_reason.is_none() {
            finish_reason = candidate.finish_reason.clone();
        }
        let parts = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.as_deref())
            .unwrap_or(&[]);
        text_parts.extend(parts.iter().filter_map(|part| part.text.as_deref()));
    }

    let text = text_parts.concat();
    if text.trim().is_empty() {
        let reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.clone())
            .or(finish_reason);
        let detail = match reason {
            Some(reason) => format!("Empty response from Gemini (reason: {reason})"),
            None => "Empty response from Gemini".to_string(),
        };
        return Err(StoryboardError::AnalysisService(detail));
    }

    Ok(text)
}

fn parse_scene_analysis(text: &str) -> Result<SceneAnalysis> {
    let body = match CODE_FENCE_RE.captures(text) {
        Some(captures) => captures.get(1).map_or("", |m| m.as_str()),
        None => text.trim(),
    };

    let malformed = |detail: String| {
        StoryboardError::AnalysisService(format!(
            "Gemini response is not a {{en, cn}} object: {detail} (body: {})",
            truncate_for_log(body, 200)
        ))
    };

    let value: Value = serde_json::from_str(body).map_err(|err| malformed(err.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(malformed("expected a JSON object".to_string()));
    };
    let field = |name: &str| {
        fields
            .get(name)
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .ok_or_else(|| malformed(format!("missing string field '{name}'")))
    };
    let analysis = SceneAnalysis {
        en: field("en")?,
        cn: field("cn")?,
    };

    if analysis.en.trim().is_empty() && analysis.cn.trim().is_empty() {
        return Err(StoryboardError::AnalysisService(
            "Gemini returned an empty scene description".to_string(),
        ));
    }
    Ok(analysis)
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_payload(payload: &Value) -> Value {
    let parts = payload
        .pointer("/contents/0/parts")
        .and_then(|value| value.as_array())
        .map(|parts| {
            parts
                .iter()
                .map(|part| {
                    if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                        json!({ "text": truncate_for_log(text, 80) })
                    } else if let Some(inline_data) = part.get("inlineData") {
                        let mime_type = inline_data
                            .get("mimeType")
                            .and_then(|value| value.as_str())
                            .unwrap_or("unknown");
                        let data_len = inline_data
                            .get("data")
                            .and_then(|value| value.as_str())
                            .map(|value| value.len())
                            .unwrap_or(0);
                        json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                    } else {
                        json!({ "unknownPart": true })
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut summary = Map::new();
    summary.insert("parts".to_string(), Value::Array(parts));
    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }
    Value::Object(summary)
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm::media::sample_png;

    const API_KEY: &str = "test-secret-key";

    fn analyzer(base_url: &str, api_key: &str) -> GeminiSceneAnalyzer {
        GeminiSceneAnalyzer::new(
            Client::new(),
            api_key,
            "test-model",
            base_url,
            Duration::from_secs(5),
        )
    }

    fn png_input() -> ImageInput {
        ImageInput::new(sample_png(2, 2), "image/png".to_string(), Some("ref.png".to_string()))
    }

    fn text_response(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn payload_puts_images_before_instruction() {
        let jpg = ImageInput::new(vec![1, 2, 3], "image/JPG".to_string(), None);
        let payload = build_analysis_payload(&[png_input(), jpg]).unwrap();

        let parts = payload
            .pointer("/contents/0/parts")
            .and_then(|value| value.as_array())
            .unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
        assert_eq!(parts[2]["text"], SCENE_ANALYSIS_PROMPT);
        assert_eq!(
            payload["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            payload["generationConfig"]["responseSchema"]["required"],
            json!(["en", "cn"])
        );
    }

    #[test]
    fn payload_rejects_non_image_blobs() {
        let pdf = ImageInput::new(b"%PDF-1.4".to_vec(), "application/pdf".to_string(), None);
        let err = build_analysis_payload(&[pdf]).unwrap_err();
        assert!(matches!(err, StoryboardError::AnalysisService(msg) if msg.contains("image-1")));
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        let plain = parse_scene_analysis(r#"{"en":"A red fox","cn":"一只红狐狸"}"#).unwrap();
        assert_eq!(plain.en, "A red fox");
        assert_eq!(plain.cn, "一只红狐狸");

        let fenced =
            parse_scene_analysis("```json\n{\"en\": \"Snowy peak\", \"cn\": \"雪山\"}\n```").unwrap();
        assert_eq!(fenced.cn, "雪山");
    }

    #[test]
    fn rejects_malformed_scene_payloads() {
        for body in [
            r#"{"en":"only english"}"#,
            r#"{"en": 1, "cn": "数字"}"#,
            "not json at all",
            r#"["en", "cn"]"#,
            r#"{"en":"  ","cn":""}"#,
        ] {
            let result = parse_scene_analysis(body);
            assert!(
                matches!(result, Err(StoryboardError::AnalysisService(_))),
                "accepted {body:?}"
            );
        }
    }

    #[test]
    fn empty_candidates_report_block_reason() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let err = extract_text_from_response(&response).unwrap_err();
        assert_eq!(
            err,
            StoryboardError::AnalysisService("Empty response from Gemini (reason: SAFETY)".to_string())
        );
    }

    #[test]
    fn joins_text_parts_across_chunks() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"en\":\"a\"," }, { "text": "\"cn\":\"b\"}" }] }
            }]
        }))
        .unwrap();
        let text = extract_text_from_response(&response).unwrap();
        assert_eq!(parse_scene_analysis(&text).unwrap().cn, "b");
    }

    #[test]
    fn keeps_whitespace_parts_between_chunks() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "{\"en\":\"misty" },
                    { "text": " " },
                    { "text": "harbor\",\"cn\":\"雾港\"}" }
                ] }
            }]
        }))
        .unwrap();
        let text = extract_text_from_response(&response).unwrap();
        assert_eq!(parse_scene_analysis(&text).unwrap().en, "misty harbor");
    }

    #[tokio::test]
    async fn analyzes_images_through_generate_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(header("x-goog-api-key", API_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(
                r#"{"en":"A lone samurai on a bridge","cn":"桥上的孤独武士"}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = analyzer(&server.uri(), API_KEY)
            .analyze(&[png_input()])
            .await
            .unwrap();

        assert_eq!(analysis.en, "A lone samurai on a bridge");
        assert_eq!(analysis.cn, "桥上的孤独武士");
    }

    #[tokio::test]
    async fn http_errors_become_service_errors_without_the_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": format!("API key {API_KEY} not valid") }
            })))
            .mount(&server)
            .await;

        let err = analyzer(&server.uri(), API_KEY)
            .analyze(&[png_input()])
            .await
            .unwrap_err();

        let message = match err {
            StoryboardError::AnalysisService(message) => message,
            other => panic!("unexpected error {other:?}"),
        };
        assert!(message.contains("401"));
        assert!(message.contains("[redacted]"));
        assert!(!message.contains(API_KEY));
    }

    #[tokio::test]
    async fn empty_text_is_a_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("  ")))
            .mount(&server)
            .await;

        let err = analyzer(&server.uri(), API_KEY)
            .analyze(&[png_input()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoryboardError::AnalysisService(msg) if msg.contains("Empty response")));
    }

    #[tokio::test]
    async fn preconditions_are_checked_before_any_request() {
        let server = MockServer::start().await;

        let empty = analyzer(&server.uri(), API_KEY).analyze(&[]).await;
        assert_eq!(empty, Err(StoryboardError::EmptyInput));

        let no_key = analyzer(&server.uri(), "").analyze(&[png_input()]).await;
        assert!(matches!(no_key, Err(StoryboardError::AnalysisService(_))));

        let requests = server.received_requests().await.unwrap_or_default();
        assert!(requests.is_empty());
    }
}
