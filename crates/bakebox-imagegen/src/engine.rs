use std::time::Duration;

use serde::Serialize;

use bakebox_core::ImageSettings;

use crate::parse::{self, GenerateResponse};
use crate::ImageError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum Part {
    Text(String),
    #[serde(rename_all = "camelCase")]
    InlineData { mime_type: String, data: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

pub(crate) fn build_request(parts: Vec<Part>) -> GenerateRequest {
    GenerateRequest {
        contents: vec![RequestContent { parts }],
        generation_config: GenerationConfig {
            response_modalities: vec!["TEXT", "IMAGE"],
        },
    }
}

pub(crate) fn endpoint_url(settings: &ImageSettings) -> String {
    format!(
        "{}/models/{}:generateContent",
        settings.endpoint.trim_end_matches('/'),
        settings.model
    )
}

/// Send one `generateContent` call and return the first image as a data URL.
pub(crate) async fn generate(settings: &ImageSettings, parts: Vec<Part>) -> Result<String, ImageError> {
    if !settings.is_configured() {
        return Err(ImageError::NotConfigured);
    }

    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let response = client
        .post(endpoint_url(settings))
        .header("x-goog-api-key", &settings.api_key)
        .json(&build_request(parts))
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ImageError::Api {
            status: status.as_u16(),
            message: parse::error_message(&body),
        });
    }

    let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| ImageError::Api {
        status: status.as_u16(),
        message: format!("unreadable response: {e}"),
    })?;
    match parse::first_image(&parsed) {
        Some(url) => Ok(url),
        None => {
            let text = parse::text_parts(&parsed);
            if !text.is_empty() {
                tracing::warn!(%text, "image API answered with text only");
            }
            Err(ImageError::NoImage)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakebox_core::store::DEFAULT_IMAGE_ENDPOINT;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(build_request(vec![
            Part::Text("edit".into()),
            Part::InlineData {
                mime_type: "image/png".into(),
                data: "AAAA".into(),
            },
        ]))
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "contents": [{"parts": [
                    {"text": "edit"},
                    {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}
                ]}],
                "generationConfig": {"responseModalities": ["TEXT", "IMAGE"]}
            })
        );
    }

    #[test]
    fn url_joins_endpoint_and_model() {
        let settings = ImageSettings {
            api_key: "k".into(),
            model: "gemini-2.5-flash-image".into(),
            endpoint: format!("{DEFAULT_IMAGE_ENDPOINT}/"),
        };
        assert_eq!(
            endpoint_url(&settings),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }
}
