use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

const DEEPL_FREE_URL: &str = "https://api-free.deepl.com/v2/translate";

/// Translation collaborator used to localize names and role labels.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String> {
        let mut out = self.translate_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| ServiceError::Parse("empty translation response".to_string()))
    }

    /// Output has the same length and order as the input.
    async fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>>;
}

/// Fail unless a batch response lines up one-to-one with its request.
pub fn check_batch_len(requested: usize, received: usize) -> Result<()> {
    if requested != received {
        return Err(ServiceError::Parse(format!(
            "translation batch returned {received} texts for {requested} inputs"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DeepL
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct DeeplRequest<'a> {
    text: &'a [String],
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeeplTranslation {
    text: String,
}

pub struct DeeplTranslator {
    client: reqwest::Client,
    api_key: String,
    target_lang: String,
    url: String,
}

impl DeeplTranslator {
    pub fn new(api_key: String, target_lang: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            target_lang: target_lang.into(),
            url: DEEPL_FREE_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl Translator for DeeplTranslator {
    async fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&DeeplRequest {
                text: texts,
                target_lang: &self.target_lang,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: DeeplResponse = resp.json().await?;
        check_batch_len(texts.len(), body.translations.len())?;
        Ok(body.translations.into_iter().map(|t| t.text).collect())
    }
}

/// Returns its input unchanged. Used when no translation key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTranslator;

#[async_trait]
impl Translator for IdentityTranslator {
    async fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>> {
        Ok(texts.to_vec())
    }
}
