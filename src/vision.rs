//! The vision module classifies the objects on a photo of a location using a
//! vision capable LLM, optionally after a gate step that checks the photo shows a givebox.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, ChatProvider, ImageMime};
use log::{debug, info};
use once_cell::sync::Lazy;
use rate_guard::{RateLimit, StdTokenBucket, TokenBucketBuilder};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    ANALYSIS_PROMPT, BBOX_FORBIDDEN, BBOX_REQUIRED, CATEGORY_LIST, CODE_FENCE_STRIPPER,
    GATE_PROMPT, MAX_IMAGE_BYTES, THINK_STRIPPER,
};
use crate::error::VisionError;

static THINK_STRIPPER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(THINK_STRIPPER).expect("Failed to compile THINK_STRIPPER regex"));

static CODE_FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(CODE_FENCE_STRIPPER).expect("Failed to compile CODE_FENCE_STRIPPER regex")
});

/// Fixed object categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Books,
    Clothes,
    Toys,
    Electronics,
    KitchenItems,
    HouseholdGoods,
    Shoes,
    Bags,
    Games,
    Decorations,
    Tools,
    OfficeSupplies,
    Plants,
    Food,
    Other,
}

impl Category {
    pub const ALL: [Category; 15] = [
        Category::Books,
        Category::Clothes,
        Category::Toys,
        Category::Electronics,
        Category::KitchenItems,
        Category::HouseholdGoods,
        Category::Shoes,
        Category::Bags,
        Category::Games,
        Category::Decorations,
        Category::Tools,
        Category::OfficeSupplies,
        Category::Plants,
        Category::Food,
        Category::Other,
    ];
}

/// How full the givebox looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fullness {
    #[serde(rename = "leer")]
    Empty,
    #[serde(rename = "normal gefüllt")]
    Normal,
    #[serde(rename = "voll")]
    Full,
    #[serde(rename = "überfüllt")]
    Overfull,
}

/// Outcome of the gate step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    GiveboxOk,
    GiveboxNotOk,
}

/// A recognized object. `bbox` is `[x, y, w, h]` in pixels from the top left corner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[i64; 4]>,
}

/// Result of classifying one photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisionReport {
    pub generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_status: Option<GateStatus>,
    pub categories: Vec<Category>,
    pub fullness: Option<Fullness>,
    pub items: Vec<Item>,
}

impl VisionReport {
    fn new(gate_status: Option<GateStatus>, fullness: Option<Fullness>, items: Vec<Item>) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            gate_status,
            categories: Category::ALL.to_vec(),
            fullness,
            items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalysisAnswer {
    items: Vec<Item>,
    fullness: Fullness,
}

#[derive(Debug, Deserialize)]
struct GateAnswer {
    items: Vec<GateItem>,
}

#[derive(Debug, Deserialize)]
struct GateItem {
    category: GateStatus,
}

/// Configuration containing shared data for classification requests
pub struct VisionContext<'a> {
    /// Model used for object recognition
    pub model: &'a dyn ChatProvider,
    /// Model used for the gate step, defaults to `model`
    pub gate_model: Option<&'a dyn ChatProvider>,
    /// Rate limiter for controlling request frequency
    pub rate_limiter: Option<&'a StdTokenBucket>,
}

/// A photo checked for size and format.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub mime: ImageMime,
    pub bytes: Vec<u8>,
}

/// Checks the size limit and detects the image format from its magic bytes.
///
/// # Errors
///
/// Returns an error if the image exceeds [`MAX_IMAGE_BYTES`] or is not JPEG, PNG, GIF or WEBP.
pub fn prepare_image(bytes: Vec<u8>) -> Result<PreparedImage, VisionError> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(VisionError::ImageTooLarge {
            limit: MAX_IMAGE_BYTES,
        });
    }
    let mime = sniff_image_mime(&bytes).ok_or(VisionError::UnsupportedImage)?;
    Ok(PreparedImage { mime, bytes })
}

/// Downloads an image, giving up as soon as it grows past [`MAX_IMAGE_BYTES`].
///
/// # Errors
///
/// Returns an error if the request fails, the server answers with an error status or the
/// image exceeds the size limit.
pub async fn fetch_image(url: &Url) -> Result<Vec<u8>, VisionError> {
    info!("Downloading image from {url}");
    let mut response = reqwest::Client::builder()
        .user_agent(concat!("wikipoi/", env!("CARGO_PKG_VERSION")))
        .build()?
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?;

    if response
        .content_length()
        .is_some_and(|length| length > MAX_IMAGE_BYTES as u64)
    {
        return Err(VisionError::ImageTooLarge {
            limit: MAX_IMAGE_BYTES,
        });
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        append_capped(&mut bytes, &chunk, MAX_IMAGE_BYTES)?;
    }

    Ok(bytes)
}

/// Appends `chunk` to `buffer` unless the result would exceed `limit` bytes.
///
/// # Errors
///
/// Returns [`VisionError::ImageTooLarge`] when the limit would be exceeded. `buffer` is left unchanged.
pub fn append_capped(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize) -> Result<(), VisionError> {
    if buffer.len().saturating_add(chunk.len()) > limit {
        return Err(VisionError::ImageTooLarge { limit });
    }
    buffer.extend_from_slice(chunk);
    Ok(())
}

/// Detects the image format from the leading bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<ImageMime> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageMime::JPEG)
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ImageMime::PNG)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageMime::GIF)
    } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP".as_slice()) {
        Some(ImageMime::WEBP)
    } else {
        None
    }
}

/// Recognizes the objects on `image` and estimates how full the givebox is.
///
/// # Errors
///
/// Returns an error if the model call fails or its answer does not fit the expected schema.
pub async fn classify_image(
    image: &PreparedImage,
    use_bbox: bool,
    ctx: &VisionContext<'_>,
) -> Result<VisionReport, VisionError> {
    let (fullness, items) = analyze(image, use_bbox, ctx).await?;
    Ok(VisionReport::new(None, Some(fullness), items))
}

/// Runs the gate step first and recognizes objects only if the photo shows a givebox.
///
/// A negative gate yields a report without items and without fullness.
///
/// # Errors
///
/// Returns an error if a model call fails or an answer does not fit the expected schema.
pub async fn classify_image_with_gate(
    image: &PreparedImage,
    use_bbox: bool,
    ctx: &VisionContext<'_>,
) -> Result<VisionReport, VisionError> {
    let gate_model = ctx.gate_model.unwrap_or(ctx.model);
    let answer: GateAnswer = ask(gate_model, GATE_PROMPT, image, ctx).await?;
    let gate_ok = answer
        .items
        .iter()
        .any(|item| item.category == GateStatus::GiveboxOk);

    if !gate_ok {
        info!("Gate rejected image, skipping object recognition");
        return Ok(VisionReport::new(
            Some(GateStatus::GiveboxNotOk),
            None,
            Vec::new(),
        ));
    }

    let (fullness, items) = analyze(image, use_bbox, ctx).await?;
    Ok(VisionReport::new(
        Some(GateStatus::GiveboxOk),
        Some(fullness),
        items,
    ))
}

async fn analyze(
    image: &PreparedImage,
    use_bbox: bool,
    ctx: &VisionContext<'_>,
) -> Result<(Fullness, Vec<Item>), VisionError> {
    let prompt = analysis_prompt(use_bbox);
    let answer: AnalysisAnswer = ask(ctx.model, &prompt, image, ctx).await?;
    let items = normalize_items(answer.items, use_bbox)?;
    Ok((answer.fullness, items))
}

fn analysis_prompt(use_bbox: bool) -> String {
    let (bbox, bbox_field) = if use_bbox {
        (BBOX_REQUIRED, r#", "bbox": [0, 0, 0, 0]"#)
    } else {
        (BBOX_FORBIDDEN, "")
    };

    ANALYSIS_PROMPT
        .replace("{categories}", CATEGORY_LIST)
        .replace("{bbox}", bbox)
        .replace("{bbox_field}", bbox_field)
}

/// Drops duplicate names (case-insensitive, first wins) and enforces the bbox contract.
fn normalize_items(items: Vec<Item>, use_bbox: bool) -> Result<Vec<Item>, VisionError> {
    let mut seen = HashSet::new();
    let mut clean = Vec::with_capacity(items.len());

    for mut item in items {
        if !seen.insert(item.name.trim().to_lowercase()) {
            debug!("Dropping duplicate item '{}'", item.name);
            continue;
        }
        if !use_bbox {
            item.bbox = None;
        } else if item.bbox.is_none() {
            return Err(VisionError::Schema(format!(
                "item '{}' has no bounding box",
                item.name
            )));
        }
        clean.push(item);
    }

    Ok(clean)
}

/// Sends the prompt and the image to `model` and decodes its JSON answer.
async fn ask<T: DeserializeOwned>(
    model: &dyn ChatProvider,
    prompt: &str,
    image: &PreparedImage,
    ctx: &VisionContext<'_>,
) -> Result<T, VisionError> {
    let messages = vec![
        ChatMessage::user().content(prompt).build(),
        ChatMessage::user()
            .image(image.mime.clone(), image.bytes.clone())
            .build(),
    ];

    if let Some(limiter) = ctx.rate_limiter {
        loop {
            match limiter.try_acquire(1) {
                Ok(()) => break,
                Err(_) => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    let response = model
        .chat(&messages)
        .await
        .map_err(|err| VisionError::Model(err.to_string()))?
        .to_string();

    decode_answer(&response)
}

/// Strips `<think>` blocks and code fences, then decodes the remaining JSON.
///
/// # Errors
///
/// Returns [`VisionError::Schema`] if the answer is not valid JSON of the expected shape.
pub fn decode_answer<T: DeserializeOwned>(response: &str) -> Result<T, VisionError> {
    let without_think = THINK_STRIPPER_REGEX.replace_all(response, "");
    let json = CODE_FENCE_REGEX.replace_all(without_think.trim(), "");

    serde_json::from_str(json.trim()).map_err(|e| VisionError::Schema(e.to_string()))
}

/// Builds an LLM builder from a model URL such as `openai://gpt-5-mini`.
///
/// The scheme selects the backend, host (and user name, joined by `:`) the model name.
///
/// # Errors
///
/// Returns an error if the backend is unknown or the URL names no model.
pub fn model_builder(model_url: &Url, api_key: Option<String>) -> anyhow::Result<LLMBuilder> {
    let builder = LLMBuilder::new()
        .backend(
            LLMBackend::from_str(model_url.scheme())
                .map_err(|e| anyhow::anyhow!("Invalid LLM backend: {}", e))?,
        )
        .model(
            [
                model_url
                    .host_str()
                    .context("Specify model name as host URL.")?,
                model_url.username(),
            ]
            .iter()
            .filter(|x| !x.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(":"),
        );

    Ok(match api_key {
        Some(api_key) => builder.api_key(api_key),
        None => builder,
    })
}

/// Token bucket allowing `rpm` requests per minute.
pub fn rate_limiter(rpm: u32) -> Option<StdTokenBucket> {
    let capacity = u64::from(rpm.max(1));
    let refill_interval = Duration::from_secs_f64(60.0 / capacity as f64);

    TokenBucketBuilder::builder()
        .capacity(capacity)
        .refill_amount(1_u64)
        .refill_every(refill_interval)
        .with_time(rate_guard::StdTimeSource::new())
        .with_precision::<rate_guard::Nanos>()
        .build()
        .ok()
}
