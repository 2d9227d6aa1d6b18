mod vision_extras;

use serde_json::json;
use spectral::prelude::*;
use vision_extras::{PNG_BYTES, StubLlmProvider};
use wikipoi::constants::MAX_IMAGE_BYTES;
use wikipoi::error::VisionError;
use wikipoi::vision::{
    Category, Fullness, GateStatus, Item, VisionContext, append_capped, classify_image,
    classify_image_with_gate, decode_answer, prepare_image, sniff_image_mime,
};

const GATE_OK: &str = r#"{"items": [{"category": "givebox_ok"}]}"#;
const GATE_NOT_OK: &str = r#"{"items": [{"category": "givebox_not_ok"}]}"#;

const ANALYSIS_WITH_BBOX: &str = r#"{
    "items": [
        {"name": "Roman", "category": "books", "bbox": [10, 20, 30, 40]},
        {"name": "roman ", "category": "books", "bbox": [50, 60, 70, 80]},
        {"name": "Teller", "category": "kitchen_items", "bbox": [1, 2, 3, 4]}
    ],
    "fullness": "normal gefüllt"
}"#;

fn context(model: &StubLlmProvider) -> VisionContext<'_> {
    VisionContext {
        model,
        gate_model: None,
        rate_limiter: None,
    }
}

#[tokio::test]
async fn duplicates_are_dropped_case_insensitively() {
    let model = StubLlmProvider::new([ANALYSIS_WITH_BBOX]);
    let image = prepare_image(PNG_BYTES.to_vec()).expect("png");

    let report = classify_image(&image, true, &context(&model))
        .await
        .expect("Expected successful classification.");

    assert_that(&report.items).is_equal_to(vec![
        Item {
            name: "Roman".to_owned(),
            category: Category::Books,
            bbox: Some([10, 20, 30, 40]),
        },
        Item {
            name: "Teller".to_owned(),
            category: Category::KitchenItems,
            bbox: Some([1, 2, 3, 4]),
        },
    ]);
    assert_that(&report.fullness).is_equal_to(Some(Fullness::Normal));
    assert_that(&report.gate_status).is_none();
    assert_that(&report.categories.len()).is_equal_to(Category::ALL.len());
}

#[tokio::test]
async fn bbox_is_dropped_when_not_requested() {
    let model = StubLlmProvider::new([ANALYSIS_WITH_BBOX]);
    let image = prepare_image(PNG_BYTES.to_vec()).expect("png");

    let report = classify_image(&image, false, &context(&model))
        .await
        .expect("Expected successful classification.");

    assert_that(&report.items.iter().all(|item| item.bbox.is_none())).is_true();

    let json = serde_json::to_value(&report).expect("json");
    assert_that(&json.pointer("/items/0")).is_equal_to(Some(&json!({
        "name": "Roman",
        "category": "books"
    })));
}

#[tokio::test]
async fn missing_bbox_breaks_the_contract() {
    let model = StubLlmProvider::new([
        r#"{"items": [{"name": "Schuh", "category": "shoes"}], "fullness": "leer"}"#,
    ]);
    let image = prepare_image(PNG_BYTES.to_vec()).expect("png");

    let result = classify_image(&image, true, &context(&model)).await;

    assert_that(&matches!(result, Err(VisionError::Schema(_)))).is_true();
}

#[tokio::test]
async fn negative_gate_skips_object_recognition() {
    let model = StubLlmProvider::new([GATE_NOT_OK]);
    let image = prepare_image(PNG_BYTES.to_vec()).expect("png");

    let report = classify_image_with_gate(&image, true, &context(&model))
        .await
        .expect("Expected successful classification.");

    assert_that(&model.calls()).is_equal_to(1);
    assert_that(&report.gate_status).is_equal_to(Some(GateStatus::GiveboxNotOk));
    assert_that(&report.fullness).is_none();
    assert_that(&report.items).has_length(0);
}

#[tokio::test]
async fn positive_gate_uses_the_gate_model() {
    let gate = StubLlmProvider::new([GATE_OK]);
    let model = StubLlmProvider::new([ANALYSIS_WITH_BBOX]);
    let image = prepare_image(PNG_BYTES.to_vec()).expect("png");
    let ctx = VisionContext {
        model: &model,
        gate_model: Some(&gate),
        rate_limiter: None,
    };

    let report = classify_image_with_gate(&image, true, &ctx)
        .await
        .expect("Expected successful classification.");

    assert_that(&gate.calls()).is_equal_to(1);
    assert_that(&model.calls()).is_equal_to(1);
    assert_that(&report.gate_status).is_equal_to(Some(GateStatus::GiveboxOk));
    assert_that(&report.items).has_length(2);
}

#[tokio::test]
async fn unknown_category_is_a_schema_error() {
    let model = StubLlmProvider::new([
        r#"{"items": [{"name": "Auto", "category": "cars"}], "fullness": "voll"}"#,
    ]);
    let image = prepare_image(PNG_BYTES.to_vec()).expect("png");

    let result = classify_image(&image, false, &context(&model)).await;

    assert_that(&matches!(result, Err(VisionError::Schema(_)))).is_true();
}

#[test]
fn think_blocks_and_code_fences_are_stripped() {
    let answer = "<think>Hmm, a box\nwith books</think>\n```json\n{\"items\": [], \"fullness\": \"überfüllt\"}\n```";

    let decoded: serde_json::Value = decode_answer(answer).expect("json");

    assert_that(&decoded).is_equal_to(json!({ "items": [], "fullness": "überfüllt" }));
}

#[test]
fn image_format_is_sniffed() {
    assert_that(&sniff_image_mime(PNG_BYTES).is_some()).is_true();
    assert_that(&sniff_image_mime(&[0xFF, 0xD8, 0xFF, 0xE0]).is_some()).is_true();
    assert_that(&sniff_image_mime(b"GIF89a...").is_some()).is_true();
    assert_that(&sniff_image_mime(b"RIFF\0\0\0\0WEBPVP8 ").is_some()).is_true();
    assert_that(&sniff_image_mime(b"%PDF-1.7").is_none()).is_true();
    assert_that(&sniff_image_mime(b"").is_none()).is_true();
}

#[test]
fn unsupported_image_is_rejected() {
    let result = prepare_image(b"plain text".to_vec());

    assert_that(&matches!(result, Err(VisionError::UnsupportedImage))).is_true();
}

#[test]
fn oversized_image_is_rejected() {
    let mut bytes = PNG_BYTES.to_vec();
    bytes.resize(MAX_IMAGE_BYTES + 1, 0);

    let result = prepare_image(bytes);

    assert_that(&matches!(
        result,
        Err(VisionError::ImageTooLarge {
            limit: MAX_IMAGE_BYTES
        })
    ))
    .is_true();
}

#[test]
fn download_stops_past_the_size_limit() {
    let mut buffer = Vec::new();

    append_capped(&mut buffer, &[1; 6], 10).expect("first chunk fits");
    append_capped(&mut buffer, &[2; 4], 10).expect("exactly at the limit");
    let result = append_capped(&mut buffer, &[3], 10);

    assert_that(&matches!(result, Err(VisionError::ImageTooLarge { limit: 10 }))).is_true();
    assert_that(&buffer).has_length(10);
}
