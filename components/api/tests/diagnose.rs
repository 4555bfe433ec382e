use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use api::{Api, ErrorKind};
use fakeml::{FakeEngine, FakeModel};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use inference::config::{CATALOG_PATH_KEY, MODEL_PATH_KEY};
use inference::{InferenceProvider, ProviderConfig};
use leafpostprocessor::Catalog;
use leafpreprocessor::ColorPolicy;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::TempDir;

fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn write_model(dir: &Path, metadata: &str) -> PathBuf {
    let path = dir.join("leaf.fake");
    std::fs::write(&path, FakeModel::leaf_classes().to_json()).unwrap();
    std::fs::write(dir.join("leaf.json"), metadata).unwrap();
    path
}

fn fake_api(dir: &TempDir) -> Api {
    let path = write_model(
        dir.path(),
        r#"{ "model_name": "leaf", "graph_encoding": "onnx" }"#,
    );
    let config = ProviderConfig::default().set(MODEL_PATH_KEY, path.to_string_lossy());
    let provider = InferenceProvider::with_engine(config, Arc::new(FakeEngine::new()));

    Api::new(provider, Catalog::builtin().unwrap())
}

#[test]
fn green_leaf_is_a_healthy_apple() {
    let dir = TempDir::new().unwrap();
    let api = fake_api(&dir);

    let diagnosis = api.diagnose(&png(300, 200, [40, 200, 40])).unwrap();

    assert_eq!(diagnosis.class_index, 3);
    assert_eq!(diagnosis.label, "Healthy Apple");
    assert!(diagnosis.healthy);
    assert!(diagnosis.confidence >= 0.9, "{}", diagnosis.confidence);
    assert_eq!(diagnosis.info, None);
    assert!(!diagnosis.advice.is_empty());
}

#[rstest]
#[case([200, 40, 40], 1, "Apple Black Rot")]
#[case([40, 40, 200], 5, "Potato Late Blight")]
fn diseased_leaf_comes_with_info(
    #[case] rgb: [u8; 3],
    #[case] index: usize,
    #[case] label: &str,
) {
    let dir = TempDir::new().unwrap();
    let api = fake_api(&dir);

    let diagnosis = api.diagnose(&png(64, 64, rgb)).unwrap();

    assert_eq!(diagnosis.class_index, index);
    assert_eq!(diagnosis.label, label);
    assert!(!diagnosis.healthy);
    assert!(diagnosis.info.is_some());
    assert!(diagnosis.advice.is_empty());
}

#[test]
fn corrupt_upload_is_bad_input() {
    let dir = TempDir::new().unwrap();
    let api = fake_api(&dir);

    let err = api.diagnose(b"definitely not a photo").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadInput);
    assert!(!err.is_fatal());
    assert!(err.message().starts_with("The uploaded file is not a readable image"));
}

#[test]
fn strict_color_policy_rejects_rgba() {
    let dir = TempDir::new().unwrap();
    let api = fake_api(&dir).with_color_policy(ColorPolicy::Strict);
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([40, 200, 40, 255])));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();

    let err = api.diagnose(&bytes).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedInput);
}

#[test]
fn missing_model_is_fatal_and_stays_fatal() {
    let dir = TempDir::new().unwrap();
    let config = ProviderConfig::default().set(
        MODEL_PATH_KEY,
        dir.path().join("missing.onnx").to_string_lossy(),
    );
    let api = Api::from_config(config).unwrap();
    let bytes = png(16, 16, [40, 200, 40]);

    let first = api.diagnose(&bytes).unwrap_err();
    let second = api.diagnose(&bytes).unwrap_err();

    assert_eq!(first.kind(), ErrorKind::ModelUnavailable);
    assert!(first.is_fatal());
    assert_eq!(first.exit_code(), 69);
    assert_eq!(first, second);
}

#[test]
fn preprocessed_tensor_round_trips_through_infer_tensor() {
    let dir = TempDir::new().unwrap();
    let api = fake_api(&dir);
    let bytes = png(150, 90, [230, 140, 20]);

    let tensor = api.preprocess(&bytes).unwrap();
    assert_eq!(tensor.shape(), &[1, 128, 128, 3]);

    let raw = tensor.to_le_bytes();
    let diagnosis = api
        .infer_tensor(&api.tensor_from_le_bytes(&raw).unwrap())
        .unwrap();

    assert_eq!(diagnosis, api.diagnose(&bytes).unwrap());
    assert_eq!(diagnosis.label, "Apple Cedar Rust");
}

#[test]
fn truncated_raw_tensor_is_rejected() {
    let dir = TempDir::new().unwrap();
    let api = fake_api(&dir);

    let err = api.tensor_from_le_bytes(&[0u8; 10]).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn unit_pixel_scale_follows_the_model_metadata() {
    let dir = TempDir::new().unwrap();
    let path = write_model(
        dir.path(),
        r#"{ "graph_encoding": "onnx", "pixel_scale": "unit", "tensor_shape_in": [1, 32, 48, 3] }"#,
    );
    let config = ProviderConfig::default().set(MODEL_PATH_KEY, path.to_string_lossy());
    let provider = InferenceProvider::with_engine(config, Arc::new(FakeEngine::new()));
    let api = Api::new(provider, Catalog::builtin().unwrap());

    let tensor = api.preprocess(&png(64, 64, [255, 255, 255])).unwrap();
    assert_eq!(tensor.shape(), &[1, 32, 48, 3]);
    assert!(tensor.data().iter().all(|v| (*v - 1.0).abs() < 1e-3));

    let summary = api.prefetch().unwrap();
    assert_eq!(summary.model_name, None);
    assert_eq!(summary.input_shape, vec![1, 32, 48, 3]);
    assert_eq!(summary.pixel_scale, "unit");
    assert_eq!(summary.output_activation, "softmax");
}

#[test]
fn top_k_ranks_the_closest_classes() {
    let dir = TempDir::new().unwrap();
    let api = fake_api(&dir);

    let ranking = api.top_k(&png(40, 40, [40, 200, 40]), 3).unwrap();

    assert_eq!(ranking.len(), 3);
    assert_eq!(ranking[0].index, 3);
    assert!(ranking.windows(2).all(|w| w[0].probability >= w[1].probability));
}

#[test]
fn invalid_catalog_file_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("catalog.json");
    std::fs::write(&catalog, r#"{ "classes": [] }"#).unwrap();
    let config = ProviderConfig::default().set(CATALOG_PATH_KEY, catalog.to_string_lossy());

    let err = Api::from_config(config).err().unwrap();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.exit_code(), 78);
}

#[test]
fn corrupt_upload_is_reported_before_a_missing_model() {
    let dir = TempDir::new().unwrap();
    let config = ProviderConfig::default().set(
        MODEL_PATH_KEY,
        dir.path().join("missing.onnx").to_string_lossy(),
    );
    let api = Api::from_config(config).unwrap();

    let err = api.diagnose(b"GIF89a not a leaf").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedInput);

    let err = api.diagnose(b"definitely not a photo").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadInput);

    // a readable upload still needs the model
    let err = api.diagnose(&png(16, 16, [40, 200, 40])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
}

#[test]
fn onnx_model_diagnoses_a_green_leaf_end_to_end() {
    let model = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../providers/inference/tests/fixtures/leaf_colors.onnx");
    let config = ProviderConfig::default().set(MODEL_PATH_KEY, model.to_string_lossy());
    let api = Api::from_config(config).unwrap();

    let diagnosis = api.diagnose(&png(320, 240, [40, 200, 40])).unwrap();

    assert_eq!(diagnosis.class_index, 3);
    assert_eq!(diagnosis.label, "Healthy Apple");
    assert!(diagnosis.confidence >= 0.9, "{}", diagnosis.confidence);
}
