mod common;

use common::{engine, flat, gradient, FakeLoader};
use frpc::config::CONFIG_FILE_NAME;
use frpc::template::{TemplateBody, TemplateRecord};
use frpc::{Image, NullImpl, ReturnCode, TemplateRole, VerifInterface, FAILED_SIMILARITY};
use tempfile::TempDir;

fn config_dir(contents: Option<&str>) -> TempDir {
    let tmp = TempDir::new().unwrap();
    if let Some(contents) = contents {
        std::fs::write(tmp.path().join(*CONFIG_FILE_NAME), contents).unwrap();
    }
    tmp
}

#[test]
fn initialize_binds_device_zero() {
    let loader = FakeLoader::with_score(0.9);
    let tmp = config_dir(None);
    let engine = engine(&loader);
    assert!(engine.initialize(tmp.path()).is_success());
    assert_eq!(loader.loaded_devices(), vec![0]);
    assert_eq!(engine.device_count(), 1);
}

#[test]
fn invalid_settings_are_config_errors() {
    let tmp = config_dir(Some("nms_threshold = 3.0"));
    let engine = engine(&FakeLoader::with_score(0.9));
    let status = engine.initialize(tmp.path());
    assert_eq!(status.code, ReturnCode::ConfigError);
    assert!(status.info.contains("nms_threshold"));
}

#[test]
fn second_initialize_keeps_first_state() {
    let loader = FakeLoader::with_score(0.9);
    let tmp = config_dir(None);
    let engine = engine(&loader);
    assert!(engine.initialize(tmp.path()).is_success());
    assert_eq!(engine.initialize(tmp.path()).code, ReturnCode::VendorError);
    assert_eq!(loader.loaded_devices(), vec![0]);
}

#[test]
fn calls_before_initialize_still_yield_templates() {
    let engine = engine(&FakeLoader::with_score(0.9));
    let outcome = engine.create_template(&gradient(64, 64), TemplateRole::Enrollment);
    assert_eq!(outcome.status.code, ReturnCode::VendorError);
    assert!(!outcome.template.is_empty());

    let matched = engine.match_templates(&outcome.template, &outcome.template);
    assert_eq!(matched.status.code, ReturnCode::VendorError);
}

#[test]
fn role_selects_quality_gate() {
    // 0.7 clears the verification gate (0.6) but not enrollment (0.8)
    let tmp = config_dir(None);
    let engine = engine(&FakeLoader::with_score(0.7));
    assert!(engine.initialize(tmp.path()).is_success());

    let probe = engine.create_template(&gradient(64, 64), TemplateRole::Verification);
    assert!(probe.status.is_success(), "{}", probe.status);

    let reference = engine.create_template(&gradient(64, 64), TemplateRole::Enrollment);
    assert_eq!(reference.status.code, ReturnCode::TemplateCreationError);
    assert!(!reference.template.is_empty());

    let outcome = engine.match_templates(&probe.template, &reference.template);
    assert_eq!(outcome.status.code, ReturnCode::VerifTemplateError);
    assert_eq!(outcome.similarity, FAILED_SIMILARITY);
}

#[test]
fn eye_positions_follow_the_subject() {
    let tmp = config_dir(None);
    let engine = engine(&FakeLoader::with_score(0.9));
    assert!(engine.initialize(tmp.path()).is_success());

    let outcome = engine.create_template(&gradient(100, 50), TemplateRole::Verification);
    assert!(outcome.status.is_success());
    // subject's left eye sits on the image right
    assert_eq!(outcome.eyes.left(), Some((70, 20)));
    assert_eq!(outcome.eyes.right(), Some((30, 20)));
}

#[test]
fn identical_images_score_highest() {
    let tmp = config_dir(None);
    let engine = engine(&FakeLoader::with_score(0.9));
    assert!(engine.initialize(tmp.path()).is_success());

    let probe = engine.create_template(&gradient(64, 64), TemplateRole::Verification);
    let same = engine.create_template(&gradient(64, 64), TemplateRole::Enrollment);
    let other = engine.create_template(&flat(64, 64, 200), TemplateRole::Enrollment);
    assert_eq!(probe.template.len(), same.template.len());

    let high = engine.match_templates(&probe.template, &same.template);
    let low = engine.match_templates(&probe.template, &other.template);
    assert!(high.status.is_success());
    assert!(low.status.is_success());
    assert!(high.similarity > 0.999, "{}", high.similarity);
    assert!(low.similarity >= 0.0 && low.similarity < high.similarity);
}

#[test]
fn templates_are_deterministic() {
    let tmp = config_dir(None);
    let engine = engine(&FakeLoader::with_score(0.9));
    assert!(engine.initialize(tmp.path()).is_success());
    let a = engine.create_template(&gradient(48, 48), TemplateRole::Enrollment);
    let b = engine.create_template(&gradient(48, 48), TemplateRole::Enrollment);
    assert_eq!(a.template, b.template);
    assert_eq!(a.eyes, b.eyes);
}

#[test]
fn extraction_failures_are_classified() {
    let tmp = config_dir(None);
    let engine = engine(&FakeLoader::with_score(0.9));
    assert!(engine.initialize(tmp.path()).is_success());

    let no_face = engine.create_template(&flat(64, 64, 0), TemplateRole::Verification);
    assert_eq!(no_face.status.code, ReturnCode::ExtractError);
    assert_eq!(no_face.eyes.left(), None);

    let small = engine.create_template(&gradient(16, 64), TemplateRole::Verification);
    assert_eq!(small.status.code, ReturnCode::RefuseInput);

    let malformed = engine.create_template(&Image::new(8, 8, 16, vec![0u8; 128]), TemplateRole::Verification);
    assert_eq!(malformed.status.code, ReturnCode::ParseError);

    for failed in [&no_face, &small, &malformed] {
        assert!(!failed.template.is_empty());
        let record = TemplateRecord::decode(&failed.template, "verification").unwrap();
        assert!(record.is_failed());
    }
}

#[test]
fn grayscale_images_are_accepted() {
    let tmp = config_dir(None);
    let engine = engine(&FakeLoader::with_score(0.9));
    assert!(engine.initialize(tmp.path()).is_success());
    let gray = Image::new(40, 40, 8, (0..1600u32).map(|i| (i % 200) as u8 + 1).collect::<Vec<_>>());
    let outcome = engine.create_template(&gray, TemplateRole::Enrollment);
    assert!(outcome.status.is_success(), "{}", outcome.status);
}

#[test]
fn foreign_templates_are_format_errors() {
    let tmp = config_dir(None);
    let engine = engine(&FakeLoader::with_score(0.9));
    assert!(engine.initialize(tmp.path()).is_success());
    let ours = engine.create_template(&gradient(64, 64), TemplateRole::Enrollment);

    let null = NullImpl::new();
    assert!(null.initialize(tmp.path()).is_success());
    let theirs = null.create_template(&gradient(64, 64), TemplateRole::Verification);

    let outcome = engine.match_templates(&theirs.template, &ours.template);
    assert_eq!(outcome.status.code, ReturnCode::TemplateFormatError);
    assert_eq!(outcome.similarity, 0.0);

    let short = TemplateRecord::new(
        TemplateRole::Verification,
        TemplateBody::Features(vec![1.0, 0.0, 0.0]),
    )
    .encode();
    let outcome = engine.match_templates(&short, &ours.template);
    assert_eq!(outcome.status.code, ReturnCode::TemplateFormatError);
}

#[test]
fn set_gpu_rebinds_within_configured_range() {
    let loader = FakeLoader::with_score(0.9);
    let tmp = config_dir(Some("gpu_devices = 2\n"));
    let engine = engine(&loader);
    assert!(engine.initialize(tmp.path()).is_success());
    assert_eq!(engine.device_count(), 2);

    assert!(engine.set_gpu(1).is_success());
    assert_eq!(engine.selected_gpu(), 1);
    // already bound, no reload
    assert!(engine.set_gpu(1).is_success());
    assert_eq!(loader.loaded_devices(), vec![0, 1]);

    assert_eq!(engine.set_gpu(2).code, ReturnCode::GPUError);
    assert_eq!(engine.set_gpu(255).code, ReturnCode::GPUError);
    assert_eq!(engine.selected_gpu(), 1);

    let outcome = engine.create_template(&gradient(64, 64), TemplateRole::Verification);
    assert!(outcome.status.is_success());
}

#[test]
fn failed_bind_keeps_previous_device() {
    let loader = FakeLoader {
        fail_on: Some(1),
        ..FakeLoader::with_score(0.9)
    };
    let tmp = config_dir(Some("gpu_devices = 2\n"));
    let engine = engine(&loader);
    assert!(engine.initialize(tmp.path()).is_success());

    let status = engine.set_gpu(1);
    assert_eq!(status.code, ReturnCode::GPUError);
    assert_eq!(engine.selected_gpu(), 0);

    let outcome = engine.create_template(&gradient(64, 64), TemplateRole::Verification);
    assert!(outcome.status.is_success());
}

#[test]
fn gpu_selected_before_initialize_is_used() {
    let loader = FakeLoader::with_score(0.9);
    let tmp = config_dir(None);
    let engine = engine(&loader);
    assert!(engine.set_gpu(0).is_success());
    assert_eq!(engine.set_gpu(1).code, ReturnCode::GPUError);
    assert!(engine.initialize(tmp.path()).is_success());
    assert_eq!(loader.loaded_devices(), vec![0]);
}

#[test]
fn concurrent_template_creation() {
    let tmp = config_dir(None);
    let engine = engine(&FakeLoader::with_score(0.9));
    assert!(engine.initialize(tmp.path()).is_success());
    let reference = engine
        .create_template(&gradient(64, 64), TemplateRole::Enrollment)
        .template;

    std::thread::scope(|scope| {
        for i in 0..6u16 {
            let engine = &engine;
            let reference = &reference;
            scope.spawn(move || {
                let probe = engine.create_template(&gradient(64 + i, 64), TemplateRole::Verification);
                assert!(probe.status.is_success());
                let outcome = engine.match_templates(&probe.template, reference);
                assert!(outcome.status.is_success());
                assert!(outcome.similarity > 0.5);
            });
        }
    });
}
