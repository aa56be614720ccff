//! Self-check of an engine against the interface rules: template totality,
//! the sentinel match signal, device selection bounds and eye flags.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::interface::{VerifInterface, FAILED_SIMILARITY};
use crate::status::ReturnCode;
use crate::types::{Image, TemplateRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub verdict: Verdict,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &'static str, verdict: Verdict, detail: impl Into<String>) -> Self {
        Self {
            name,
            verdict,
            detail: detail.into(),
        }
    }

    fn expect(name: &'static str, ok: bool, detail: impl Into<String>) -> Self {
        let verdict = if ok { Verdict::Pass } else { Verdict::Fail };
        Self::new(name, verdict, detail)
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.verdict {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Skip => "SKIP",
        };
        write!(f, "[{}] {}: {}", tag, self.name, self.detail)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConformanceReport {
    pub checks: Vec<CheckResult>,
}

impl ConformanceReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.verdict != Verdict::Fail)
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    fn push(&mut self, check: CheckResult) {
        match check.verdict {
            Verdict::Fail => log::warn!("{}", check),
            _ => log::info!("{}", check),
        }
        self.checks.push(check);
    }
}

/// Two small synthetic rasters, one RGB and one grayscale.
pub fn synthetic_samples() -> Vec<Image> {
    let (w, h) = (96u16, 96u16);
    let mut rgb = Vec::with_capacity(usize::from(w) * usize::from(h) * 3);
    for y in 0..h {
        for x in 0..w {
            rgb.extend_from_slice(&[(x * 2) as u8, (y * 2) as u8, ((x + y) % 256) as u8]);
        }
    }
    let gray: Vec<u8> = (0..usize::from(w) * usize::from(h))
        .map(|i| if (i / 8 + i / (8 * usize::from(w))) % 2 == 0 { 30 } else { 220 })
        .collect();
    vec![Image::new(w, h, 24, rgb), Image::new(w, h, 8, gray)]
}

/// Run every check against a fresh engine. `initialize` is called once here.
pub fn run_checks(
    engine: &dyn VerifInterface,
    config_dir: &Path,
    samples: &[Image],
) -> ConformanceReport {
    let mut report = ConformanceReport::default();

    let status = engine.initialize(config_dir);
    let ready = status.is_success();
    report.push(CheckResult::expect(
        "initialize",
        ready,
        format!("initialize({}) -> {}", config_dir.display(), status),
    ));
    if !ready {
        for name in [
            "empty-image",
            "sentinel-match",
            "distinct-images",
            "gpu-bounds",
            "eye-flags",
        ] {
            report.push(CheckResult::new(name, Verdict::Skip, "engine not initialized"));
        }
        return report;
    }

    // Empty image must still produce template bytes.
    let empty_v = engine.create_template(&Image::default(), TemplateRole::Verification);
    let empty_e = engine.create_template(&Image::default(), TemplateRole::Enrollment);
    report.push(CheckResult::expect(
        "empty-image",
        !empty_v.status.is_success() && !empty_v.template.is_empty() && !empty_e.template.is_empty(),
        format!(
            "0x0 image -> {:?}, {} template byte(s)",
            empty_v.status.code,
            empty_v.template.len()
        ),
    ));

    let sentinel = engine.match_templates(&empty_v.template, &empty_e.template);
    report.push(CheckResult::expect(
        "sentinel-match",
        sentinel.status.code == ReturnCode::VerifTemplateError
            && sentinel.similarity == FAILED_SIMILARITY,
        format!(
            "sentinel pair -> {:?}, similarity {}",
            sentinel.status.code, sentinel.similarity
        ),
    ));

    report.push(check_distinct(engine, samples, &empty_e.template));
    report.push(check_gpu(engine));
    report.push(check_eyes(engine, samples));
    report
}

fn check_distinct(engine: &dyn VerifInterface, samples: &[Image], sentinel: &[u8]) -> CheckResult {
    const NAME: &str = "distinct-images";
    let [first, second, ..] = samples else {
        return CheckResult::new(NAME, Verdict::Skip, "needs two sample images");
    };

    let probe = engine.create_template(first, TemplateRole::Verification);
    let reference = engine.create_template(second, TemplateRole::Enrollment);
    let outcome = engine.match_templates(&probe.template, &reference.template);

    if probe.status.is_success() && reference.status.is_success() {
        let against_sentinel = engine.match_templates(&probe.template, sentinel);
        return CheckResult::expect(
            NAME,
            outcome.status.is_success()
                && outcome.similarity.is_finite()
                && outcome.similarity >= 0.0
                && against_sentinel.status.code == ReturnCode::VerifTemplateError
                && against_sentinel.similarity == FAILED_SIMILARITY,
            format!(
                "score {} ({:?}); against sentinel {:?}",
                outcome.similarity, outcome.status.code, against_sentinel.status.code
            ),
        );
    }

    // At least one extraction failed, so the pair must carry the sentinel signal.
    CheckResult::expect(
        NAME,
        outcome.status.code == ReturnCode::VerifTemplateError
            && outcome.similarity == FAILED_SIMILARITY,
        format!(
            "extraction {:?}/{:?}, match {:?} similarity {}",
            probe.status.code, reference.status.code, outcome.status.code, outcome.similarity
        ),
    )
}

fn check_gpu(engine: &dyn VerifInterface) -> CheckResult {
    let out_of_range = engine.set_gpu(u8::MAX);
    let first = engine.set_gpu(0);
    CheckResult::expect(
        "gpu-bounds",
        out_of_range.code == ReturnCode::GPUError && first.is_success(),
        format!(
            "set_gpu(255) -> {:?}, set_gpu(0) -> {:?}",
            out_of_range.code, first.code
        ),
    )
}

fn check_eyes(engine: &dyn VerifInterface, samples: &[Image]) -> CheckResult {
    let mut assigned = 0usize;
    for (idx, sample) in samples.iter().enumerate() {
        let eyes = engine.create_template(sample, TemplateRole::Verification).eyes;
        for (side, eye) in [("left", eyes.left()), ("right", eyes.right())] {
            if let Some((x, y)) = eye {
                assigned += 1;
                if x >= sample.width || y >= sample.height {
                    return CheckResult::new(
                        "eye-flags",
                        Verdict::Fail,
                        format!("sample {} {} eye ({}, {}) outside the image", idx, side, x, y),
                    );
                }
            }
        }
    }
    CheckResult::new(
        "eye-flags",
        Verdict::Pass,
        format!("{} assigned eye coordinate(s) within bounds", assigned),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null_impl::NullImpl;
    use tempfile::TempDir;

    #[test]
    fn null_engine_passes_every_check() {
        let tmp = TempDir::new().unwrap();
        let engine = NullImpl::new();
        let report = run_checks(&engine, tmp.path(), &synthetic_samples());
        assert!(report.passed(), "{:#?}", report);
        assert_eq!(report.checks.len(), 6);
        assert_eq!(report.get("distinct-images").unwrap().verdict, Verdict::Pass);
    }

    #[test]
    fn failed_initialize_skips_the_rest() {
        let tmp = TempDir::new().unwrap();
        let engine = NullImpl::new();
        let report = run_checks(&engine, &tmp.path().join("missing"), &[]);
        assert!(!report.passed());
        assert_eq!(report.get("initialize").unwrap().verdict, Verdict::Fail);
        assert_eq!(report.get("gpu-bounds").unwrap().verdict, Verdict::Skip);
    }

    #[test]
    fn synthetic_samples_are_well_formed() {
        for sample in synthetic_samples() {
            assert!(sample.validate().is_ok());
        }
    }
}
