//! Private template envelope shared by the engines in this crate.
//!
//! The harness treats template bytes as opaque. Internally a template is a
//! postcard-encoded [`TemplateRecord`]; extraction failures are encoded as a
//! [`TemplateBody::Failed`] body so that every byte sequence handed out is
//! still accepted by `match_templates`.

use serde::{Deserialize, Serialize};

use crate::status::{EngineError, EngineResult, ReturnCode};
use crate::types::TemplateRole;

pub const TEMPLATE_MAGIC: [u8; 4] = *b"FRPT";
pub const TEMPLATE_VERSION: u8 = 1;

/// Encoded `{FRPT, v1, Enrollment, Failed { VendorError }}`, used if
/// serialisation itself ever fails.
pub const FALLBACK_SENTINEL: [u8; 8] = [b'F', b'R', b'P', b'T', TEMPLATE_VERSION, 0, 0, 12];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateBody {
    /// Extraction failed with this code.
    Failed { code: ReturnCode },
    /// L2-normalised face embedding.
    Features(Vec<f32>),
    /// Engine-specific payload.
    Opaque(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    magic: [u8; 4],
    version: u8,
    pub role: TemplateRole,
    pub body: TemplateBody,
}

impl TemplateRecord {
    pub fn new(role: TemplateRole, body: TemplateBody) -> Self {
        Self {
            magic: TEMPLATE_MAGIC,
            version: TEMPLATE_VERSION,
            role,
            body,
        }
    }

    pub fn failed(role: TemplateRole, code: ReturnCode) -> Self {
        Self::new(role, TemplateBody::Failed { code })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.body, TemplateBody::Failed { .. })
    }

    /// Serialise; never fails from the caller's point of view.
    pub fn encode(&self) -> Vec<u8> {
        match postcard::to_allocvec(self) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("template serialisation failed, emitting sentinel: {}", err);
                FALLBACK_SENTINEL.to_vec()
            }
        }
    }

    /// Parse bytes produced by [`TemplateRecord::encode`]. `which` names the
    /// argument in error messages.
    pub fn decode(bytes: &[u8], which: &'static str) -> EngineResult<Self> {
        let format_error = |message: String| EngineError::TemplateFormat { which, message };

        if bytes.is_empty() {
            return Err(format_error("empty template".to_string()));
        }
        let (record, rest): (TemplateRecord, &[u8]) =
            postcard::take_from_bytes(bytes).map_err(|e| format_error(e.to_string()))?;
        if record.magic != TEMPLATE_MAGIC {
            return Err(format_error("bad magic".to_string()));
        }
        if record.version != TEMPLATE_VERSION {
            return Err(format_error(format!(
                "unsupported template version {}",
                record.version
            )));
        }
        if !rest.is_empty() {
            return Err(format_error(format!("{} trailing byte(s)", rest.len())));
        }
        Ok(record)
    }
}

/// Sentinel bytes for a failed extraction.
pub fn failed_template(role: TemplateRole, code: ReturnCode) -> Vec<u8> {
    TemplateRecord::failed(role, code).encode()
}

/// Decoded pair of match inputs.
#[derive(Debug)]
pub struct MatchInputs {
    pub verification: TemplateRecord,
    pub enrollment: TemplateRecord,
}

/// Decode both match inputs, verification first. A failed sentinel on either
/// side wins over a format problem on the other, so the harness always sees
/// `VerifTemplateError` for pairs involving a failed extraction.
pub fn decode_pair(verif: &[u8], enroll: &[u8]) -> EngineResult<MatchInputs> {
    let verification = TemplateRecord::decode(verif, "verification");
    let enrollment = TemplateRecord::decode(enroll, "enrollment");

    let failed = |r: &EngineResult<TemplateRecord>| matches!(r, Ok(rec) if rec.is_failed());
    if failed(&verification) {
        return Err(EngineError::FailedTemplate("verification"));
    }
    if failed(&enrollment) {
        return Err(EngineError::FailedTemplate("enrollment"));
    }

    let verification = verification?;
    let enrollment = enrollment?;
    if verification.role != TemplateRole::Verification || enrollment.role != TemplateRole::Enrollment
    {
        log::debug!(
            "match inputs tagged {} / {}, expected verification / enrollment",
            verification.role,
            enrollment.role
        );
    }
    Ok(MatchInputs {
        verification,
        enrollment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_sentinel_decodes_as_failed() {
        let record = TemplateRecord::decode(&FALLBACK_SENTINEL, "verification").unwrap();
        assert_eq!(record.role, TemplateRole::Enrollment);
        assert_eq!(
            record.body,
            TemplateBody::Failed {
                code: ReturnCode::VendorError
            }
        );
    }

    #[test]
    fn fallback_sentinel_matches_encoder_output() {
        let encoded = failed_template(TemplateRole::Enrollment, ReturnCode::VendorError);
        assert_eq!(encoded, FALLBACK_SENTINEL.to_vec());
    }

    #[test]
    fn features_survive_encoding() {
        let record = TemplateRecord::new(
            TemplateRole::Verification,
            TemplateBody::Features(vec![0.6, 0.8]),
        );
        let decoded = TemplateRecord::decode(&record.encode(), "verification").unwrap();
        assert_eq!(decoded, record);
        assert!(!decoded.is_failed());
    }

    #[test]
    fn garbage_is_a_format_error() {
        for bytes in [&b""[..], &b"Let the Force be with you"[..], &[0xff; 3][..]] {
            let err = TemplateRecord::decode(bytes, "enrollment").unwrap_err();
            assert_eq!(err.code(), ReturnCode::TemplateFormatError);
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = TemplateRecord::new(TemplateRole::Enrollment, TemplateBody::Opaque(vec![1]))
            .encode();
        bytes.push(0);
        assert!(TemplateRecord::decode(&bytes, "enrollment").is_err());
    }

    #[test]
    fn sentinel_wins_over_format_error() {
        let failed = failed_template(TemplateRole::Enrollment, ReturnCode::ParseError);
        let err = decode_pair(b"junk", &failed).unwrap_err();
        assert_eq!(err.code(), ReturnCode::VerifTemplateError);

        let failed = failed_template(TemplateRole::Verification, ReturnCode::ExtractError);
        let err = decode_pair(&failed, b"").unwrap_err();
        assert_eq!(err.code(), ReturnCode::VerifTemplateError);
    }
}
