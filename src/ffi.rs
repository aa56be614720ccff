//! C entry points exported by the cdylib.
//!
//! Every function returns the integer value of a [`ReturnCode`]. Panics are
//! caught here and reported as `VendorError`.

use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::{ptr, slice};

use once_cell::sync::Lazy;

use crate::interface::VerifInterface;
use crate::status::{ReturnCode, ReturnStatus};
use crate::template;
use crate::types::{EyePair, Image, TemplateRole};

pub const FRPC_ROLE_ENROLLMENT: c_int = 0;
pub const FRPC_ROLE_VERIFICATION: c_int = 1;

/// Opaque handle owning a reference to the bound engine.
pub struct FrpcHandle {
    engine: Arc<dyn VerifInterface>,
}

#[repr(C)]
pub struct FrpcImage {
    pub width: u16,
    pub height: u16,
    pub depth: u8,
    pub data: *const u8,
    pub len: usize,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrpcEyePair {
    pub is_left_assigned: bool,
    pub is_right_assigned: bool,
    pub xleft: u16,
    pub yleft: u16,
    pub xright: u16,
    pub yright: u16,
}

impl From<EyePair> for FrpcEyePair {
    fn from(eyes: EyePair) -> Self {
        Self {
            is_left_assigned: eyes.is_left_assigned,
            is_right_assigned: eyes.is_right_assigned,
            xleft: eyes.xleft,
            yleft: eyes.yleft,
            xright: eyes.xright,
            yright: eyes.yright,
        }
    }
}

/// Template bytes owned by the library; release with [`frpc_template_free`].
#[repr(C)]
#[derive(Debug)]
pub struct FrpcTemplate {
    pub data: *mut u8,
    pub len: usize,
}

impl FrpcTemplate {
    fn from_vec(bytes: Vec<u8>) -> Self {
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        Self {
            data: Box::into_raw(boxed) as *mut u8,
            len,
        }
    }
}

static MESSAGES: Lazy<Vec<CString>> = Lazy::new(|| {
    ReturnCode::ALL
        .iter()
        .map(|code| CString::new(code.message()).unwrap_or_default())
        .collect()
});

static UNDEFINED: Lazy<CString> = Lazy::new(|| CString::new("Undefined error").unwrap_or_default());

fn guarded<F: FnOnce() -> ReturnCode>(f: F) -> c_int {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(code) => code as c_int,
        Err(_) => {
            log::error!("panic caught at the C boundary");
            ReturnCode::VendorError as c_int
        }
    }
}

fn report(call: &str, status: ReturnStatus) -> ReturnCode {
    if !status.is_success() {
        log::debug!("{}: {}", call, status);
    }
    status.code
}

unsafe fn bytes<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(data, len)
    }
}

fn role_from_c(role: c_int) -> Option<TemplateRole> {
    match role {
        FRPC_ROLE_ENROLLMENT => Some(TemplateRole::Enrollment),
        FRPC_ROLE_VERIFICATION => Some(TemplateRole::Verification),
        _ => None,
    }
}

/// Handle to the process-wide engine. Release with [`frpc_release`].
#[no_mangle]
pub extern "C" fn frpc_get_implementation() -> *mut FrpcHandle {
    Box::into_raw(Box::new(FrpcHandle {
        engine: crate::get_implementation(),
    }))
}

/// # Safety
/// `handle` must come from [`frpc_get_implementation`] and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn frpc_release(handle: *mut FrpcHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// # Safety
/// `handle` must be live; `config_dir` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn frpc_initialize(
    handle: *const FrpcHandle,
    config_dir: *const c_char,
) -> c_int {
    guarded(|| {
        let Some(h) = handle.as_ref() else {
            return ReturnCode::VendorError;
        };
        if config_dir.is_null() {
            return ReturnCode::ConfigError;
        }
        let dir = std::ffi::CStr::from_ptr(config_dir)
            .to_string_lossy()
            .into_owned();
        report("initialize", h.engine.initialize(Path::new(&dir)))
    })
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn frpc_set_gpu(handle: *const FrpcHandle, gpu_num: u8) -> c_int {
    guarded(|| match handle.as_ref() {
        Some(h) => report("set_gpu", h.engine.set_gpu(gpu_num)),
        None => ReturnCode::VendorError,
    })
}

/// Pixels are copied before the engine sees them. On return `out_template`
/// always holds bytes, including for failures.
///
/// # Safety
/// `handle` must be live, `image` null or valid with `data` readable for
/// `len` bytes, and both out pointers writable.
#[no_mangle]
pub unsafe extern "C" fn frpc_create_template(
    handle: *const FrpcHandle,
    image: *const FrpcImage,
    role: c_int,
    out_template: *mut FrpcTemplate,
    out_eyes: *mut FrpcEyePair,
) -> c_int {
    guarded(|| {
        let (Some(h), false) = (handle.as_ref(), out_template.is_null()) else {
            return ReturnCode::VendorError;
        };

        let outcome = match role_from_c(role) {
            Some(role) => {
                let face = match image.as_ref() {
                    Some(img) => Image::new(img.width, img.height, img.depth, bytes(img.data, img.len)),
                    None => Image::default(),
                };
                h.engine.create_template(&face, role)
            }
            None => crate::interface::TemplateOutcome {
                status: ReturnStatus::new(ReturnCode::ParseError, format!("unknown role {}", role)),
                template: template::failed_template(TemplateRole::Enrollment, ReturnCode::ParseError),
                eyes: EyePair::default(),
            },
        };

        ptr::write(out_template, FrpcTemplate::from_vec(outcome.template));
        if !out_eyes.is_null() {
            ptr::write(out_eyes, outcome.eyes.into());
        }
        report("create_template", outcome.status)
    })
}

/// # Safety
/// `templ` must have been filled by [`frpc_create_template`] and not freed.
#[no_mangle]
pub unsafe extern "C" fn frpc_template_free(templ: FrpcTemplate) {
    if !templ.data.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
            templ.data, templ.len,
        )));
    }
}

/// # Safety
/// `handle` must be live, template pointers readable for their lengths and
/// `out_similarity` writable.
#[no_mangle]
pub unsafe extern "C" fn frpc_match_templates(
    handle: *const FrpcHandle,
    verif: *const u8,
    verif_len: usize,
    enroll: *const u8,
    enroll_len: usize,
    out_similarity: *mut f64,
) -> c_int {
    guarded(|| {
        let (Some(h), false) = (handle.as_ref(), out_similarity.is_null()) else {
            return ReturnCode::VendorError;
        };
        let outcome = h
            .engine
            .match_templates(bytes(verif, verif_len), bytes(enroll, enroll_len));
        ptr::write(out_similarity, outcome.similarity);
        report("match_templates", outcome.status)
    })
}

/// Static, NUL-terminated description of `code`.
#[no_mangle]
pub extern "C" fn frpc_return_code_message(code: u32) -> *const c_char {
    match ReturnCode::from_u32(code) {
        Some(rc) => MESSAGES[rc as usize].as_ptr(),
        None => UNDEFINED.as_ptr(),
    }
}
