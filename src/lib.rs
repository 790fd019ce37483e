//! msrlib — populates the MSR score model from MusicXML.
//!
//! A MusicXML document is first turned into an MXSR element tree, then
//! walked twice: the skeleton pass creates the parts, staves, voices and the
//! known events; the population pass fills them with notes, chords,
//! tuplets, grace notes, decorations, harmonies, barlines and repeats.
//!
//! Supports both uncompressed MusicXML (.musicxml) and compressed MXL (.mxl) files.
//!
//! # Example
//! ```no_run
//! use msrlib::{populate_file, PopulateOptions};
//!
//! let conversion = populate_file("path/to/score.musicxml", &PopulateOptions::default()).unwrap();
//! println!("Title: {:?}", conversion.score.title);
//! println!("Parts: {}", conversion.score.parts.len());
//! println!("Measures: {}", conversion.score.measure_count());
//! for warning in &conversion.diagnostics {
//!     println!("{warning}");
//! }
//! ```

pub mod error;
pub mod events;
pub mod msr;
pub mod mxl;
pub mod mxsr;
pub mod options;
pub mod populator;
pub mod skeleton;
pub mod wholes;

#[cfg(target_os = "android")]
pub mod android;

use std::path::Path;

use serde::Serialize;

pub use error::{Diagnostic, DiagnosticCategory, PopulateError};
pub use msr::*;
pub use mxsr::{parse_mxsr, MxsrElement};
pub use options::PopulateOptions;

/// A populated score and the warnings met while populating it.
#[derive(Debug, Serialize)]
pub struct Conversion {
    pub score: Score,
    pub diagnostics: Vec<Diagnostic>,
}

/// Populate a MusicXML file from a file path.
/// Automatically detects format based on file extension:
/// - `.musicxml` or `.xml` → uncompressed MusicXML
/// - `.mxl` → compressed MXL (ZIP archive)
pub fn populate_file<P: AsRef<Path>>(path: P, options: &PopulateOptions) -> Result<Conversion, PopulateError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| PopulateError::Io {
        path: path.display().to_string(),
        source,
    })?;

    populate_bytes(&data, path.extension().and_then(|e| e.to_str()), options)
}

/// Populate from raw bytes with an optional format hint.
/// If `extension` is None, tries to auto-detect the format.
pub fn populate_bytes(
    data: &[u8],
    extension: Option<&str>,
    options: &PopulateOptions,
) -> Result<Conversion, PopulateError> {
    match extension {
        Some("mxl") => populate_musicxml(&mxl::extract_musicxml_from_mxl(data)?, options),
        Some("musicxml") | Some("xml") => {
            let xml = std::str::from_utf8(data)
                .map_err(|e| PopulateError::Xml(format!("invalid UTF-8 in MusicXML file: {e}")))?;
            populate_musicxml(xml, options)
        }
        _ => {
            // Auto-detect: try as XML first, then as MXL
            if let Ok(xml) = std::str::from_utf8(data) {
                if xml.trim_start().starts_with('<') {
                    return populate_musicxml(xml, options);
                }
            }
            populate_musicxml(&mxl::extract_musicxml_from_mxl(data)?, options)
        }
    }
}

/// Populate from a MusicXML string.
pub fn populate_musicxml(xml: &str, options: &PopulateOptions) -> Result<Conversion, PopulateError> {
    let root = parse_mxsr(xml)?;
    populate_mxsr(&root, options)
}

/// Run both passes over an already built MXSR tree, then apply the parts filter.
pub fn populate_mxsr(root: &MxsrElement, options: &PopulateOptions) -> Result<Conversion, PopulateError> {
    let skeleton = skeleton::build_skeleton(root)?;
    let (mut score, diagnostics) = populator::populate(skeleton, root, options)?;

    if !options.parts.is_empty() {
        let before = score.parts.len();
        score.parts.retain(|p| options.parts.keeps(&p.id, &p.name));
        log::debug!("parts filter kept {} of {before} part(s)", score.parts.len());
    }

    Ok(Conversion {
        score,
        diagnostics: diagnostics.into_vec(),
    })
}

/// Convert a populated score to a JSON string.
/// Useful for passing data across FFI boundaries.
pub fn score_to_json(score: &Score) -> Result<String, PopulateError> {
    Ok(serde_json::to_string_pretty(score)?)
}

// ═══════════════════════════════════════════════════════════════════════
// C FFI — for iOS (static library) and other native hosts
// ═══════════════════════════════════════════════════════════════════════

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Populate a MusicXML file and return the conversion (score and
/// diagnostics) as a JSON C string.
/// The caller must free the returned string with `msrlib_free_string`.
///
/// `options_json` is a JSON `PopulateOptions` object; pass null for the defaults.
/// Returns null on any error.
///
/// # Safety
/// `path` must be a valid null-terminated UTF-8 C string. `options_json`
/// must be null or a valid null-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn msrlib_populate_file_to_json(
    path: *const c_char,
    options_json: *const c_char,
) -> *mut c_char {
    if path.is_null() {
        return std::ptr::null_mut();
    }
    let path_str = match unsafe { CStr::from_ptr(path) }.to_str() {
        Ok(s) => s,
        Err(_) => return std::ptr::null_mut(),
    };

    let options = if options_json.is_null() {
        PopulateOptions::default()
    } else {
        let parsed = unsafe { CStr::from_ptr(options_json) }
            .to_str()
            .ok()
            .map(PopulateOptions::from_json);
        match parsed {
            Some(Ok(options)) => options,
            _ => return std::ptr::null_mut(),
        }
    };

    let json = populate_file(path_str, &options)
        .and_then(|conversion| Ok(serde_json::to_string_pretty(&conversion)?));
    match json {
        Ok(json) => into_c_string(json),
        Err(e) => {
            log::error!("{e}");
            std::ptr::null_mut()
        }
    }
}

/// Hand `json` over to C; null when it holds an interior NUL.
fn into_c_string(json: String) -> *mut c_char {
    match CString::new(json) {
        Ok(c) => c.into_raw(),
        Err(e) => {
            log::error!("conversion JSON holds a NUL byte at {}", e.nul_position());
            std::ptr::null_mut()
        }
    }
}

/// Free a string previously returned by msrlib functions.
///
/// # Safety
/// `ptr` must be a string previously returned by an msrlib function, or null.
#[no_mangle]
pub unsafe extern "C" fn msrlib_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}
