//! JNI bindings for Android.
//!
//! These functions are called from Kotlin via the JNI bridge. Each returns
//! the conversion (score and diagnostics) as JSON, or null on failure.

use jni::objects::{JByteArray, JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;

use crate::{populate_bytes, populate_file, Conversion, PopulateError, PopulateOptions};

/// Options from a nullable Java string; null means the defaults.
fn options_from(env: &mut JNIEnv, options_json: &JString) -> Option<PopulateOptions> {
    if options_json.is_null() {
        return Some(PopulateOptions::default());
    }
    let json: String = env.get_string(options_json).ok()?.into();
    PopulateOptions::from_json(&json).ok()
}

fn to_java(env: &mut JNIEnv, conversion: Result<Conversion, PopulateError>) -> jstring {
    let json = conversion.and_then(|c| Ok(serde_json::to_string(&c)?));
    match json {
        Ok(json) => match env.new_string(&json) {
            Ok(js) => js.into_raw(),
            Err(_) => std::ptr::null_mut(),
        },
        Err(e) => {
            log::error!("{e}");
            std::ptr::null_mut()
        }
    }
}

/// Populate a MusicXML file at the given path.
///
/// Called from Kotlin as:
///   external fun populateFile(path: String, optionsJson: String?): String?
#[no_mangle]
pub extern "system" fn Java_org_msrlib_MsrLib_populateFile(
    mut env: JNIEnv,
    _class: JClass,
    path: JString,
    options_json: JString,
) -> jstring {
    let path_str: String = match env.get_string(&path) {
        Ok(s) => s.into(),
        Err(_) => return std::ptr::null_mut(),
    };
    let Some(options) = options_from(&mut env, &options_json) else {
        return std::ptr::null_mut();
    };

    let conversion = populate_file(&path_str, &options);
    to_java(&mut env, conversion)
}

/// Populate MusicXML or MXL bytes.
///
/// Called from Kotlin as:
///   external fun populateBytes(data: ByteArray, extension: String?, optionsJson: String?): String?
#[no_mangle]
pub extern "system" fn Java_org_msrlib_MsrLib_populateBytes(
    mut env: JNIEnv,
    _class: JClass,
    data: JByteArray,
    extension: JString,
    options_json: JString,
) -> jstring {
    let bytes = match env.convert_byte_array(&data) {
        Ok(b) => b,
        Err(_) => return std::ptr::null_mut(),
    };

    let ext: Option<String> = if extension.is_null() {
        None
    } else {
        env.get_string(&extension).ok().map(|s| s.into())
    };
    let Some(options) = options_from(&mut env, &options_json) else {
        return std::ptr::null_mut();
    };

    let conversion = populate_bytes(&bytes, ext.as_deref(), &options);
    to_java(&mut env, conversion)
}
