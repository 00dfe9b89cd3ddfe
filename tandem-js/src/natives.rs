//! Host functions backing the prelude (`__native`)

use boa_engine::{
    object::ObjectInitializer, property::PropertyKey, Context, JsNativeError, JsResult,
    JsString, JsValue, NativeFunction,
};
use serde_json::json;
use std::io::Write;
use std::time::{Duration, UNIX_EPOCH};

fn string_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<String> {
    Ok(args
        .get(index)
        .cloned()
        .unwrap_or_default()
        .to_string(context)?
        .to_std_string_escaped())
}

/// Node-style message for a failed filesystem call
fn fs_error(err: std::io::Error, syscall: &str, path: &str) -> boa_engine::JsError {
    let description = match err.kind() {
        std::io::ErrorKind::NotFound => "ENOENT: no such file or directory".to_string(),
        std::io::ErrorKind::PermissionDenied => "EACCES: permission denied".to_string(),
        std::io::ErrorKind::AlreadyExists => "EEXIST: file already exists".to_string(),
        _ => err.to_string(),
    };

    JsNativeError::error()
        .with_message(format!("{}, {} '{}'", description, syscall, path))
        .into()
}

fn write(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let stream = string_arg(args, 0, context)?;
    let text = string_arg(args, 1, context)?;

    // A closed stream must not take the worker down
    let _ = if stream == "stderr" {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(text.as_bytes()).and_then(|_| stderr.flush())
    } else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush())
    };

    Ok(JsValue::undefined())
}

fn sleep(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let millis = args
        .get(0)
        .cloned()
        .unwrap_or_default()
        .to_number(context)?;

    if millis.is_finite() && millis > 0.0 {
        std::thread::sleep(Duration::from_secs_f64(millis / 1000.0));
    }
    Ok(JsValue::undefined())
}

fn read_file(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, context)?;
    let content = std::fs::read(&path).map_err(|e| fs_error(e, "open", &path))?;
    let text = String::from_utf8_lossy(&content);

    Ok(JsValue::from(JsString::from(text.as_ref())))
}

fn write_file(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, context)?;
    let data = string_arg(args, 1, context)?;
    std::fs::write(&path, data).map_err(|e| fs_error(e, "open", &path))?;

    Ok(JsValue::undefined())
}

fn exists(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, context)?;
    Ok(JsValue::from(std::path::Path::new(&path).exists()))
}

/// Returns the stat record as JSON text, parsed by the prelude
fn stat(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, context)?;
    let metadata = std::fs::metadata(&path).map_err(|e| fs_error(e, "stat", &path))?;

    let kind = if metadata.is_dir() {
        "directory"
    } else if metadata.is_file() {
        "file"
    } else {
        "other"
    };
    let modified_ms = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|since| since.as_secs_f64() * 1000.0)
        .unwrap_or_default();

    #[cfg(unix)]
    let mode = std::os::unix::fs::PermissionsExt::mode(&metadata.permissions());
    #[cfg(not(unix))]
    let mode = if metadata.permissions().readonly() { 0o444 } else { 0o666 };

    let record = json!({
        "kind": kind,
        "size": metadata.len(),
        "mode": mode,
        "mtimeMs": modified_ms,
    });
    Ok(JsValue::from(JsString::from(record.to_string().as_str())))
}

/// Returns the sorted entry names as JSON text, parsed by the prelude
fn read_dir(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, context)?;
    let entries = std::fs::read_dir(&path).map_err(|e| fs_error(e, "scandir", &path))?;

    let mut names = entries
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();

    Ok(JsValue::from(JsString::from(json!(names).to_string().as_str())))
}

/// Install the `__native` global used by the prelude
pub(crate) fn register(context: &mut Context) -> JsResult<()> {
    let native = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(write), JsString::from("write"), 2)
        .function(NativeFunction::from_fn_ptr(sleep), JsString::from("sleep"), 1)
        .function(NativeFunction::from_fn_ptr(read_file), JsString::from("readFile"), 1)
        .function(NativeFunction::from_fn_ptr(write_file), JsString::from("writeFile"), 2)
        .function(NativeFunction::from_fn_ptr(exists), JsString::from("exists"), 1)
        .function(NativeFunction::from_fn_ptr(stat), JsString::from("stat"), 1)
        .function(NativeFunction::from_fn_ptr(read_dir), JsString::from("readdir"), 1)
        .build();

    context.global_object().set(
        PropertyKey::from(JsString::from("__native")),
        native,
        true,
        context,
    )?;
    Ok(())
}
