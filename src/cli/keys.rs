//! Translation between object keys and local file paths

use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR, MAIN_SEPARATOR_STR};

use super::args::KeyMode;

/// Local path for `key` below `target`.
///
/// Every `delimiter` in the key becomes a path separator and leading
/// separators are dropped. Returns `None` when the translated key contains
/// a `..`, root or prefix component, since the result would not stay under
/// `target`.
pub fn convert_key(target: &Path, key: &str, delimiter: &str) -> Option<PathBuf> {
    let translated = key.replace(delimiter, MAIN_SEPARATOR_STR);
    let relative = translated.trim_start_matches(MAIN_SEPARATOR);

    let safe = Path::new(relative)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !safe || relative.is_empty() {
        return None;
    }

    let target = target.to_string_lossy();
    let mut path = String::with_capacity(target.len() + relative.len() + 1);
    path.push_str(target.strip_suffix(MAIN_SEPARATOR).unwrap_or(&target));
    path.push(MAIN_SEPARATOR);
    path.push_str(relative);
    Some(PathBuf::from(path))
}

/// Object key for an uploaded `file`.
///
/// An explicit key is used as is for a single file. Otherwise (no key, or
/// recursive mode) the key is `key_prefix` followed by the file name
/// translated per `mode`, with path separators replaced by `delimiter`.
/// `base_path` is the absolute directory relative keys are taken against.
pub fn create_key(
    key_prefix: Option<&str>,
    file: &Path,
    base_path: &Path,
    mode: KeyMode,
    delimiter: &str,
    recursive: bool,
) -> std::io::Result<String> {
    let prefix = key_prefix.unwrap_or("");
    if !prefix.is_empty() && !recursive {
        return Ok(prefix.to_string());
    }

    let absolute = absolute_path(file)?;
    let translated = match mode {
        KeyMode::Basename => absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        KeyMode::Absolute => absolute
            .to_string_lossy()
            .replace(MAIN_SEPARATOR, delimiter),
        KeyMode::Relative => {
            let absolute = absolute.to_string_lossy();
            let base = base_path.to_string_lossy();
            absolute
                .strip_prefix(&*base)
                .unwrap_or(&absolute)
                .replace(MAIN_SEPARATOR, delimiter)
        }
    };

    Ok(format!("{}{}", prefix, translated))
}

/// Absolute, lexically cleaned form of `path` (symlinks are not resolved)
pub fn absolute_path(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    Ok(cleaned)
}
