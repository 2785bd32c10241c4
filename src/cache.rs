//! Model directory resolution.
//!
//! A model is named either by a path to an existing directory or by a model
//! id (e.g. `deepset/bert-base-cased-squad2`) resolved under a models root.
//! The root is determined by (in priority order):
//!
//! 1. An explicit `models_dir` (config file or command-line flag).
//! 2. The `UNI_MODELS_DIR` environment variable.
//! 3. A default `models/` directory relative to the working directory.

use std::path::{Path, PathBuf};

/// Replace `/` with `--` and strip characters that are unsafe in directory names.
pub fn sanitize_model_name(model_id: &str) -> String {
    model_id
        .replace('/', "--")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

/// The environment variable used to override the models root.
pub const MODELS_ROOT_ENV: &str = "UNI_MODELS_DIR";

/// Default models root (relative to CWD).
pub const DEFAULT_MODELS_ROOT: &str = "models";

/// Return the models root, respecting the `UNI_MODELS_DIR` env var.
pub fn models_root() -> PathBuf {
    std::env::var(MODELS_ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODELS_ROOT))
}

/// Resolve the directory holding `model_name`.
///
/// Priority (highest first):
/// 1. `model_name` itself, when it is an existing directory
/// 2. `<models_dir>/<model_name>`, when that directory exists (nested ids
///    like `org/model` are kept as nested directories)
/// 3. `<models_dir>/<sanitized model_name>`, the download target
pub fn resolve_model_dir(models_dir: Option<&Path>, model_name: &str) -> PathBuf {
    let direct = Path::new(model_name);
    if direct.is_dir() {
        return direct.to_path_buf();
    }
    let root = models_dir.map(Path::to_path_buf).unwrap_or_else(models_root);
    let nested = root.join(model_name);
    if nested.is_dir() {
        return nested;
    }
    root.join(sanitize_model_name(model_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Serialise all tests that read or write UNI_MODELS_DIR to avoid races
    // between parallel test threads (env vars are process-global).
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn sanitize_slash_replaced_with_double_dash() {
        assert_eq!(
            sanitize_model_name("deepset/bert-base-cased-squad2"),
            "deepset--bert-base-cased-squad2"
        );
    }

    #[test]
    fn sanitize_strips_unsafe_chars() {
        assert_eq!(sanitize_model_name("foo:bar@baz"), "foobarbaz");
    }

    #[test]
    fn existing_directory_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().to_string_lossy().into_owned();
        assert_eq!(resolve_model_dir(None, &name), dir.path());
    }

    #[test]
    fn nested_model_id_under_explicit_root() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("org/model")).unwrap();
        assert_eq!(
            resolve_model_dir(Some(root.path()), "org/model"),
            root.path().join("org/model")
        );
    }

    #[test]
    fn missing_model_resolves_to_sanitized_download_target() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_model_dir(Some(root.path()), "org/model"),
            root.path().join("org--model")
        );
    }

    #[test]
    fn env_var_root_applies_without_explicit_root() {
        let _lock = ENV_LOCK.lock().unwrap();
        // SAFETY: protected by ENV_LOCK
        unsafe { std::env::set_var(MODELS_ROOT_ENV, "/data/models") };
        let path = resolve_model_dir(None, "org/absent-model");
        unsafe { std::env::remove_var(MODELS_ROOT_ENV) };
        assert_eq!(path, PathBuf::from("/data/models/org--absent-model"));
    }

    #[test]
    fn default_root_without_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        // SAFETY: protected by ENV_LOCK
        unsafe { std::env::remove_var(MODELS_ROOT_ENV) };
        assert_eq!(models_root(), PathBuf::from(DEFAULT_MODELS_ROOT));
    }
}
