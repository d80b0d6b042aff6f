//! Cache path utilities - uses ~/.cache/pkgaudit/ for compiled artifacts

use std::path::PathBuf;

/// Get the cache directory for compiled artifacts.
/// Uses ~/.cache/pkgaudit/ on Unix, %LOCALAPPDATA%/pkgaudit/ on Windows.
pub fn get_cache_dir() -> PathBuf {
    let base = if cfg!(windows) {
        std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")))
    } else {
        dirs::cache_dir().unwrap_or_else(|| {
            // Fallback to ~/.cache
            dirs::home_dir()
                .map(|h| h.join(".cache"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    };

    base.join("pkgaudit")
}

/// Default location of the compiled blacklist automaton.
pub fn default_automaton_path() -> PathBuf {
    get_cache_dir().join("automaton.bin")
}

/// Default location of the compiled forbidden-pattern bundle.
pub fn default_bundle_path() -> PathBuf {
    get_cache_dir().join("forbidden_patterns.bin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_dir_format() {
        let cache = get_cache_dir();
        assert!(cache.to_string_lossy().contains("pkgaudit"));
    }

    #[test]
    fn test_artifacts_live_in_cache_dir() {
        assert!(default_automaton_path().starts_with(get_cache_dir()));
        assert!(default_bundle_path().starts_with(get_cache_dir()));
        assert_ne!(default_automaton_path(), default_bundle_path());
    }
}
