use crate::error::{Result, TracemapError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const TRACEMAP_DIR: &str = ".tracemap";
pub const TEMPLATES_DIR: &str = ".tracemap/templates";
pub const CONFIG_FILE: &str = ".tracemap/config.yaml";

pub const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn tracemap_dir(root: &Path) -> PathBuf {
    root.join(TRACEMAP_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn default_templates_dir(root: &Path) -> PathBuf {
    root.join(TEMPLATES_DIR)
}

pub fn is_template_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEMPLATE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static IDENT_RE: OnceLock<Regex> = OnceLock::new();

fn ident_re() -> &'static Regex {
    IDENT_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").unwrap())
}

/// Node ids, template ids and trigger keys share one identifier grammar.
pub fn validate_identifier(ident: &str) -> Result<()> {
    if ident.is_empty() || ident.len() > 128 || !ident_re().is_match(ident) {
        return Err(TracemapError::InvalidIdentifier(ident.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_identifiers() {
        for ident in ["webhook", "validate_contact", "step-2", "a", "create.task"] {
            validate_identifier(ident).unwrap_or_else(|_| panic!("expected valid: {ident}"));
        }
    }

    #[test]
    fn invalid_identifiers() {
        for ident in ["", "_leading", "has spaces", "svc:op", "-dash"] {
            assert!(validate_identifier(ident).is_err(), "expected invalid: {ident}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/proj/.tracemap/config.yaml")
        );
        assert_eq!(
            default_templates_dir(root),
            PathBuf::from("/tmp/proj/.tracemap/templates")
        );
        assert!(is_template_file(Path::new("a/booking.yaml")));
        assert!(is_template_file(Path::new("a/booking.json")));
        assert!(!is_template_file(Path::new("a/README.md")));
    }
}
