//! Shared utilities

use anyhow::Context as _;
use std::path::Path;

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// Read a prompt file as UTF-8, decoding it as Latin-1 when that fails
pub fn read_prompt_file(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Error reading prompt file {}", path.display()))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("{} is not UTF-8, reading it as Latin-1", path.display());
            e.into_bytes().into_iter().map(char::from).collect()
        }
    };
    Ok(text.trim().to_string())
}

/// Whether `name` can be used as a scene class name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello...");
        assert_eq!(truncate_chars("héllo", 2), "hé...");
    }

    #[test]
    fn test_read_prompt_file_utf8_and_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let utf8 = dir.path().join("utf8.txt");
        std::fs::write(&utf8, "  a circle that turns into a carré\n").unwrap();
        assert_eq!(
            read_prompt_file(&utf8).unwrap(),
            "a circle that turns into a carré"
        );

        // 0xE9 is 'é' in Latin-1 and invalid on its own in UTF-8
        let latin1 = dir.path().join("latin1.txt");
        std::fs::write(&latin1, b"carr\xe9 rouge\n").unwrap();
        assert_eq!(read_prompt_file(&latin1).unwrap(), "carré rouge");
    }

    #[test]
    fn test_read_prompt_file_missing() {
        let err = read_prompt_file(Path::new("/nonexistent/prompt.txt")).unwrap_err();
        assert!(err.to_string().contains("Error reading prompt file"));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("circleScene"));
        assert!(is_identifier("_Scene2"));
        assert!(!is_identifier("2Scene"));
        assert!(!is_identifier("my-scene"));
        assert!(!is_identifier(""));
    }
}
