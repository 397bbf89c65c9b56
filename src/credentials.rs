//! Input files: account credentials and the token preference list.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{BotError, Result};
use crate::platform::Credential;

/// Parse newline-delimited credentials.
///
/// Lines are trimmed; blank lines and `#` comments are skipped. Duplicate
/// tokens are kept once, in first-seen order.
pub fn parse_credentials(contents: &str) -> Vec<Credential> {
    let mut seen = std::collections::HashSet::new();
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_string()))
        .map(Credential::new)
        .collect()
}

/// Load credentials from a file; an empty result is an error.
pub fn load_credentials(path: impl AsRef<Path>) -> Result<Vec<Credential>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| BotError::Input(format!("cannot read {}: {}", path.display(), e)))?;

    let credentials = parse_credentials(&contents);
    if credentials.is_empty() {
        return Err(BotError::Input(format!(
            "{} contains no credentials",
            path.display()
        )));
    }

    debug!(count = credentials.len(), path = %path.display(), "Loaded credentials");
    Ok(credentials)
}

/// Parse a JSON array of token identifiers.
pub fn parse_preferred_tokens(contents: &str) -> Result<Vec<String>> {
    let tokens: Vec<String> = serde_json::from_str(contents)?;
    Ok(tokens
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

/// Load the preference list, or an empty list when no file is configured.
pub fn load_preferred_tokens(path: Option<&str>) -> Result<Vec<String>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let contents = fs::read_to_string(path)
        .map_err(|e| BotError::Input(format!("cannot read {}: {}", path, e)))?;
    parse_preferred_tokens(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_lines_and_comments_are_skipped() {
        let creds = parse_credentials("  tokA  \n\n# old account\ntokB\r\n   \ntokA\n");
        let raw: Vec<&str> = creds.iter().map(Credential::expose).collect();
        assert_eq!(raw, vec!["tokA", "tokB"]);
    }

    #[test]
    fn preferred_tokens_from_json() {
        let tokens = parse_preferred_tokens(r#"["BTC", " ETH ", ""]"#).unwrap();
        assert_eq!(tokens, vec!["BTC", "ETH"]);
        assert!(parse_preferred_tokens("{\"a\":1}").is_err());
    }

    #[test]
    fn missing_preference_file_means_empty_list() {
        assert!(load_preferred_tokens(None).unwrap().is_empty());
    }

    #[test]
    fn missing_credentials_file_is_an_input_error() {
        let err = load_credentials("/nonexistent/tokens.txt").unwrap_err();
        assert!(matches!(err, BotError::Input(_)));
    }

    #[test]
    fn credentials_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("ojo-bettor-creds-{}.txt", std::process::id()));
        fs::write(&path, "first-token\n\nsecond-token\n").unwrap();
        let creds = load_credentials(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[1].expose(), "second-token");
    }
}
