//! Parsing `npm search --json` output.

use chrono::{DateTime, Utc};
use npmx_core::error::{Error, Result};
use npmx_core::Package;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SearchEntry {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    keywords: Option<Keywords>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    publisher: Option<Person>,
    #[serde(default)]
    author: Option<Person>,
}

/// Older registry entries store keywords as one space-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Keywords {
    List(Vec<String>),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct Person {
    #[serde(default, alias = "username")]
    name: Option<String>,
}

impl From<SearchEntry> for Package {
    fn from(entry: SearchEntry) -> Self {
        let keywords = match entry.keywords {
            Some(Keywords::List(list)) => list,
            Some(Keywords::Text(text)) => text.split_whitespace().map(str::to_string).collect(),
            None => Vec::new(),
        };
        let published = entry
            .date
            .as_deref()
            .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
            .map(|date| date.with_timezone(&Utc));
        let author = entry
            .author
            .and_then(|p| p.name)
            .or_else(|| entry.publisher.and_then(|p| p.name));

        Package {
            name: entry.name,
            version: entry.version,
            description: entry.description.unwrap_or_default(),
            author,
            keywords,
            published,
        }
    }
}

/// Parses the JSON array printed by `npm search --json`.
///
/// Blank output means no matches.
pub fn parse_search_output(stdout: &str) -> Result<Vec<Package>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<SearchEntry> =
        serde_json::from_str(trimmed).map_err(|e| Error::Parse(e.to_string()))?;
    Ok(entries.into_iter().map(Package::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const REACT_SEARCH: &str = r#"[
      {
        "name": "react",
        "description": "React is a JavaScript library for building user interfaces.",
        "maintainers": [{"username": "react-bot", "email": "bot@react.dev"}],
        "version": "18.2.0",
        "date": "2022-06-14T19:46:38.369Z",
        "keywords": ["react"],
        "publisher": {"username": "gnoff", "email": "gnoff@example.com"}
      },
      {
        "name": "react-dom",
        "description": "React package for working with the DOM.",
        "version": "18.2.0",
        "keywords": "react dom",
        "author": {"name": "Meta"}
      },
      {
        "name": "react-is",
        "description": null,
        "version": "18.2.0"
      }
    ]"#;

    #[test]
    fn test_parse_search_output() {
        let packages = parse_search_output(REACT_SEARCH).unwrap();
        assert_eq!(packages.len(), 3);

        let react = &packages[0];
        assert_eq!(react.name, "react");
        assert_eq!(react.version, "18.2.0");
        assert_eq!(react.author.as_deref(), Some("gnoff"));
        assert_eq!(react.keywords, vec!["react".to_string()]);
        assert_eq!(react.published.map(|d| d.year()), Some(2022));

        let dom = &packages[1];
        assert_eq!(dom.author.as_deref(), Some("Meta"));
        assert_eq!(dom.keywords, vec!["react".to_string(), "dom".to_string()]);
        assert_eq!(dom.published, None);

        assert_eq!(packages[2].description, "");
    }

    #[test]
    fn test_blank_output_is_empty() {
        assert!(parse_search_output("").unwrap().is_empty());
        assert!(parse_search_output("  \n").unwrap().is_empty());
        assert!(parse_search_output("[]").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_output_is_parse_error() {
        assert!(matches!(
            parse_search_output("No matches found for \"zzzz\""),
            Err(Error::Parse(_))
        ));
    }
}
