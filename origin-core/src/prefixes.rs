//! Offline prefix-table builder.
//!
//! Turns already-scraped country rows (registration prefix text plus a raw
//! infobox demonym) into a [`PrefixTable`]. Fetching the source pages is
//! someone else's job.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::registration::PrefixTable;
use crate::types::Result;

/// One scraped country row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountryRow {
    /// Comma-separated prefix column, e.g. `"VP-A, VP-B (reserved)"`.
    pub prefixes_text: String,
    /// Raw demonym text from the country's infobox, if one was found.
    #[serde(default)]
    pub demonym_raw: Option<String>,
}

/// Scraped input keyed by country name.
pub type CountryRows = BTreeMap<String, CountryRow>;

/// Separators tried in order; each keeps the first non-blank piece.
const DEMONYM_SEPARATORS: [&str; 7] = ["\n", " · ", "· ", " / ", " or ", ", ", "; "];

pub fn parse_rows(text: &str) -> Result<CountryRows> {
    Ok(serde_json::from_str(text)?)
}

/// Registration prefixes in a comma-separated cell.
///
/// Each item contributes its leading `[A-Z0-9-]+` token, provided the token
/// is followed by the end of the item or whitespace. Anything else is noise.
pub fn extract_prefixes(text: &str) -> Vec<String> {
    text.split(", ")
        .filter_map(|item| {
            let end = item
                .find(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-'))
                .unwrap_or(item.len());
            if end == 0 {
                return None;
            }
            let rest = &item[end..];
            match rest.chars().next() {
                None => Some(item[..end].to_string()),
                Some(c) if c.is_whitespace() => Some(item[..end].to_string()),
                Some(_) => None,
            }
        })
        .collect()
}

/// Reduce a raw infobox demonym to a single label. Empty when nothing usable
/// remains.
pub fn clean_demonym(raw: &str) -> String {
    let mut label = wiki_link_label(raw).unwrap_or(raw);

    for sep in DEMONYM_SEPARATORS {
        label = first_non_blank(label, sep);
    }

    if let Some(open) = label.find('(') {
        if open > 0 {
            label = &label[..open];
        }
    }
    label.trim().to_string()
}

pub fn fallback_demonym(country: &str) -> String {
    format!("{country}-ian")
}

/// Build the prefix table; demonyms that clean to nothing fall back to
/// [`fallback_demonym`]. Later countries overwrite earlier ones on a shared
/// prefix.
pub fn build_prefix_table(rows: &CountryRows) -> PrefixTable {
    let mut table = PrefixTable::new();
    for (country, row) in rows {
        let cleaned = row
            .demonym_raw
            .as_deref()
            .map(clean_demonym)
            .unwrap_or_default();
        let label = if cleaned.is_empty() {
            warn!(%country, "no demonym found, falling back to suffix");
            fallback_demonym(country)
        } else {
            cleaned
        };

        let prefixes = extract_prefixes(&row.prefixes_text);
        debug!(%country, %label, count = prefixes.len(), "country prefixes");
        for prefix in prefixes {
            table.insert(prefix, label.clone());
        }
    }
    table
}

/// Label of a `[[Page|Label]]` link, up to the end of its line.
fn wiki_link_label(text: &str) -> Option<&str> {
    let start = text.find("[[")? + 2;
    let line = text[start..].lines().next()?;
    let pipe = line.rfind('|')?;
    let label = &line[pipe + 1..];
    let label = label.split("]]").next().unwrap_or(label);
    (!label.is_empty()).then_some(label)
}

fn first_non_blank<'a>(text: &'a str, sep: &str) -> &'a str {
    text.split(sep)
        .find(|piece| !piece.trim().is_empty())
        .unwrap_or("")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::nationality_for;

    #[test]
    fn test_extract_prefixes() {
        assert_eq!(extract_prefixes("G"), vec!["G"]);
        assert_eq!(
            extract_prefixes("VP-A, VP-B (reserved), VQ-B"),
            vec!["VP-A", "VP-B", "VQ-B"]
        );
        // Lowercase continuation and leading punctuation are rejected.
        assert_eq!(extract_prefixes("Ab, (none), 4X"), vec!["4X"]);
        assert!(extract_prefixes("").is_empty());
    }

    #[test]
    fn test_clean_demonym_separators() {
        assert_eq!(clean_demonym("Swiss"), "Swiss");
        assert_eq!(clean_demonym("\n\nBritish\nBriton"), "British");
        assert_eq!(clean_demonym("Czech · Czechian"), "Czech");
        assert_eq!(clean_demonym("Sammarinese / San Marinese"), "Sammarinese");
        assert_eq!(clean_demonym("Emirati or Emirian"), "Emirati");
        assert_eq!(clean_demonym("Maltese, Maltan"), "Maltese");
        assert_eq!(clean_demonym("Dutch; Netherlander"), "Dutch");
    }

    #[test]
    fn test_clean_demonym_brackets_and_links() {
        assert_eq!(clean_demonym("Irish (formal)"), "Irish");
        assert_eq!(clean_demonym("[[Americans|American]]"), "American");
        assert_eq!(clean_demonym("   "), "");
    }

    #[test]
    fn test_build_table_with_fallback() {
        let rows = parse_rows(
            r#"{
                "Portugal": { "prefixes_text": "CR, CS", "demonym_raw": "Portuguese" },
                "Atlantis": { "prefixes_text": "QQ" },
                "Nowhere": { "prefixes_text": "QX", "demonym_raw": " \n " }
            }"#,
        )
        .unwrap();
        let table = build_prefix_table(&rows);

        assert_eq!(table.len(), 4);
        assert_eq!(nationality_for("CS-PHD", &table), "Portuguese");
        assert_eq!(nationality_for("CR-ABC", &table), "Portuguese");
        assert_eq!(nationality_for("QQ-1", &table), "Atlantis-ian");
        assert_eq!(nationality_for("QX-1", &table), "Nowhere-ian");
    }
}
