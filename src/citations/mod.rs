// Statutory reference detection
// Finds Act names and section/subsection numbers in chunk text and answers


use std::sync::LazyLock;

use fancy_regex::Regex;
use itertools::Itertools;
use serde::Serialize;

/// `Real Estate and Business Brokers Act, 2002`: capitalised words, optional
/// connectives, then `Act`, with an optional year.
static ACT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b((?:[A-Z][A-Za-z'’-]*\s+(?:(?:and|of|the|for|on|in|to)\s+)?)+)Act(?![A-Za-z])(?:,\s*(\d{4}))?",
    )
    .expect("valid regex")
});

/// `section 12`, `subsection 12 (1)`, `s. 4.1(2)(a)`, `ss. 7`
static SECTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?<![A-Za-z])(?:(?:sub)?sections?|ss?\.)\s*(\d+(?:\.\d+)?)((?:\s?\([0-9a-z.]{1,6}\))*)",
    )
    .expect("valid regex")
});

static PART_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([0-9a-z.]+)\)").expect("valid regex"));

/// Capitalised words that start sentences rather than Act names
const LEADING_NOISE: [&str; 12] = [
    "A", "An", "And", "By", "In", "Of", "Pursuant", "See", "That", "The", "This", "Under",
];
const CONNECTIVES: [&str; 7] = ["and", "of", "the", "for", "on", "in", "to"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Citation {
    Act {
        name: String,
        year: Option<u16>,
    },
    Section {
        number: String,
        /// Parenthesised parts in order, e.g. `["1", "a"]` for `12(1)(a)`
        subsections: Vec<String>,
    },
}

impl std::fmt::Display for Citation {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Act {
                name,
                year: Some(year),
            } => write!(f, "{}, {}", name, year),
            Self::Act { name, year: None } => write!(f, "{}", name),
            Self::Section {
                number,
                subsections,
            } => {
                write!(f, "s. {}", number)?;
                for part in subsections {
                    write!(f, "({})", part)?;
                }
                Ok(())
            }
        }
    }
}

/// Every distinct citation in `text`, Acts first, each group in order of
/// first appearance.
#[inline]
pub fn extract_citations(text: &str) -> Vec<Citation> {
    acts(text).chain(sections(text)).unique().collect()
}

/// Distinct citations across several texts, in order of first appearance
#[inline]
pub fn extract_all<'a, I>(texts: I) -> Vec<Citation>
where
    I: IntoIterator<Item = &'a str>,
{
    texts
        .into_iter()
        .flat_map(extract_citations)
        .unique()
        .collect()
}

/// Whether `text` names any Act or section
#[inline]
pub fn has_citation(text: &str) -> bool {
    acts(text).next().is_some() || sections(text).next().is_some()
}

fn acts(text: &str) -> impl Iterator<Item = Citation> + '_ {
    ACT_REGEX
        .captures_iter(text)
        .filter_map(|captures| captures.ok())
        .filter_map(|captures| {
            let leading = captures
                .get(1)?
                .as_str()
                .split_whitespace()
                .skip_while(|word| LEADING_NOISE.contains(word) || CONNECTIVES.contains(word))
                .join(" ");
            if leading.is_empty() {
                return None;
            }
            let year = captures
                .get(2)
                .and_then(|year| year.as_str().parse::<u16>().ok());
            Some(Citation::Act {
                name: format!("{} Act", leading),
                year,
            })
        })
}

fn sections(text: &str) -> impl Iterator<Item = Citation> + '_ {
    SECTION_REGEX
        .captures_iter(text)
        .filter_map(|captures| captures.ok())
        .filter_map(|captures| {
            let number = captures.get(1)?.as_str().to_string();
            let subsections = captures
                .get(2)
                .map(|parts| {
                    PART_REGEX
                        .captures_iter(parts.as_str())
                        .filter_map(|part| part.ok())
                        .filter_map(|part| part.get(1).map(|m| m.as_str().to_string()))
                        .collect()
                })
                .unwrap_or_default();
            Some(Citation::Section {
                number,
                subsections,
            })
        })
}
