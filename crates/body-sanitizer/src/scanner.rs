//! Scanner that checks text against the leak catalogue and any literal
//! secrets registered at construction time.

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

use crate::patterns::{PatternCategory, PATTERNS};

/// Literal secrets shorter than this are ignored; matching them would
/// redact ordinary words.
const MIN_LITERAL_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("failed to compile regex pattern: {0}")]
    RegexCompile(#[from] regex::Error),
}

/// A single match. `matched_len` is kept instead of the matched text so a
/// finding can be logged without re-leaking the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub pattern_name: String,
    pub category: String,
    pub offset: usize,
    pub matched_len: usize,
}

impl Finding {
    pub fn end(&self) -> usize {
        self.offset + self.matched_len
    }
}

pub struct Scanner {
    regex_set: RegexSet,
    individual: Vec<Regex>,
    literals: Vec<String>,
}

impl Scanner {
    /// Compile the catalogue. `literals` are exact secret values (API keys,
    /// session cookies) that are redacted wherever they appear.
    pub fn new<I, S>(literals: I) -> Result<Self, ScannerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern_strings: Vec<&str> = PATTERNS.iter().map(|p| p.pattern).collect();
        let regex_set = RegexSet::new(&pattern_strings)?;
        let individual = pattern_strings
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            regex_set,
            individual,
            literals: prepare_literals(literals),
        })
    }

    /// A scanner that only looks for `literals`, without the catalogue.
    pub fn literals_only<I, S>(literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            regex_set: RegexSet::empty(),
            individual: Vec::new(),
            literals: prepare_literals(literals),
        }
    }

    /// Scan `text`; findings are sorted by offset, longest match first on ties.
    pub fn scan(&self, text: &str) -> Vec<Finding> {
        let mut findings: Vec<Finding> = Vec::new();

        for idx in self.regex_set.matches(text).into_iter() {
            let pattern_def = &PATTERNS[idx];
            for m in self.individual[idx].find_iter(text) {
                findings.push(Finding {
                    pattern_name: pattern_def.name.to_string(),
                    category: pattern_def.category.to_string(),
                    offset: m.start(),
                    matched_len: m.len(),
                });
            }
        }

        for literal in &self.literals {
            for (offset, matched) in text.match_indices(literal.as_str()) {
                findings.push(Finding {
                    pattern_name: "configured_secret".to_string(),
                    category: PatternCategory::ConfiguredSecret.to_string(),
                    offset,
                    matched_len: matched.len(),
                });
            }
        }

        findings.sort_by(|a, b| a.offset.cmp(&b.offset).then(b.matched_len.cmp(&a.matched_len)));
        findings
    }

}

/// Drop too-short literals, then order longest first so a secret containing
/// another secret wins the span.
fn prepare_literals<I, S>(literals: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut literals: Vec<String> = literals
        .into_iter()
        .map(Into::into)
        .filter(|s: &String| s.len() >= MIN_LITERAL_LEN)
        .collect();
    literals.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    literals.dedup();
    literals
}
