use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Classification of a collected document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    AnnualReport,
    QuarterlyReport,
    Filing,
    InvestorPresentation,
    FinancialResults,
    Transcript,
    Other,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnnualReport => "annual_report",
            Self::QuarterlyReport => "quarterly_report",
            Self::Filing => "filing",
            Self::InvestorPresentation => "investor_presentation",
            Self::FinancialResults => "financial_results",
            Self::Transcript => "transcript",
            Self::Other => "other",
        }
    }

    /// Kind for an SEC form type.
    pub fn from_sec_form(form: &str) -> Self {
        match form {
            "10-K" | "20-F" | "40-F" => Self::AnnualReport,
            "10-Q" => Self::QuarterlyReport,
            _ => Self::Filing,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document returned by a [`DocumentCollector`](crate::provider::DocumentCollector).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedDocument {
    pub kind: DocumentKind,

    pub title: String,

    /// Filing or publication date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    pub url: String,

    /// Collector that produced it (e.g., "SEC_EDGAR")
    pub source: String,

    /// Source-assigned identifier such as an SEC accession number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,

    /// Extracted plain text, when the collector retrieved it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Keyword patterns, most specific kind first.
const KIND_PATTERNS: &[(DocumentKind, &[&str])] = &[
    (
        DocumentKind::Transcript,
        &[
            r"concall",
            r"conference.?call",
            r"earnings.?call",
            r"transcript",
        ],
    ),
    (
        DocumentKind::InvestorPresentation,
        &[
            r"investor.?presentation",
            r"corporate.?presentation",
            r"quarterly.?presentation",
            r"results.?presentation",
            r"earnings.?presentation",
        ],
    ),
    (
        DocumentKind::FinancialResults,
        &[
            r"financial.?results",
            r"quarterly.?results",
            r"q[1-4].?results",
            r"results.?press.?release",
        ],
    ),
    (
        DocumentKind::AnnualReport,
        &[r"annual.?report", r"integrated.?report", r"yearly.?report"],
    ),
];

fn kind_matchers() -> &'static [(DocumentKind, Regex)] {
    static MATCHERS: OnceLock<Vec<(DocumentKind, Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        KIND_PATTERNS
            .iter()
            .filter_map(|(kind, patterns)| {
                Regex::new(&format!("(?i){}", patterns.join("|")))
                    .ok()
                    .map(|re| (*kind, re))
            })
            .collect()
    })
}

/// Classify a document from its title and URL.
pub fn classify_document(title: &str, url: &str) -> DocumentKind {
    kind_matchers()
        .iter()
        .find(|(_, re)| re.is_match(title) || re.is_match(url))
        .map(|(kind, _)| *kind)
        .unwrap_or(DocumentKind::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_document() {
        assert_eq!(
            classify_document("Q2 FY24 Earnings Call Transcript", ""),
            DocumentKind::Transcript
        );
        assert_eq!(
            classify_document("Download", "https://ir.example.com/files/concall-q3.pdf"),
            DocumentKind::Transcript
        );
        assert_eq!(
            classify_document("Investor Presentation May 2024", ""),
            DocumentKind::InvestorPresentation
        );
        assert_eq!(
            classify_document("Q1 Results", "https://example.com/q1.pdf"),
            DocumentKind::FinancialResults
        );
        assert_eq!(
            classify_document("Integrated Annual Report 2023-24", ""),
            DocumentKind::AnnualReport
        );
        assert_eq!(classify_document("Board meeting notice", ""), DocumentKind::Other);
    }

    #[test]
    fn test_sec_form_kinds() {
        assert_eq!(DocumentKind::from_sec_form("10-K"), DocumentKind::AnnualReport);
        assert_eq!(DocumentKind::from_sec_form("10-Q"), DocumentKind::QuarterlyReport);
        assert_eq!(DocumentKind::from_sec_form("8-K"), DocumentKind::Filing);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&DocumentKind::InvestorPresentation).unwrap();
        assert_eq!(json, "\"investor_presentation\"");
    }
}
