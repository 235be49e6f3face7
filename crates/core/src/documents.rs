//! Stable identity for collected documents.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use fingraph_market_data::DocumentKind;

/// `{ticker}_{kind}_{YYYYMMDD}_{discriminator}`, or `{ticker}_{kind}_u{hash}`
/// when the document has no date.
///
/// The discriminator is the source-assigned accession number when there is
/// one, otherwise the first 8 hex digits of the SHA-256 of the URL, so two
/// filings of one kind on the same day keep distinct ids. The undated hash is
/// the first 12 hex digits. Re-collecting the same document always maps to
/// the same id.
pub fn document_id(
    ticker: &str,
    kind: DocumentKind,
    date: Option<NaiveDate>,
    accession: Option<&str>,
    url: &str,
) -> String {
    match date {
        Some(date) => {
            let discriminator = accession
                .map(sanitize_accession)
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| url_digest(url, 8));
            format!(
                "{}_{}_{}_{}",
                ticker,
                kind,
                date.format("%Y%m%d"),
                discriminator
            )
        }
        None => format!("{}_{}_u{}", ticker, kind, url_digest(url, 12)),
    }
}

fn url_digest(url: &str, len: usize) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    digest[..len].to_string()
}

/// Accession numbers keep their digits and dashes ("0000320193-23-000106").
fn sanitize_accession(accession: &str) -> String {
    accession
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dated_id_uses_accession() {
        let id = document_id(
            "AAPL",
            DocumentKind::AnnualReport,
            NaiveDate::from_ymd_opt(2023, 11, 3),
            Some("0000320193-23-000106"),
            "https://www.sec.gov/x.htm",
        );
        assert_eq!(id, "AAPL_annual_report_20231103_0000320193-23-000106");
    }

    #[test]
    fn test_same_day_filings_get_distinct_ids() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1);
        let first = document_id(
            "ACME",
            DocumentKind::Filing,
            date,
            Some("0000000001-24-000001"),
            "https://www.sec.gov/a.htm",
        );
        let second = document_id(
            "ACME",
            DocumentKind::Filing,
            date,
            Some("0000000001-24-000002"),
            "https://www.sec.gov/b.htm",
        );
        assert_ne!(first, second);
        assert!(first.starts_with("ACME_filing_20240501_"));
    }

    fn transcript_id(date: Option<NaiveDate>, accession: Option<&str>, url: &str) -> String {
        document_id("INFY", DocumentKind::Transcript, date, accession, url)
    }

    #[test]
    fn test_dated_id_without_accession_hashes_the_url() {
        let date = NaiveDate::from_ymd_opt(2024, 4, 18);
        let a = transcript_id(date, None, "https://ir.example.com/a.pdf");
        let b = transcript_id(date, None, "https://ir.example.com/b.pdf");
        assert_ne!(a, b);
        assert!(a.starts_with("INFY_transcript_20240418_"));
        assert_eq!(a.len(), "INFY_transcript_20240418_".len() + 8);
        assert_eq!(a, transcript_id(date, Some("  "), "https://ir.example.com/a.pdf"));
    }

    #[test]
    fn test_undated_id_is_stable_per_url() {
        let a = transcript_id(None, None, "https://ir.example.com/a.pdf");
        let b = transcript_id(None, None, "https://ir.example.com/a.pdf");
        let c = transcript_id(None, None, "https://ir.example.com/b.pdf");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("INFY_transcript_u"));
        assert_eq!(a.len(), "INFY_transcript_u".len() + 12);
    }
}
