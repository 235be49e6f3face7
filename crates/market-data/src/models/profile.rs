use serde::{Deserialize, Serialize};

/// Company profile and fundamentals as reported by a source.
///
/// Every field is optional; a field the source did not send stays `None`.
/// Monetary values are unscaled amounts in `currency`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    /// Source that supplied this profile (e.g., "YAHOO")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Company name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Business sector (e.g., "Technology")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,

    /// Industry within sector (e.g., "Consumer Electronics")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    /// Country of domicile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Listing currency (e.g., "USD", "INR")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Exchange name as the source reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,

    /// Company website URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// Business description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Number of full-time employees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employees: Option<u64>,

    /// Market capitalization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta: Option<f64>,

    /// Trailing price-to-earnings ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<f64>,

    /// Dividend yield (as decimal, e.g., 0.025 for 2.5%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividend_yield: Option<f64>,

    /// 52-week high price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_52_high: Option<f64>,

    /// 52-week low price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_52_low: Option<f64>,
}

impl CompanyProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a profile with basic info
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Fill every empty field of `self` from `other`.
    pub fn merge_missing(&mut self, other: CompanyProfile) {
        macro_rules! fill {
            ($($field:ident),*) => {
                $(if self.$field.is_none() { self.$field = other.$field; })*
            };
        }
        fill!(
            source,
            name,
            sector,
            industry,
            country,
            currency,
            exchange,
            website,
            description,
            employees,
            market_cap,
            beta,
            pe_ratio,
            dividend_yield,
            week_52_high,
            week_52_low
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let profile = CompanyProfile::with_name("Acme Corp")
            .sector("Industrials")
            .industry("Machinery")
            .currency("USD");
        assert_eq!(profile.name.as_deref(), Some("Acme Corp"));
        assert_eq!(profile.sector.as_deref(), Some("Industrials"));
        assert!(profile.market_cap.is_none());
    }

    #[test]
    fn test_merge_missing_keeps_existing_values() {
        let mut profile = CompanyProfile::with_name("Acme Corp");
        let mut other = CompanyProfile::with_name("ACME CORPORATION").sector("Industrials");
        other.market_cap = Some(1.5e9);

        profile.merge_missing(other);
        assert_eq!(profile.name.as_deref(), Some("Acme Corp"));
        assert_eq!(profile.sector.as_deref(), Some("Industrials"));
        assert_eq!(profile.market_cap, Some(1.5e9));
    }

    #[test]
    fn test_empty_fields_are_not_serialized() {
        let json = serde_json::to_value(CompanyProfile::with_name("Acme")).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "Acme" }));
    }
}
