//! Exchanges and their Yahoo symbol suffixes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Longest ticker accepted before resolution.
const MAX_TICKER_LEN: usize = 20;

/// Listing venue of an entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    Nyse,
    Nasdaq,
    Nse,
    Bse,
    Tsx,
    Lse,
    Xetra,
    Asx,
    Hkex,
    /// Any other exchange, kept by code; resolves without a suffix.
    Other(String),
}

/// Broad market an exchange belongs to.
///
/// Document collection is configured per region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingRegion {
    Us,
    India,
    Other,
}

impl Exchange {
    pub fn code(&self) -> &str {
        match self {
            Self::Nyse => "NYSE",
            Self::Nasdaq => "NASDAQ",
            Self::Nse => "NSE",
            Self::Bse => "BSE",
            Self::Tsx => "TSX",
            Self::Lse => "LSE",
            Self::Xetra => "XETRA",
            Self::Asx => "ASX",
            Self::Hkex => "HKEX",
            Self::Other(code) => code,
        }
    }

    /// Suffix Yahoo appends to tickers listed here.
    pub fn yahoo_suffix(&self) -> &'static str {
        match self {
            Self::Nyse | Self::Nasdaq | Self::Other(_) => "",
            Self::Nse => ".NS",
            Self::Bse => ".BO",
            Self::Tsx => ".TO",
            Self::Lse => ".L",
            Self::Xetra => ".DE",
            Self::Asx => ".AX",
            Self::Hkex => ".HK",
        }
    }

    pub fn region(&self) -> ListingRegion {
        match self {
            Self::Nyse | Self::Nasdaq => ListingRegion::Us,
            Self::Nse | Self::Bse => ListingRegion::India,
            _ => ListingRegion::Other,
        }
    }

    /// Infer the exchange from a Yahoo symbol suffix.
    pub fn from_yahoo_symbol(symbol: &str) -> Option<Self> {
        let (_, suffix) = symbol.rsplit_once('.')?;
        match suffix.to_ascii_uppercase().as_str() {
            "NS" => Some(Self::Nse),
            "BO" => Some(Self::Bse),
            "TO" => Some(Self::Tsx),
            "L" => Some(Self::Lse),
            "DE" => Some(Self::Xetra),
            "AX" => Some(Self::Asx),
            "HK" => Some(Self::Hkex),
            _ => None,
        }
    }
}

impl FromStr for Exchange {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Ok(match code.as_str() {
            "NYSE" | "XNYS" => Self::Nyse,
            "NASDAQ" | "XNAS" | "NMS" => Self::Nasdaq,
            "NSE" | "XNSE" => Self::Nse,
            "BSE" | "XBOM" => Self::Bse,
            "TSX" | "XTSE" => Self::Tsx,
            "LSE" | "XLON" => Self::Lse,
            "XETRA" | "XETR" => Self::Xetra,
            "ASX" | "XASX" => Self::Asx,
            "HKEX" | "XHKG" => Self::Hkex,
            _ => Self::Other(code),
        })
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Region of a ticker that may or may not carry an explicit exchange.
///
/// Without an exchange, a Yahoo suffix decides; a bare ticker is a US listing.
pub fn listing_region(ticker: &str, exchange: Option<&Exchange>) -> ListingRegion {
    match exchange {
        Some(exchange) => exchange.region(),
        None => Exchange::from_yahoo_symbol(ticker)
            .map(|e| e.region())
            .unwrap_or(ListingRegion::Us),
    }
}

/// Normalize and validate a ticker supplied by a caller.
pub fn normalize_ticker(ticker: &str) -> Result<String, MarketDataError> {
    let ticker = ticker.trim().to_ascii_uppercase();
    let valid_chars = ticker
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '&' | '^' | '='));
    if ticker.is_empty() || ticker.len() > MAX_TICKER_LEN || !valid_chars {
        return Err(MarketDataError::InvalidSymbol(ticker));
    }
    Ok(ticker)
}

/// Yahoo symbol for a ticker on an exchange.
///
/// A ticker that already carries a known suffix is left untouched.
pub fn yahoo_symbol(ticker: &str, exchange: Option<&Exchange>) -> Result<String, MarketDataError> {
    let ticker = normalize_ticker(ticker)?;
    if Exchange::from_yahoo_symbol(&ticker).is_some() {
        return Ok(ticker);
    }
    let suffix = exchange.map(|e| e.yahoo_suffix()).unwrap_or("");
    Ok(format!("{}{}", ticker, suffix))
}

/// Known Yahoo exchange suffixes.
const YAHOO_SUFFIXES: &[&str] = &[".NS", ".BO", ".TO", ".L", ".DE", ".AX", ".HK"];

/// Extract canonical ticker from a Yahoo symbol.
///
/// Uses a whitelist so share classes like BRK.B survive (".B" is not a
/// known exchange suffix).
pub fn strip_yahoo_suffix(symbol: &str) -> &str {
    if let Some(stripped) = symbol.strip_suffix("=X") {
        return stripped;
    }
    for suffix in YAHOO_SUFFIXES {
        if let Some(stripped) = symbol.strip_suffix(suffix) {
            return stripped;
        }
    }
    symbol
}
