//! Source data models
//!
//! This module contains the raw data types the adapters produce:
//! - `price` - Daily bars (PricePoint)
//! - `profile` - Company profile and fundamentals (CompanyProfile)
//! - `snapshot` - One market-data fetch (MarketSnapshot)
//! - `news` - News items (NewsArticle)
//! - `document` - Collected documents and their classification

mod document;
mod news;
mod price;
mod profile;
mod snapshot;

pub use document::{classify_document, CollectedDocument, DocumentKind};
pub use news::NewsArticle;
pub use price::PricePoint;
pub use profile::CompanyProfile;
pub use snapshot::MarketSnapshot;
