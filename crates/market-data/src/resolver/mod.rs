//! Identifier resolution.
//!
//! Turns a caller-supplied ticker and optional exchange into the symbol a
//! source expects (e.g., "RELIANCE" on NSE becomes "RELIANCE.NS" for Yahoo).

mod exchange;

pub use exchange::{
    listing_region, normalize_ticker, strip_yahoo_suffix, yahoo_symbol, Exchange, ListingRegion,
};
