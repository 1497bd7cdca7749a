//! HTML extraction: catalog link harvesting, detail record extraction, and
//! price parsing.

pub mod links;
pub mod price;
pub mod record;

pub use links::extract_catalog_links;
pub use price::{default_currency_markers, parse_price, CurrencyMarker, ParsedPrice};
pub use record::{extract_record, CandidateRecord, ValidationFailure};
