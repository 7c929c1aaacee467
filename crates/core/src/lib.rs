pub mod error;
pub mod models;
pub mod parse;
pub mod pricing;
pub mod risk;
pub mod summary;
pub mod tables;

pub use error::QuoteError;
pub use models::*;
pub use parse::{
    normalize_text, parse_area_m2, parse_contact, parse_floors, parse_quantity, parse_yes_no,
};
pub use pricing::{compute_quote, QuoteBasis};
pub use risk::classify_risk;
pub use summary::{compose_quote_summary, compose_site_visit_summary, pct_encode, QuoteSummary};
pub use tables::{MunicipalFeeEntry, QuoteTables, ServiceCatalog};
