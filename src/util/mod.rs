//! Utility functions shared by configuration loading and the binary.
//!
//! - **URL validation**: well-formedness checks for configured feed URLs
//!
//! # Examples
//!
//! ```
//! use feedreader::util::validate_url;
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.scheme(), "https");
//! ```

mod url_validator;

pub use url_validator::{validate_url, FeedUrl, UrlValidationError};
