//! Result type alias for Strata

use super::errors::StrataError;

/// Result type alias for Strata operations
///
/// # Examples
///
/// ```
/// use strata::domain::result::Result;
/// use strata::domain::errors::StrataError;
///
/// fn parse_days(raw: &str) -> Result<u32> {
///     raw.parse()
///         .map_err(|_| StrataError::Validation(format!("not a day count: {raw}")))
/// }
///
/// assert_eq!(parse_days("7").unwrap(), 7);
/// assert!(parse_days("seven").is_err());
/// ```
pub type Result<T> = std::result::Result<T, StrataError>;
