//! Macro for implementing Display and FromStr for string-backed enums
//!
//! Priorities and connection types travel through config files, storage rows
//! and log fields as lowercase strings. This macro keeps both directions of
//! that mapping in one table.
//!
//! # Example
//!
//! ```rust
//! use fieldsync_domain::impl_domain_enum_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Backend {
//!     Memory,
//!     File,
//! }
//!
//! impl_domain_enum_conversions!(Backend {
//!     Memory => "memory",
//!     File => "file",
//! });
//!
//! assert_eq!(Backend::File.to_string(), "file");
//! assert_eq!("MEMORY".parse::<Backend>().unwrap(), Backend::Memory);
//! ```

/// Implements Display and FromStr traits for string-backed enums
///
/// This macro generates:
/// - Display trait: writes the mapped string
/// - FromStr trait: parses case-insensitive strings to enum variants
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their lowercase string
///   representations
#[macro_export]
macro_rules! impl_domain_enum_conversions {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => std::result::Result::Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
