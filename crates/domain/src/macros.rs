//! Macro for implementing Display and FromStr for status enums
//!
//! Status enums are persisted as lowercase text and parsed back from
//! storage, so both directions are generated from a single mapping.
//!
//! # Example
//!
//! ```rust
//! use stockpost_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum SweepStatus {
//!     Idle,
//!     Running,
//! }
//!
//! impl_domain_status_conversions!(SweepStatus {
//!     Idle => "idle",
//!     Running => "running",
//! });
//!
//! assert_eq!(SweepStatus::Running.to_string(), "running");
//! assert_eq!("IDLE".parse::<SweepStatus>(), Ok(SweepStatus::Idle));
//! ```

/// Implements Display and FromStr traits for status enums
///
/// - Display writes the mapped string
/// - FromStr parses case-insensitively and reports the enum name on failure
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
