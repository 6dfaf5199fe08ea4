//! String conversions for status-like enums.
//!
//! Statuses are persisted as lowercase text columns, so each enum needs the
//! same trio of conversions: a `&'static str` view, `Display`, and a
//! case-insensitive `FromStr`.
//!
//! # Example
//!
//! ```rust
//! use courier_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Phase {
//!     Queued,
//!     Sending,
//! }
//!
//! impl_domain_status_conversions!(Phase {
//!     Queued => "queued",
//!     Sending => "sending",
//! });
//!
//! assert_eq!(Phase::Sending.as_str(), "sending");
//! assert_eq!("QUEUED".parse::<Phase>(), Ok(Phase::Queued));
//! assert_eq!(Phase::ALL.len(), 2);
//! ```

/// Implements `as_str`, `ALL`, `Display` and `FromStr` for a fieldless enum.
///
/// Parsing ignores ASCII case; unknown input yields a message naming the enum.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Lowercase storage representation.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| format!("Invalid {}: {}", stringify!($enum_name), s))
            }
        }
    };
}
