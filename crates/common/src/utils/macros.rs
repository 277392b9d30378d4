//! Macros for reducing boilerplate code

/// Implements `Display` and `FromStr` for a fieldless status enum
///
/// `Display` writes the given lowercase string; `FromStr` parses it
/// case-insensitively. Used wherever an enum is persisted as TEXT.
///
/// ```rust
/// use fieldlink_common::impl_status_conversions;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// pub enum DeliveryStatus {
///     Pending,
///     Delivered,
/// }
///
/// impl_status_conversions!(DeliveryStatus {
///     Pending => "pending",
///     Delivered => "delivered",
/// });
///
/// assert_eq!(DeliveryStatus::Delivered.to_string(), "delivered");
/// assert_eq!("PENDING".parse::<DeliveryStatus>(), Ok(DeliveryStatus::Pending));
/// ```
#[macro_export]
macro_rules! impl_status_conversions {
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
