mod helpers;
mod money;
pub mod op;
mod secret;

pub use helpers::parse_boolean_flag;
pub use money::{MoneyMinor, MoneyMinorConversionError};
pub use secret::Secret;
