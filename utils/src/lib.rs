#![cfg_attr(feature = "strict", deny(warnings))]

pub mod configuration_utils;
pub use configuration_utils::ParsableConfigValue;

// The configurable_constants! macro is exported at crate root by #[macro_export]

pub mod pipe;
pub use pipe::{ChannelReader, ChannelStream, ChannelWriter, pipe};
