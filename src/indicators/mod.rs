// Technical indicator module
pub mod atr;
pub mod rsi;
pub mod zscore;

pub use atr::calculate_atr;
pub use rsi::calculate_rsi;
pub use zscore::calculate_zscore;
