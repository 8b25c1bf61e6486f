pub mod apdu;
pub mod atr;
pub mod card;
pub mod config;
pub mod context;
pub mod error;
pub mod native;
pub mod pcsc;
pub mod reader;
pub mod status;
pub mod utils;
