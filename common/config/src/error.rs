use std::io;

use derive_more::{Display, From};

#[derive(Debug, Display, From)]
pub enum ConfigError {
    #[display(fmt = "{}", _0)]
    Io(io::Error),
    #[display(fmt = "{}", _0)]
    Json(serde_json::Error),
    #[display(fmt = "invalid duration string {:?}", _0)]
    #[from(ignore)]
    InvalidDuration(String),
    #[display(fmt = "invalid hex value: {}", _0)]
    #[from(ignore)]
    InvalidHex(String),
}

impl std::error::Error for ConfigError {}
