use std::error::Error;

use derive_more::{Display, From};
use protocol::{ProtocolError, ProtocolErrorKind};

#[derive(Debug, Display, From)]
pub enum CliError {
    #[display(fmt = "at least one --config file is required")]
    #[from(ignore)]
    MissingConfig,
}

impl Error for CliError {}

impl From<CliError> for ProtocolError {
    fn from(error: CliError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Config, Box::new(error))
    }
}
