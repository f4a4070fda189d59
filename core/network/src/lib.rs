mod codec;
mod error;
mod peer;
mod queue;
mod service;

pub use codec::{TOPIC_SIZE};
pub use error::NetworkError;
pub use service::NetworkService;
