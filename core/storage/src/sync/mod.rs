mod driver;
mod state;

pub use driver::{run, SyncConfig, SyncTransport};
pub use state::{step, SyncEvent, SyncState};
