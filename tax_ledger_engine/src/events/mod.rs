mod channel;
mod event_types;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
