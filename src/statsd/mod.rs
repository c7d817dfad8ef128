pub mod emitter;
pub mod encoder;
pub mod throttle;

pub use emitter::{Emitter, SendOutcome, UdpEmitter};
pub use encoder::StatsdEncoder;
