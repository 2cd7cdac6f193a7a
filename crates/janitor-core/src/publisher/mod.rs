// # Correction Publisher Implementations
//
// Provider-independent publishers. Publishers that talk to a cloud API live
// in the provider crates.

pub mod channel;
pub mod log;

pub use channel::ChannelPublisher;
pub use log::LogPublisher;
