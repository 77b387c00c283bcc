//! Source resolver implementations

mod hickory;

pub use hickory::HickorySourceResolver;
