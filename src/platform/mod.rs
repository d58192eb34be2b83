//! Target platform detection and backend affinity.

pub mod router;

pub use router::{detect_platform, PlatformId};
