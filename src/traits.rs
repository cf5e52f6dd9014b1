//! Protection-related trait definitions.

mod protection;

pub use protection::ProtectionScheme;
