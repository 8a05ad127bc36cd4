//! HTTP gateways to the post and follow services.

pub mod follows;
pub mod posts;

pub use follows::HttpFollowerGateway;
pub use posts::HttpPostGateway;
