mod repository;
mod schema;

pub use repository::{ChannelLink, Repository, Unlinked};
