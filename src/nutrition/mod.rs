pub mod feeds;
pub mod models;
pub mod requirements;
pub mod supply;
