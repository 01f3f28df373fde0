pub mod evaluation;
pub mod models;
pub mod post;
pub mod tables;
