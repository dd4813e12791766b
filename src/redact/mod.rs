pub mod chunk;
pub mod client;
pub mod stage;
