mod handler;
mod model;

pub use handler::{geocode, health, stats};
