mod handler;
mod model;

pub use handler::{clear_all, deactivate, get_one, list, register};
