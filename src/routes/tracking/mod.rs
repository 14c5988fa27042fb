mod handler;
mod model;

pub use handler::{start, start_all, status, stop, stop_all};
