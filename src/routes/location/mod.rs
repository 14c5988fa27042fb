mod handler;
mod model;

pub use handler::{raw_sample, submit};
