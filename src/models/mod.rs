mod apod;

pub use apod::*;
