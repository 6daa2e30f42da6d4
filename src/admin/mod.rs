//! Administrative flows over the Splat API

pub mod manager;

pub use manager::{NewSplat, SplatManager};
