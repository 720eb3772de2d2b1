pub mod broker;

pub use broker::{Closed, FrameBroker};
