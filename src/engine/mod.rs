pub mod controller;
pub mod tick;

pub use controller::*;
pub use tick::*;
