mod constants;
mod controller;
mod state;

#[cfg(test)]
mod tests;

pub use constants::{MAX_OPACITY, MAX_ZOOM, MIN_OPACITY, MIN_ZOOM};
pub use controller::ViewController;
pub use state::{Tool, ViewState};
