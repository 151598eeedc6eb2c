pub mod annotations;
pub mod app;
pub mod backend;
pub mod compositor;
pub mod config;
pub mod error;
pub mod event;
pub mod present;
pub mod render;
pub mod transform;
