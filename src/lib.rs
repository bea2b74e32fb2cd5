pub mod app;
pub mod communication;
pub mod core;
pub mod queue;
pub mod transport;
