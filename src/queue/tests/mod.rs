//! Test modules for the event queue
//!
//! Tests are organised by functional area.

mod blocking;
