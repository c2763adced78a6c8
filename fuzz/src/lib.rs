//! Models and drivers for property-based testing with bolero.

pub mod byte_ring_model;
