//! In-process reference backend: a transfer client that materializes
//! literals in host memory and an op builder that records programs
//! while inferring result shapes.

pub mod builder;
pub mod client;

pub use builder::{OpId, Recorded, RecordingBuilder};
pub use client::{CpuClient, CpuData};
