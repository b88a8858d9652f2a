//! Integration test modules.

mod fusion_flow;
mod persistence;
