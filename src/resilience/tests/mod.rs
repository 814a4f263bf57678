// src/resilience/tests/mod.rs
//! Tests for resilience features
