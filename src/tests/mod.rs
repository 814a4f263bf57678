// src/tests/mod.rs


/// Dual-scope admission through the public entry points
mod limiter_tests;
