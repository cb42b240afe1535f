// src/services/mod.rs

//! Domain logic kept free of HTTP concerns.

pub mod grading;
pub mod learning_path;
pub mod quiz_generation;
pub mod ranking;
pub mod weak_area;
