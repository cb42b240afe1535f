// src/models/mod.rs

pub mod attempt;
pub mod learning_path;
pub mod quiz;
pub mod ranking;
pub mod syllabus;
pub mod user;
pub mod weak_area;
