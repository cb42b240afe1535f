// src/handlers/mod.rs

pub mod admin;
pub mod attempt;
pub mod auth;
pub mod learning_path;
pub mod quiz;
pub mod ranking;
pub mod syllabus;
pub mod weak_area;
