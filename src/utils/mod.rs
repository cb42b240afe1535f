// src/utils/mod.rs

pub mod hash;
pub mod html;
pub mod jwt;
pub mod llm;
pub mod rate_limit;
