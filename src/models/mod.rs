// src/models/mod.rs

pub mod attempt;
pub mod exam_type;
pub mod question;
pub mod result;
pub mod subject;
pub mod user;
