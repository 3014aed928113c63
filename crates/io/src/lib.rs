// File I/O operations

pub mod json;
pub mod s2v;
