pub mod config;
pub mod constants;
pub mod embedding;
pub mod frame;
pub mod image_ops;
pub mod region;
