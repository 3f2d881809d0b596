pub mod common;
pub mod config;
pub mod data;
pub mod dataset;
pub mod model;
pub mod objective;
pub mod params;
pub mod predict;
pub mod pretrained;
pub mod sink;
pub mod train;
pub mod utils;
