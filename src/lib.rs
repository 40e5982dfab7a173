#[macro_use] extern crate lazy_static;

pub mod all;
pub mod boundary;
pub mod camera;
pub mod camera_pinhole;
pub mod camera_setup;
pub mod detection;
pub mod error;
pub mod evaluator;
pub mod frame;
pub mod geodesy;
pub mod image;
pub mod input;
pub mod locator;
pub mod math;
pub mod output;
pub mod parameters;
pub mod pipeline;
pub mod pose_filter;
pub mod rectify;
pub mod types;
pub mod util;
