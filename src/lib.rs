pub mod camera;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod pose;
pub mod render;
pub mod retarget;
pub mod skeleton;
