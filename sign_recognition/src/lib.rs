mod cv_utils;
mod labels;
mod landmark_service;
mod model_manager;
mod model_service;
mod ort_landmarker;
mod ort_service;
mod prediction;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;
pub mod landmarks;

pub use app::start_app;
