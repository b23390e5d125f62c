pub mod cli;
pub mod config;
pub mod convert;
pub mod core;
pub mod engine;
pub mod exit;
pub mod governance;
pub mod heatmap;
pub mod io;
pub mod logs;
pub mod mapper;
pub mod nuclei;
pub mod platform;
pub mod reference;
pub mod rules;
pub mod ui;
