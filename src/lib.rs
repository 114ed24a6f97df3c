pub mod config;
pub mod docx;
pub mod format;
pub mod progress;
pub mod service;
pub mod textutil;
