//! Configuration module for pkgaudit
//!
//! This module handles:
//! - Scan configuration (pkgaudit.toml)
//! - Text, structural, typosquat and engine settings

mod scan_config;

pub use scan_config::{
    EngineConfig,
    ScanConfig,
    StructuralConfig,
    TextConfig,
    TyposquatConfig,
    load_config_file,
    load_scan_config,
};
