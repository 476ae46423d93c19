// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use ini::Ini;
use log::{debug, info, warn};
use rubis_common::settings::{InputLayout, Settings};
use std::path::PathBuf;

/// Locate the rubis config.ini file.
pub fn find_config_path() -> Option<PathBuf> {
    // Windows: %APPDATA%\rubis\config.ini
    if let Ok(appdata) = std::env::var("APPDATA") {
        let path = PathBuf::from(&appdata).join("rubis").join("config.ini");
        if path.exists() {
            return Some(path);
        }
    }

    // Linux: ~/.config/rubis/config.ini
    if let Ok(home) = std::env::var("HOME") {
        let path = PathBuf::from(&home)
            .join(".config")
            .join("rubis")
            .join("config.ini");
        if path.exists() {
            return Some(path);
        }
    }

    // XDG_CONFIG_HOME
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(&xdg).join("rubis").join("config.ini");
        if path.exists() {
            return Some(path);
        }
    }

    None
}

/// Load settings from the config INI, falling back to defaults.
pub fn load_config(path: Option<&PathBuf>) -> Settings {
    let mut settings = Settings::default();

    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                warn!("config file not found: {}", p.display());
                return settings;
            }
            p.clone()
        }
        None => match find_config_path() {
            Some(p) => p,
            None => {
                info!("no config file found, using defaults");
                return settings;
            }
        },
    };

    info!("loading config from: {}", config_path.display());

    let conf = match Ini::load_from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            warn!("failed to parse config: {}", e);
            return settings;
        }
    };

    // [Input]
    if let Some(section) = conf.section(Some("Input")) {
        if let Some(layout) = section.get("layout") {
            settings.input_layout = InputLayout::from_str_or_default(layout);
            debug!("input layout: {:?}", settings.input_layout);
        }
    }

    // [Core]
    if let Some(section) = conf.section(Some("Core")) {
        if let Some(v) = section.get("force_small_memory") {
            settings.force_small_memory = v.trim() == "true" || v.trim() == "1";
        }
    }

    // [Debug]
    if let Some(section) = conf.section(Some("Debug")) {
        if let Some(v) = section.get("verbose_gpu") {
            settings.verbose_gpu = v.trim() == "true" || v.trim() == "1";
        }
    }

    settings
}
