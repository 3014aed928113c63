// Application settings
// Loaded from ~/.config/slate/settings.json

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Separator between function arguments in formula source.
    /// Must be a single character; ';' if not.
    #[serde(rename = "formula.argumentSeparator")]
    pub argument_separator: String,

    /// Localized function spellings accepted in addition to
    /// SUM/MIN/MAX/AVERAGE, mapped to their canonical names.
    #[serde(rename = "formula.localizedNames")]
    pub localized_names: HashMap<String, String>,

    /// Where the interactive menu saves when no path was given.
    #[serde(rename = "file.defaultPath")]
    pub default_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        let mut localized_names = HashMap::new();
        // Spellings the legacy .s2v files use.
        localized_names.insert("SUMA".to_string(), "SUM".to_string());
        localized_names.insert("PROMEDIO".to_string(), "AVERAGE".to_string());
        Self {
            argument_separator: ";".to_string(),
            localized_names,
            default_path: "spreadsheet.s2v".to_string(),
        }
    }
}

impl Settings {
    /// Path to the settings file: ~/.config/slate/settings.json
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("slate").join("settings.json")
    }

    /// Load settings from disk, falling back to defaults on any problem.
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(contents) => {
                // Strip comments (lines starting with //)
                let cleaned: String = contents
                    .lines()
                    .filter(|line| !line.trim().starts_with("//"))
                    .collect::<Vec<_>>()
                    .join("\n");

                match serde_json::from_str(&cleaned) {
                    Ok(settings) => settings,
                    Err(e) => {
                        eprintln!("Error parsing settings.json: {}", e);
                        eprintln!("Using default settings");
                        Self::default()
                    }
                }
            }
            Err(e) => {
                eprintln!("Error reading settings.json: {}", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(&path, json).map_err(|e| e.to_string())
    }

    /// The argument separator as a char; ';' when the setting is not a
    /// single character.
    pub fn separator_char(&self) -> char {
        let mut chars = self.argument_separator.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => ';',
        }
    }
}
