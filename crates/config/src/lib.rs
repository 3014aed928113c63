// Configuration - settings for the slate CLI

pub mod settings;

pub use settings::Settings;
