pub mod prompt;
pub mod settings;

pub use settings::{ ConfigError, Settings };
