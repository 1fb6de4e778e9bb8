pub mod cache;
pub mod data;
pub mod gate;
pub mod hook;
pub mod hotkey;
pub mod keys;
pub mod logging;
pub mod settings;
pub mod synthesis;
pub mod zorder;
