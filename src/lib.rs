pub mod args;
pub mod audio;
pub mod avatar;
pub mod compose;
pub mod config;
pub mod news;
pub mod pipeline;
pub mod script;
pub mod subtitle;
pub mod tts;
pub mod utils;
pub mod visuals;
