pub mod autobone;
pub mod config;
pub mod pose;
pub mod settings;
pub mod skeleton;
pub mod tracker;
