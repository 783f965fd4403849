pub mod command;
pub mod config;
pub mod controller;
pub mod equalizer;
pub mod events;
pub mod focus;
pub mod local_render;
pub mod persistence;
pub mod queue;
pub mod render;
pub mod session;
