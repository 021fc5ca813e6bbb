//! mail-cluster — fetch emails by subject and group them into topics.

pub mod cluster;
pub mod config;
pub mod error;
pub mod mail;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod web;
