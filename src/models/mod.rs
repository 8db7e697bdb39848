// src/models/mod.rs
pub mod auth;
pub mod calendar;
pub mod chat;
pub mod settings;
