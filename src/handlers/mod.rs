// src/handlers/mod.rs

pub mod activity;
pub mod admin;
pub mod auth;
pub mod board;
pub mod ingredient;
pub mod profile;
pub mod recipe;
pub mod report;
