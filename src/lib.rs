//! Foodgram - A recipe sharing backend
//!
//! This library provides the core functionality of the Foodgram backend:
//! recipes with tags and ingredients, favorites, shopping carts, author
//! subscriptions and short links.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
