//! Per-screen data providers.
//!
//! Each module composes the backend client with the cached-query layer
//! for one screen's data: the plain async fetchers are testable on
//! their own, and the `*_query` constructors wire them to the durable
//! slot the screen reads through.

pub mod auth;
pub mod game;
pub mod lessons;
pub mod market;
pub mod prefs;
pub mod quests;
pub mod rewards;
