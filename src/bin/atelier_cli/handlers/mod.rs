#![deny(clippy::all, clippy::pedantic)]

pub mod categories;
pub mod follow;
pub mod journals;
pub mod posts;
pub mod projects;
pub mod settings;
