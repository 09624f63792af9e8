//! HTTP request handlers

pub mod features;
pub mod health;
pub mod index;
