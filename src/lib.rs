//! Detects faces in uploaded images, matches them against a face
//! collection, records the outcome and notifies operators.

pub mod app;
pub mod client;
pub mod conf;
pub mod detect;
pub mod event;
pub mod model;
pub mod notify;
pub mod outcome;
pub mod store;
