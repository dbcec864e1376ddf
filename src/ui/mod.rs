//! # User Interface Module
//!
//! The web front end: `routes` holds the Actix handlers and server setup,
//! `render` builds the HTML fragments they return. The page itself is the
//! static `index.html` next to this file.

pub mod render;
pub mod routes;
