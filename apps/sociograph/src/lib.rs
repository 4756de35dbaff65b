//! # Sociograph Application Library
//!
//! Front ends over one `sociograph_core::Session`:
//!
//! - [`command`]: the line-oriented command language shared by every front end
//! - [`cli`]: one-shot commands, the interactive session and scripts
//! - [`api`]: the HTTP session server
//! - [`config`]: `sociograph.toml`, environment and flag resolution

pub mod api;
pub mod cli;
pub mod command;
pub mod config;
