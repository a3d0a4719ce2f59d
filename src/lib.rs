//! coursync - keeps course images in step with the served assets directory.
//!
//! - [`asset`]: one-shot synchronization of images into a flat destination
//! - [`watch`]: reacting to image changes during development
//! - [`serve`]: local static server that restarts when assets change
//! - [`html`]: placeholder and code-language rewriting of generated HTML

pub mod asset;
pub mod cli;
pub mod config;
pub mod html;
pub mod serve;
pub mod session;
pub mod utils;
pub mod watch;
