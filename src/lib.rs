#![forbid(unsafe_code)]

pub mod build;
pub mod cli;
pub mod config;
pub mod convert;
pub mod docsify;
pub mod extract;
pub mod formats;
pub mod images;
pub mod labels;
pub mod logging;
pub mod sanitize;
pub mod schema;
pub mod slug;
pub mod source;
pub mod store;
