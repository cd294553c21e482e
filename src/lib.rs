pub mod archive;
pub mod cli;
pub mod colors;
pub mod error;
pub mod fetch;
pub mod fs;
pub mod fsutil;
pub mod gate;
pub mod installer;
pub mod manifest;
pub mod options;
pub mod repository;
pub mod resolver;
pub mod tree;
#[cfg(test)]
pub mod tests;

pub use error::{Error, Result};
pub use installer::{InstallReport, Installer};
pub use options::{InstallOptions, Phase};
