//! H5P Translator - translate the text of H5P packages
//!
//! Opens an .h5p archive, selects the translatable strings in
//! `content/content.json`, sends them through a neural translation model while
//! keeping their HTML intact, and writes a new package.

pub mod cli;
pub mod config;
pub mod error;
pub mod h5p;
pub mod language;
pub mod report;
pub mod text;
pub mod translate;
pub mod workflow;
