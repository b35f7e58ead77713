//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, ValueHint};

use crate::def::NAME;

/// Run a libretro core against a game file.
#[derive(Debug, Parser)]
#[clap(name = NAME, author, version, about)]
pub struct Cli {
    /// Path to the core library (a `.so`/`.dylib`/`.dll`).
    #[clap(value_hint = ValueHint::FilePath)]
    pub core: PathBuf,

    /// Path to the game file.
    #[clap(value_hint = ValueHint::FilePath)]
    pub game: PathBuf,
}
