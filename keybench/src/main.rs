//! Load generator for storage backends.
//!
//! See [`keybench::cli`] for the available commands.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    keybench::cli::execute()
}
