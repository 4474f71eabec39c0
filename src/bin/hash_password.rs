//! Reads one password from stdin and prints the reference to store in the
//! credential table, e.g. `echo -n 's3cret' | hash_password`.

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use projectmap_lib::auth::password::hash_from_input;

fn main() -> Result<()> {
    projectmap_lib::init_logging();

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;

    println!("{}", hash_from_input(&line)?);
    Ok(())
}
