#[macro_use]
extern crate log;

use anyhow::{bail, Result};
use std::{env, process, time::Instant};

fn main() {
  cg_nbt::init("cli");
  if let Err(e) = run() {
    error!("error: {e}");
    process::exit(1);
  }
}

fn run() -> Result<()> {
  let mut args = env::args();
  args.next(); // current process
  let path = match args.next() {
    Some(p) => p,
    None => bail!("usage: cg_cli <file.cgb>"),
  };

  let info = cg_nbt::file_info(&path)?;
  info!(
    "{path}: {} bytes on disk, {}",
    info.file_size,
    if info.compressed { "zstd frame" } else { "plain" }
  );

  let start = Instant::now();
  match cg_nbt::read(&path) {
    Ok(map) => {
      info!("parse took {:?}", start.elapsed());
      println!("{}", cg_nbt::serialize(&map));
    }
    Err(e) => {
      error!("parse failed: {e}");
      for line in cg_nbt::get_errors() {
        error!("  {line}");
      }
      process::exit(1);
    }
  }
  Ok(())
}
