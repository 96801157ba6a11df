use anyhow::{Context, Result};
use clap::{Arg, Command};
use std::fs;
use std::path::Path;

use z64patch::patch::Patch;
use z64patch::rom::Rom;
use z64patch::{compress, decompress};

fn load_rom(path: &str) -> Result<Rom> {
    let image = fs::read(Path::new(path)).with_context(|| format!("Reading {}", path))?;
    Ok(Rom::read(image)?)
}

fn parse_exclusions(raw: Option<&str>) -> Result<Vec<i32>> {
    match raw {
        Some(raw) => raw
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<i32>()
                    .with_context(|| format!("Bad exclusion index: {:?}", part))
            })
            .collect(),
        None => Ok(Vec::new()),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("z64tool")
        .version("0.1.0")
        .about("Decompress, patch and recompress Zelda64 ROM files")
        .subcommand(
            Command::new("decompress")
                .visible_alias("d")
                .about("Decompress a Zelda64 rom file into a 64 MiB image")
                .arg(Arg::new("input").required(true).help("Input rom file"))
                .arg(Arg::new("output").required(true).help("Output rom file")),
        )
        .subcommand(
            Command::new("compress")
                .visible_alias("c")
                .about("Recompress a decompressed rom file into a 32 MiB image")
                .arg(
                    Arg::new("exclude")
                        .short('x')
                        .long("exclude")
                        .takes_value(true)
                        .help("Comma-separated entry indices to keep raw (negative erases the file)"),
                )
                .arg(Arg::new("input").required(true).help("Input rom file"))
                .arg(Arg::new("output").required(true).help("Output rom file")),
        )
        .subcommand(
            Command::new("patch")
                .visible_alias("p")
                .about("Apply a ZPFv1 patch to a decompressed rom file")
                .arg(Arg::new("patch").required(true).help("ZPF patch file"))
                .arg(Arg::new("input").required(true).help("Input rom file"))
                .arg(Arg::new("output").required(true).help("Output rom file")),
        )
        .subcommand(
            Command::new("show")
                .about("Show the DMA table of a rom file")
                .arg(Arg::new("file").required(true).help("Zelda64 rom file")),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("decompress", matches)) => {
            let rom = load_rom(matches.value_of("input").unwrap())?;
            let result = decompress::decompress(&rom)?;
            result.rom.verify_non_overlapping()?;

            let out_path = matches.value_of("output").unwrap();
            fs::write(out_path, result.rom.image())?;

            let list: Vec<String> = result.exclusions.iter().map(|e| e.to_string()).collect();
            println!("Wrote {:08X} bytes.", result.rom.image().len());
            println!("Raw entries (pass to compress --exclude): {}", list.join(","));
        }
        Some(("compress", matches)) => {
            let rom = load_rom(matches.value_of("input").unwrap())?;
            let exclusions = parse_exclusions(matches.value_of("exclude"))?;

            let packed = compress::compress_with(&rom, &exclusions, |index, count| {
                if index % 100 == 0 {
                    println!("  {}/{}", index, count);
                }
                true
            })?;
            packed.verify_non_overlapping()?;

            let out_path = matches.value_of("output").unwrap();
            fs::write(out_path, packed.image())?;
            println!("Wrote {:08X} bytes.", packed.image().len());
        }
        Some(("patch", matches)) => {
            let bytes = fs::read(matches.value_of("patch").unwrap())?;
            let patch = Patch::read(&bytes)?;
            let rom = load_rom(matches.value_of("input").unwrap())?;

            let patched = patch.apply(&rom)?;
            let out_path = matches.value_of("output").unwrap();
            fs::write(out_path, patched.image())?;
            println!("Wrote {:08X} bytes.", patched.image().len());
        }
        Some(("show", matches)) => {
            let rom = load_rom(matches.value_of("file").unwrap())?;
            println!("{}", rom.table);
            for index in 0..rom.table.count {
                let entry = rom.entry(index)?;
                if entry.is_terminator() {
                    break;
                }
                println!("  {:4}  {}", index, entry);
            }
        }
        None => {
            println!("No subcommand was used");
        }
        _ => unreachable!(),
    }

    Ok(())
}
