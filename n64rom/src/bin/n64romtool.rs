use clap::{Arg, ArgMatches, Command};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;

use n64rom::convert::ConvertStatus;
use n64rom::rom::{Endianness, Rom};
use n64rom::util::{FileSize, MEBIBYTE};

#[derive(Debug, Error)]
enum Error {
    /// Invalid CRC values.
    #[error("Bad CRC values, expected: (0x{0:08X}, 0x{1:08X})")]
    CrcError(u32, u32),
    #[error("{0}")]
    IoError(#[from] io::Error),
    #[error("{0}")]
    RomError(#[from] n64rom::rom::Error),
}

fn main() {
    env_logger::init();

    let matches = Command::new("n64romtool")
        .version("0.2.0")
        .about("Displays information about N64 ROM files")
        .subcommand(
            Command::new("show")
                .about("Show details about a rom file")
                .arg(Arg::new("file").required(true).help("Rom file")),
        )
        .subcommand(
            Command::new("check")
                .about("Verify whether or not the CRC values of a rom file are correct")
                .arg(Arg::new("file").required(true).help("Rom file")),
        )
        .subcommand(
            Command::new("correct")
                .about("Correct the CRC values of a rom file")
                .arg(Arg::new("file").required(true).help("Rom file")),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert a rom file to a different byte order")
                .arg(
                    Arg::new("ext")
                        .short('e')
                        .long("ext")
                        .takes_value(false)
                        .help("Use the conventional file extension for the target byte order"),
                )
                .arg(
                    Arg::new("order")
                        .takes_value(true)
                        .possible_values(["big", "little", "mixed"])
                        .required(true)
                        .help("Byte order to convert to"),
                )
                .arg(Arg::new("input").required(true).help("Input rom file"))
                .arg(Arg::new("output").required(true).help("Output rom file")),
        )
        .get_matches();

    match main_with_args(&matches) {
        Ok(()) => {}
        Err(Error::CrcError(crc1, crc2)) => {
            println!("{}", Error::CrcError(crc1, crc2));
            process::exit(1);
        }
        Err(err) => {
            println!("Error: {}", err);
            process::exit(1);
        }
    }
}

fn load_rom(path: &str) -> Result<Rom, Error> {
    let image = fs::read(Path::new(path))?;
    Ok(Rom::from_vec(image)?)
}

fn main_with_args(matches: &ArgMatches) -> Result<(), Error> {
    match matches.subcommand() {
        Some(("show", matches)) => {
            let path = matches.value_of("file").unwrap();
            let mut rom = load_rom(path)?;
            let order = rom.order();
            rom.normalize()?;

            let filesize = FileSize::from(rom.len() as u64, MEBIBYTE);
            let sizetext = match filesize {
                FileSize::Float(value) => format!("{:.*} MiB", 1, value),
                FileSize::Int(value) => format!("{} MiB", value),
            };

            println!("{}", rom.header()?);
            println!("  Byte Order: {}", order);
            println!("  Rom Size: {}", &sizetext);
            Ok(())
        }
        Some(("check", matches)) => {
            let path = matches.value_of("file").unwrap();
            let mut rom = load_rom(path)?;
            rom.normalize()?;

            let (result, crcs) = rom.check_crc()?;
            if result {
                println!("Correct!");
                Ok(())
            } else {
                Err(Error::CrcError(crcs.0, crcs.1))
            }
        }
        Some(("correct", matches)) => {
            let path = matches.value_of("file").unwrap();
            let mut rom = load_rom(path)?;
            let order = rom.order();
            rom.normalize()?;

            if rom.correct_crc()? {
                println!("Rom CRC values are already correct!");
            } else {
                // Write back in the byte order the file arrived in.
                rom.convert(order)?;
                fs::write(path, rom.image())?;
                println!("Corrected!");
            }
            Ok(())
        }
        Some(("convert", matches)) => {
            let input = matches.value_of("input").unwrap();
            let output = matches.value_of("output").unwrap();
            let order = match matches.value_of("order").unwrap() {
                "big" => Endianness::Big,
                "little" => Endianness::Little,
                "mixed" => Endianness::Mixed,
                _ => unreachable!(),
            };

            let mut rom = load_rom(input)?;
            let result = rom.convert(order)?;

            let mut out_path = PathBuf::from(output);
            if matches.is_present("ext") {
                out_path.set_extension(order.file_ext());
            }
            fs::write(&out_path, rom.image())?;

            if matches!(result, ConvertStatus::AlreadyConverted) {
                println!("Rom file is already in {} byte order.", order);
            } else {
                println!("Done!");
            }
            Ok(())
        }
        None => {
            println!("No subcommand was used");
            Ok(())
        }
        _ => unreachable!(),
    }
}
