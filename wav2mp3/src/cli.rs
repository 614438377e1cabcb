use std::path::PathBuf;

use clap::{builder::ValueParser, value_parser, Arg, ArgAction, Command};
use wav2mp3_core::encoder::SUPPORTED_BITRATES;

// Must agree with `wav2mp3_core::encoder::{DEFAULT_QUALITY, DEFAULT_BITRATE_KBPS}`.
const DEFAULT_QUALITY_ARG: &str = "3";
const DEFAULT_BITRATE_ARG: &str = "192";

/// Parse a constant bitrate such as `192`, `192k` or `192kbps`.
///
/// Only the bitrates LAME offers for constant-bitrate encoding are accepted.
pub fn parse_bitrate(value: &str) -> Result<u32, String> {
    let input = value.trim();
    let digits = input
        .strip_suffix("kbps")
        .or_else(|| input.strip_suffix('k'))
        .unwrap_or(input);

    let kbps = digits
        .parse::<u32>()
        .map_err(|_| format!("invalid bitrate '{value}'"))?;

    if !SUPPORTED_BITRATES.contains(&kbps) {
        let supported: Vec<String> = SUPPORTED_BITRATES.iter().map(u32::to_string).collect();
        return Err(format!(
            "unsupported bitrate {kbps} kbps (expected one of {})",
            supported.join(", ")
        ));
    }

    Ok(kbps)
}

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .about("Encode all WAV files in a directory to MP3")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("quality")
                .short('q')
                .long("quality")
                .value_name("0-9")
                .help("LAME algorithm quality, 0 is best and slowest")
                .default_value(DEFAULT_QUALITY_ARG)
                .value_parser(value_parser!(u8).range(0..=9)),
        )
        .arg(
            Arg::new("bitrate")
                .short('b')
                .long("bitrate")
                .value_name("KBPS")
                .help("Constant bitrate of the MP3 output (e.g. 128, 192k)")
                .default_value(DEFAULT_BITRATE_ARG)
                .value_parser(ValueParser::new(parse_bitrate)),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("List the files that would be encoded without writing anything")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("input_dir")
                .value_name("PATH_NAME")
                .help("Directory whose WAV files are encoded to MP3")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wav2mp3_core::encoder::{DEFAULT_BITRATE_KBPS, DEFAULT_QUALITY};

    #[test]
    fn parse_bitrate_accepts_suffixes() {
        assert_eq!(parse_bitrate("192").unwrap(), 192);
        assert_eq!(parse_bitrate("128k").unwrap(), 128);
        assert_eq!(parse_bitrate(" 320kbps ").unwrap(), 320);
    }

    #[test]
    fn parse_bitrate_rejects_unsupported_rates() {
        let err = parse_bitrate("100").unwrap_err();
        assert!(err.contains("unsupported bitrate 100"));
    }

    #[test]
    fn parse_bitrate_rejects_garbage() {
        assert!(parse_bitrate("fast").is_err());
        assert!(parse_bitrate("").is_err());
        assert!(parse_bitrate("-128").is_err());
    }

    #[test]
    fn cli_requires_an_input_directory() {
        assert!(build_cli().try_get_matches_from(["wav2mp3"]).is_err());
    }

    #[test]
    fn cli_applies_defaults() {
        let matches = build_cli()
            .try_get_matches_from(["wav2mp3", "music"])
            .unwrap();
        assert_eq!(
            matches.get_one::<u8>("quality").copied(),
            Some(DEFAULT_QUALITY)
        );
        assert_eq!(
            matches.get_one::<u32>("bitrate").copied(),
            Some(DEFAULT_BITRATE_KBPS)
        );
        assert!(!matches.get_flag("dry-run"));
    }

    #[test]
    fn cli_rejects_quality_out_of_range() {
        assert!(build_cli()
            .try_get_matches_from(["wav2mp3", "-q", "10", "music"])
            .is_err());
    }
}
