use anyhow::{bail, Context, Result};
use clap::{ArgAction, CommandFactory, Parser};
use env_logger::Env;
use fix_mate_cigar::{run, Config};

/// Remove the MC (mate CIGAR) tag from BAM records whose mate is unmapped.
#[derive(Parser, Debug)]
#[command(name = "fix_mate_cigar", version, args_override_self = true)]
struct Args {
    /// Input BAM file, or '-' for standard input
    #[arg(short = 'i', value_name = "BAM")]
    input: Option<String>,

    /// Output BAM file, or '-' for standard output
    #[arg(short = 'o', value_name = "BAM")]
    output: Option<String>,

    /// BGZF compression level, 0-9 [default: 6]. Invalid values are ignored.
    #[arg(
        short = 'c',
        value_name = "LEVEL",
        action = ArgAction::Append,
        allow_hyphen_values = true
    )]
    compression_level: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if std::env::args_os().len() <= 1 {
        eprint!("{}", Args::command().render_help());
        return Ok(());
    }
    let args = Args::parse();

    let Some(input) = args.input else {
        bail!("Input BAM not specified");
    };
    let Some(output) = args.output else {
        bail!("Output BAM not specified");
    };

    let mut config = Config::new(&input, &output);
    for level in &args.compression_level {
        config.set_compression_level(level);
    }

    run(&config).with_context(|| format!("Failed to fix mate CIGAR tags in {input}"))?;
    Ok(())
}
