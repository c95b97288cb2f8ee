use clap::*;
use std::io::Write;
use tfam::libs::family::{FamilyBuilder, RelatedPair};

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("related")
        .about("Lists significant pairs across families")
        .after_help(
            r###"
For every member of the family, aligns it against the members of all other
families and keeps the pairs whose p-value is below the configured level.

Output columns: member, other family, other member, cost, log10 p-value.
Most significant pairs first.

Examples:
1. Families related to family 1:
   tfam related state.json 1

2. A stricter level:
   tfam related state.json 1 --pvalue 0.001

"###,
        )
        .arg(
            Arg::new("state")
                .required(true)
                .num_args(1)
                .index(1)
                .help("State file written by `tfam build`"),
        )
        .arg(
            Arg::new("family")
                .required(true)
                .num_args(1)
                .index(2)
                .help("Family id"),
        )
        .arg(
            Arg::new("pvalue")
                .long("pvalue")
                .num_args(1)
                .value_parser(value_parser!(f64))
                .help("Significance level, overrides the stored one"),
        )
        .arg(
            Arg::new("outfile")
                .long("outfile")
                .short('o')
                .num_args(1)
                .default_value("stdout")
                .help("Output filename. [stdout] for screen"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let builder: FamilyBuilder = FamilyBuilder::load(args.get_one::<String>("state").unwrap())?;
    let family = args.get_one::<String>("family").unwrap();
    let level = args
        .get_one::<f64>("pvalue")
        .copied()
        .unwrap_or(builder.config().pvalue);
    if !(level > 0.0 && level <= 1.0) {
        anyhow::bail!("--pvalue must be in (0, 1], got {}", level);
    }

    let engine = builder.significance_engine(&[])?;
    let cutoff = level.log10();
    let pairs = builder.related_families_at(family, &engine, cutoff)?;

    let mut writer = tfam::writer(args.get_one::<String>("outfile").unwrap())?;
    writer.write_fmt(format_args!("{}\n", RelatedPair::header()))?;
    for pair in &pairs {
        writer.write_fmt(format_args!("{}\n", pair.to_tsv()))?;
    }
    writer.flush()?;

    Ok(())
}
