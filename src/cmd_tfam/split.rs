use clap::*;
use tfam::libs::family::FamilyBuilder;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("split")
        .about("Splits a family below its root")
        .after_help(
            r###"
Cuts the family tree just below the root merge. The largest piece keeps the
family id, the other pieces get fresh ids, which are printed to stderr.

Notes:
* A family with a single member, or whose members are all identical,
  can not be split

Examples:
1. Split family 1:
   tfam split state.json 1 -o state2.json

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
    let mut builder: FamilyBuilder = FamilyBuilder::load(args.get_one::<String>("state").unwrap())?;
    let family = args.get_one::<String>("family").unwrap();

    let new_ids = builder.split_family(family)?;
    eprintln!("{}\t{}", family, new_ids.join(","));

    builder.save(args.get_one::<String>("outfile").unwrap())?;

    Ok(())
}
