use clap::*;
use std::io::Write;
use tfam::libs::family::FamilyBuilder;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("meta")
        .about("Clusters the families")
        .after_help(
            r###"
Joins the family trees by the configured linkage over item distances and
prints the resulting tree with one leaf per family, in Newick format.

Examples:
1. Family tree:
   tfam meta state.json

2. Indented output:
   tfam meta state.json --indent "  "

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
            Arg::new("indent")
                .long("indent")
                .num_args(1)
                .default_value("")
                .help("Indentation text; empty for a single line"),
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
    let indent = args.get_one::<String>("indent").unwrap();

    let tree = builder.cluster_families()?;
    let newick = tree.to_newick_with_format(|f| f.id().to_string(), indent);

    let mut writer = tfam::writer(args.get_one::<String>("outfile").unwrap())?;
    writer.write_all((newick + "\n").as_ref())?;
    writer.flush()?;

    Ok(())
}
