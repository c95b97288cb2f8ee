use clap::*;
use std::io::Write;
use tfam::libs::family::{AssignmentReport, FamilyBuilder};

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("assign")
        .about("Assigns new items to families")
        .after_help(
            r###"
Each new item joins the family closest to it when that distance is below
the cut height; the remaining items are clustered into new families.

Output columns:
* item, family, status (joined / new / skipped), distance to the closest
  existing family, log10 p-value against its family, related families

Notes:
* Items with fewer than `min_symbols` symbols are skipped
* The updated state is written only with `--state`

Examples:
1. Report assignments:
   tfam assign state.json tests/items/new.tsv

2. Keep the updated families:
   tfam assign state.json tests/items/new.tsv --state state2.json

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
            Arg::new("infile")
                .required(true)
                .num_args(1)
                .index(2)
                .help("Item file with the new items. [stdin] for standard input"),
        )
        .arg(
            Arg::new("state_out")
                .long("state")
                .short('s')
                .num_args(1)
                .help("Write the updated state to this file"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .short('p')
                .num_args(1)
                .default_value("1")
                .value_parser(value_parser!(usize))
                .help("Number of threads for parallel processing"),
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
    let opt_parallel = *args.get_one::<usize>("parallel").unwrap();
    rayon::ThreadPoolBuilder::new()
        .num_threads(opt_parallel)
        .build_global()?;

    let mut builder: FamilyBuilder = FamilyBuilder::load(args.get_one::<String>("state").unwrap())?;
    let items = tfam::read_items(args.get_one::<String>("infile").unwrap())?;

    let engine = builder.significance_engine(&items)?;
    let reports = builder.assign_items(items, &engine)?;

    let mut writer = tfam::writer(args.get_one::<String>("outfile").unwrap())?;
    writer.write_fmt(format_args!("{}\n", AssignmentReport::header()))?;
    for report in &reports {
        writer.write_fmt(format_args!("{}\n", report.to_tsv()))?;
    }
    writer.flush()?;

    if let Some(path) = args.get_one::<String>("state_out") {
        builder.save(path)?;
    }

    Ok(())
}
