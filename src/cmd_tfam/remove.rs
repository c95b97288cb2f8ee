use clap::*;
use std::io::BufRead;
use tfam::libs::family::FamilyBuilder;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("remove")
        .about("Removes items from their families")
        .after_help(
            r###"
Removed items leave the distance matrix; every family that lost members is
clustered again from its remaining leaves. Families left empty are dropped.

Examples:
1. Remove two items:
   tfam remove state.json A2 C1 -o state2.json

2. Read the ids from a file, one per line:
   tfam remove state.json --list ids.txt -o state2.json

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
            Arg::new("ids")
                .num_args(0..)
                .index(2)
                .help("Item ids to remove"),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .short('l')
                .num_args(1)
                .help("File with item ids, one per line"),
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

    let mut ids: Vec<String> = args
        .get_many::<String>("ids")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    if let Some(list) = args.get_one::<String>("list") {
        for line in tfam::reader(list)?.lines() {
            let line = line?;
            let id = line.trim();
            if !id.is_empty() && !id.starts_with('#') {
                ids.push(id.to_string());
            }
        }
    }
    if ids.is_empty() {
        anyhow::bail!("No item ids given");
    }

    builder.remove_items_from_families(&ids)?;
    builder.save(args.get_one::<String>("outfile").unwrap())?;

    Ok(())
}
