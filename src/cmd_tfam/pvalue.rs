use clap::*;
use std::io::Write;
use tfam::libs::family::FamilyBuilder;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("pvalue")
        .about("Scores items against the families")
        .after_help(
            r###"
Without changing the state, reports for each item the closest family and the
most significant family.

Output columns:
* item, closest family, its distance, most significant family, its log10 p-value
* With `--all`: item, family, distance, log10 p-value, one line per family

Examples:
1. Best families:
   tfam pvalue state.json tests/items/new.tsv

2. Every family:
   tfam pvalue state.json tests/items/new.tsv --all

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
                .help("Item file. [stdin] for standard input"),
        )
        .arg(
            Arg::new("all")
                .long("all")
                .action(ArgAction::SetTrue)
                .help("One line per item and family"),
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
    let items = tfam::read_items(args.get_one::<String>("infile").unwrap())?;
    let is_all = args.get_flag("all");

    let engine = builder.significance_engine(&items)?;
    let linkage = builder.config().linkage;
    let mut writer = tfam::writer(args.get_one::<String>("outfile").unwrap())?;

    if is_all {
        writer.write_fmt(format_args!("#item\tfamily\tdistance\tlog10_p\n"))?;
        for item in &items {
            for family in builder.families() {
                let d = family.distance_to(item, builder.aligner(), linkage)?;
                let p = family.significance_to(item, builder.aligner(), &engine, linkage)?;
                writer.write_fmt(format_args!("{}\t{}\t{:.4}\t{:.4}\n", item.id, family.id(), d, p))?;
            }
        }
    } else {
        writer.write_fmt(format_args!("#item\tclosest\tdistance\tsignificant\tlog10_p\n"))?;
        for item in &items {
            let closest = builder.closest_family(item)?;
            let significant = builder.most_significant_family(item, &engine)?;
            let (Some((cf, d)), Some((sf, p))) = (closest, significant) else {
                continue;
            };
            writer.write_fmt(format_args!(
                "{}\t{}\t{:.4}\t{}\t{:.4}\n",
                item.id,
                cf.id(),
                d,
                sf.id(),
                p
            ))?;
        }
    }
    writer.flush()?;

    Ok(())
}
