use clap::*;
use itertools::Itertools;
use std::io::Write;
use tfam::libs::family::{Family, FamilyBuilder};

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("show")
        .about("Shows families")
        .after_help(
            r###"
Without `--family` or `--detail`, prints one line per family:
family id, size, root distance and members in leaf order.

With `--new`, prints the members placed by the latest `tfam assign`,
one `family\titem` line each.

Detailed reports contain:
* A header with size, root distance and, with `--pvalue`, the family log10 p-value
* The induced multiple alignment of the members
* The family tree in Newick format
* Every pairwise alignment cost (and its log10 p-value with `--pvalue`)

Examples:
1. Family table:
   tfam show state.json

2. Report for families 1 and 3 with p-values:
   tfam show state.json --family 1 --family 3 --pvalue

3. Items added by the last assignment:
   tfam show state.json --new

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
                .long("family")
                .short('f')
                .num_args(1)
                .action(ArgAction::Append)
                .help("Report on this family; can be repeated"),
        )
        .arg(
            Arg::new("detail")
                .long("detail")
                .action(ArgAction::SetTrue)
                .help("Detailed reports for all families"),
        )
        .arg(
            Arg::new("new")
                .long("new")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["family", "detail"])
                .help("List members added by the latest assignment"),
        )
        .arg(
            Arg::new("pvalue")
                .long("pvalue")
                .action(ArgAction::SetTrue)
                .help("Add alignment p-values"),
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
    let mut writer = tfam::writer(args.get_one::<String>("outfile").unwrap())?;

    if args.get_flag("new") {
        writer.write_fmt(format_args!("#family\titem\n"))?;
        for family in builder.families() {
            for member in family.new_members() {
                writer.write_fmt(format_args!("{}\t{}\n", family.id(), member.id))?;
            }
        }
        writer.flush()?;
        return Ok(());
    }

    let selected: Vec<&Family> = match args.get_many::<String>("family") {
        Some(ids) => ids
            .map(|id| builder.family(id))
            .collect::<Result<Vec<_>, _>>()?,
        None if args.get_flag("detail") => builder.families().iter().collect(),
        None => {
            writer.write_fmt(format_args!("#family\tsize\tdistance\tmembers\n"))?;
            for family in builder.families() {
                writer.write_fmt(format_args!(
                    "{}\t{}\t{}\t{}\n",
                    family.id(),
                    family.size(),
                    family.distance(),
                    family.members().iter().map(|m| &m.id).join(",")
                ))?;
            }
            writer.flush()?;
            return Ok(());
        }
    };

    let engine = if args.get_flag("pvalue") {
        Some(builder.significance_engine(&[])?)
    } else {
        None
    };

    for family in selected {
        let report = family.report(builder.aligner(), engine.as_ref())?;
        writer.write_all(report.as_bytes())?;
    }
    writer.flush()?;

    Ok(())
}
