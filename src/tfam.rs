extern crate clap;
use clap::*;
use simplelog::{LevelFilter, TermLogger, TerminalMode};

mod cmd_tfam;

fn main() -> anyhow::Result<()> {
    let app = Command::new("tfam")
        .version(crate_version!())
        .author(crate_authors!())
        .about("`tfam` - Effector family builder")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .global(true)
                .num_args(1)
                .default_value("warn")
                .value_parser(["off", "error", "warn", "info", "debug", "trace"])
                .help("Logging verbosity, written to stderr"),
        )
        .subcommand(cmd_tfam::build::make_subcommand())
        .subcommand(cmd_tfam::assign::make_subcommand())
        .subcommand(cmd_tfam::remove::make_subcommand())
        .subcommand(cmd_tfam::split::make_subcommand())
        .subcommand(cmd_tfam::show::make_subcommand())
        .subcommand(cmd_tfam::related::make_subcommand())
        .subcommand(cmd_tfam::meta::make_subcommand())
        .subcommand(cmd_tfam::pvalue::make_subcommand())
        .after_help(
            r###"Subcommand groups:

* Building:
    * build  - Align items, cluster and cut into families
    * assign - Place new items into existing or new families
    * remove - Drop items from their families
    * split  - Cut a family just below its root

* Reporting:
    * show    - Family summaries, induced alignments and trees
    * related - Significant member pairs across families
    * meta    - Cluster the families themselves
    * pvalue  - Significance of items against the families

State files are JSON, written by `build` and updated by the other
building commands.

"###,
        );

    let matches = app.get_matches();

    let level: LevelFilter = matches
        .get_one::<String>("log_level")
        .unwrap()
        .parse()?;
    TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    match matches.subcommand() {
        Some(("build", sub_matches)) => cmd_tfam::build::execute(sub_matches),
        Some(("assign", sub_matches)) => cmd_tfam::assign::execute(sub_matches),
        Some(("remove", sub_matches)) => cmd_tfam::remove::execute(sub_matches),
        Some(("split", sub_matches)) => cmd_tfam::split::execute(sub_matches),
        Some(("show", sub_matches)) => cmd_tfam::show::execute(sub_matches),
        Some(("related", sub_matches)) => cmd_tfam::related::execute(sub_matches),
        Some(("meta", sub_matches)) => cmd_tfam::meta::execute(sub_matches),
        Some(("pvalue", sub_matches)) => cmd_tfam::pvalue::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
