use clap::*;
use tfam::libs::clust::Linkage;
use tfam::libs::config::BuilderConfig;
use tfam::libs::family::FamilyBuilder;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("build")
        .about("Builds families from items")
        .after_help(
            r###"
Aligns every pair of items, clusters them hierarchically and cuts the
dendrogram into families. The whole state is written as JSON.

Input format:
* One item per line: id<TAB>symbols[<TAB>strain]
* Symbols are separated by dashes, e.g. NI-HD-NG-NN
* Lines starting with '#' are ignored

Notes:
* Parameters come from `--config` (TOML); command line options override them
* Supports both plain text and gzipped (.gz) files

Examples:
1. Build with default parameters:
   tfam build tests/items/pool.tsv -o state.json

2. Single linkage, cut at 0.5:
   tfam build tests/items/scenario.tsv --linkage single --cut 0.5

3. Parameters from a file:
   tfam build tests/items/pool.tsv -c tests/items/mismatch.toml

"###,
        )
        .arg(
            Arg::new("infile")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Item file. [stdin] for standard input"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .num_args(1)
                .help("TOML file with builder parameters"),
        )
        .arg(
            Arg::new("linkage")
                .long("linkage")
                .num_args(1)
                .value_parser(["single", "complete", "average", "upgma"])
                .help("Linkage method"),
        )
        .arg(
            Arg::new("cut")
                .long("cut")
                .num_args(1)
                .value_parser(value_parser!(f64))
                .help("Dendrogram cut height"),
        )
        .arg(
            Arg::new("align_type")
                .long("align-type")
                .num_args(1)
                .value_parser(["global", "semi-global"])
                .help("Alignment type"),
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

/// Parameters from `--config`, then the command line overrides.
pub fn load_config(args: &ArgMatches) -> anyhow::Result<BuilderConfig> {
    let mut config = match args.get_one::<String>("config") {
        Some(path) => BuilderConfig::from_file(path)?,
        None => BuilderConfig::default(),
    };
    if let Some(linkage) = args.get_one::<String>("linkage") {
        config.linkage = linkage.parse::<Linkage>()?;
    }
    if let Some(cut) = args.get_one::<f64>("cut") {
        config.cut = *cut;
    }
    if let Some(align_type) = args.get_one::<String>("align_type") {
        config.alignment_type = align_type.parse()?;
    }
    config.validate()?;
    Ok(config)
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let opt_parallel = *args.get_one::<usize>("parallel").unwrap();
    rayon::ThreadPoolBuilder::new()
        .num_threads(opt_parallel)
        .build_global()?;

    let config = load_config(args)?;
    let items = tfam::read_items(args.get_one::<String>("infile").unwrap())?;

    let builder = FamilyBuilder::build(config, items)?;
    builder.save(args.get_one::<String>("outfile").unwrap())?;

    Ok(())
}
