use clap::*;
use std::io::Write;
use std::path::Path;

use sapling::libs::builder::TreeBuilder;
use sapling::libs::order::{self, AdditionOrder};
use sapling::libs::raxml::RaxmlProcess;
use sapling::libs::sequences::Sequences;
use sapling::libs::tree::newick;

pub fn make_subcommand() -> Command {
    Command::new("place")
        .about("Grow a phylogenetic tree by stepwise sequence insertion")
        .arg(
            Arg::new("file")
                .long("file")
                .short('f')
                .num_args(1)
                .required(true)
                .help("Input FASTA file"),
        )
        .arg(
            Arg::new("ali_threads")
                .long("ali-threads")
                .short('j')
                .num_args(1)
                .value_parser(value_parser!(usize))
                .help("Threads for pairwise score computation; default uses all detected cores"),
        )
        .arg(
            Arg::new("nv_threads")
                .long("nv-threads")
                .short('k')
                .num_args(1)
                .default_value("1")
                .value_parser(value_parser!(usize))
                .help("Threads for ancestral vector updates; accepted but currently single-threaded"),
        )
        .arg(
            Arg::new("load_scores")
                .long("load-scores")
                .short('l')
                .action(ArgAction::SetTrue)
                .help("Reuse a previously computed score matrix (<file>.scores)"),
        )
        .arg(
            Arg::new("outdir")
                .long("outdir")
                .short('o')
                .num_args(1)
                .default_value("SA-place")
                .help("Working directory; also receives the final tree"),
        )
        .after_help(
            r###"
Requires `raxmlHPC` in PATH for the per-iteration ancestral state
reconstruction.

Examples:
  # Place all sequences, 8 scoring threads
  sapling place -f seqs.fa -j 8

  # Reuse the score matrix from an earlier run
  sapling place -f seqs.fa -l

Output:
  <outdir>/sa_tree, <outdir>/sa_ali  per-iteration reconstruction inputs
  <outdir>/final.nwk                 the finished tree
"###,
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    let infile = args.get_one::<String>("file").unwrap();
    let ali_threads = match args.get_one::<usize>("ali_threads") {
        Some(&n) => n,
        None => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    };
    let _nv_threads = *args.get_one::<usize>("nv_threads").unwrap();
    let load_scores = args.get_flag("load_scores");
    let outdir = args.get_one::<String>("outdir").unwrap();

    std::fs::create_dir_all(outdir)?;

    //----------------------------
    // Ops
    //----------------------------
    let mut seqs = Sequences::from_fasta(sapling::reader(infile)?)?;
    eprintln!("{} sequences loaded", seqs.len());

    let scores_path = format!("{}.scores", infile);
    let scores = if load_scores && Path::new(&scores_path).exists() {
        eprintln!("loading scores from {}", scores_path);
        order::read_scores(sapling::reader(&scores_path)?)?
    } else {
        let scores = order::all_pairs_scores(seqs.mapped_seqs(), ali_threads)?;
        let mut writer = sapling::writer(&scores_path)?;
        order::write_scores(&mut writer, &scores)?;
        scores
    };

    let mut order = AdditionOrder::new(&scores)?;
    let recon = RaxmlProcess::locate()?;

    let mut builder = TreeBuilder::new(&mut seqs, &mut order)?;
    while builder.insertion_step(&recon, Path::new(outdir))? {}

    let (tree, root) = builder.tree_and_root();
    let out_tree = format!("{}/final.nwk", outdir);
    let mut writer = sapling::writer(&out_tree)?;
    writeln!(writer, "{}", newick::to_newick(tree, root))?;
    eprintln!("final tree written to {}", out_tree);

    Ok(())
}
