extern crate clap;
use clap::*;

mod cmd_sapling;

fn main() -> anyhow::Result<()> {
    let app = Command::new("sapling")
        .version(crate_version!())
        .author(crate_authors!())
        .about("`sapling` - Stepwise insertion of sequences into a phylogenetic tree")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .subcommand(cmd_sapling::place::make_subcommand());

    // Check which subcomamnd the user ran...
    match app.get_matches().subcommand() {
        Some(("place", sub_matches)) => cmd_sapling::place::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
