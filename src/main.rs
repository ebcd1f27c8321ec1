use clap::Parser;
use human_panic::setup_panic;
use stormvogel::Cli;

fn main() -> anyhow::Result<()> {
    setup_panic!();
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbosity.log_level_filter())
        .init();
    cli.run()
}
