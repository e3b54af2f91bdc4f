mod actions;
mod cli;
mod config;
mod contact;
mod input;
mod ipc;
mod logging;
mod swipe;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
