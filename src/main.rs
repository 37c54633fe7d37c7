mod api;
mod app;
mod audio;
mod controller;
mod error;
mod identity;
mod notify;
mod rewrite;
mod session;
mod speech;
mod storage;
mod sync;
mod ui;
mod utils;

#[cfg(test)]
mod test_support;

use crate::error::StartupError;
use std::rc::Rc;

async fn start() -> Result<(), StartupError> {
    let config = crate::app::Config::load()?;
    let controller = crate::app::build(&config).await?;
    crate::ui::console::run(Rc::new(controller)).await?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let local = tokio::task::LocalSet::new();
    if let Err(e) = crate::utils::RUNTIME.block_on(local.run_until(start())) {
        log::error!("{}", e);
        eprintln!("Startup failed: {}", e);
        std::process::exit(1);
    }
}
