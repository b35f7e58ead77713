//! Entry point: argument parsing, configuration, logging, and the
//! core/game lifecycle around the main loop.

mod app;
mod audio;
mod cfg;
mod cli;
mod core;
mod def;
mod dir;
mod err;
mod game;
mod governor;
mod input;
mod logger;
mod pacer;
mod persist;
mod sigsegv;
mod video;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use crate::app::HostContext;
use crate::cli::Cli;
use crate::core::Core;
use crate::err::Exit;
use crate::game::Game;

fn main() -> Exit {
    match run() {
        Ok(()) => Exit::Success,
        Err(err) => Exit::from(err),
    }
}

fn run() -> anyhow::Result<()> {
    let args = Cli::parse();
    logger::init()?;

    fs::create_dir_all(dir::config()).context("creating configuration directory")?;
    fs::create_dir_all(dir::system()).context("creating system directory")?;
    fs::create_dir_all(dir::save()).context("creating save directory")?;

    let config = cfg::Config::load(&dir::config().join(format!("{}.cfg", def::NAME)))?;

    let quit = Arc::new(AtomicBool::new(false));
    let handler_quit = Arc::clone(&quit);
    ctrlc::set_handler(move || handler_quit.store(true, Ordering::Relaxed)).context("installing Ctrl-C handler")?;

    let mut host_ctx = HostContext::new(config, def::DEVICE_WIDTH, def::DEVICE_HEIGHT).context("opening the display window")?;

    // `core` must drop before `host_ctx`: its `Drop` unregisters the raw
    // pointer installed in `core::callbacks` (see `Core::load`), and that
    // must happen before the `HostContext` it points at goes away.
    let mut core = Core::load(&args.core, &mut host_ctx).with_context(|| format!("loading core {}", args.core.display()))?;

    core.load_game(Some(&args.game), None)
        .with_context(|| format!("loading game {}", args.game.display()))?;

    let game = Game::open(args.game.clone(), None, None, None);
    let title = game.name().to_string();
    host_ctx.set_game(game);

    host_ctx.restore_on_load(&mut core, &title);
    host_ctx.run(&mut core, &quit)?;
    host_ctx.persist_on_close(&mut core, &title);

    core.unload_game();
    Ok(())
}
