#[macro_use]
extern crate log;

use structopt::StructOpt;

use feevelocity::{App, Config, Result};

fn main() -> Result<()> {
    Config::dotenv();
    let config = Config::from_args();
    config.setup_logger();

    let app = App::boot(config)?;

    #[cfg(unix)]
    install_shutdown_handler(app.running_handle());

    app.run();

    Ok(())
}

#[cfg(unix)]
fn install_shutdown_handler(running: std::sync::Arc<std::sync::atomic::AtomicBool>) {
    use signal_hook::iterator::Signals;
    use signal_hook::{SIGINT, SIGTERM};
    use std::sync::atomic::Ordering;

    let signals = match Signals::new(&[SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            warn!("failed to install shutdown signal handler: {}", e);
            return;
        }
    };

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            warn!("received shutdown signal, stopping after the current tick");
            running.store(false, Ordering::SeqCst);
        }
    });
}
