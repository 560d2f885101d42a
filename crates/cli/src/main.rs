use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use clap::Parser;
use deskproxy::backend::BackendRegistry;
use deskproxy::daemon::Daemon;

#[derive(Parser)]
#[command(
    name = "deskproxy-server",
    about = "Standalone daemon exposing a deskproxy session over a bare TCP listener"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:4822")]
    bind: String,

    /// Protocol back-end to load onto the session
    #[arg(long, short, default_value = "echo")]
    protocol: String,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let registry = BackendRegistry::with_builtins();

    let daemon = match Daemon::bind(&args.bind, &args.protocol, &registry) {
        Ok(daemon) => Arc::new(daemon),
        Err(e) => {
            eprintln!("failed to bind daemon: {e}");
            return;
        }
    };

    let running = daemon.stop_handle();
    let worker = {
        let daemon = daemon.clone();
        std::thread::spawn(move || daemon.run())
    };

    println!(
        "deskproxy daemon on {} (protocol={}, session={}) — press Enter to stop",
        args.bind,
        args.protocol,
        daemon.session().id()
    );
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    running.store(false, Ordering::SeqCst);
    daemon.session().stop();
    let _ = worker.join();
}
