use reactord::handlers::{Echo, Health};
use reactord::router::EntrySpec;
use reactord::{Config, Server};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

fn main() {
    let config = Config::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let entries = vec![
        EntrySpec {
            prefix: b"/health".to_vec(),
            handler: Box::new(Health),
            args: Vec::new(),
        },
        EntrySpec {
            prefix: b"/echo".to_vec(),
            handler: Box::new(Echo),
            args: Vec::new(),
        },
    ];

    let mut server = match Server::bootstrap(config, entries) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "bootstrap failed");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
