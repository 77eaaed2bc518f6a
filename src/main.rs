fn main() {
    use clap::Parser;
    use std::error::Error;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let args = articlepub::cli::Args::parse();

    let filter = if args.verbose {
        "articlepub=debug"
    } else if args.quiet {
        "articlepub=error"
    } else {
        "articlepub=warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let api_key = std::env::var(articlepub::cli::API_KEY_ENV).ok();
    if let Err(e) = articlepub::cli::run(&args, api_key) {
        eprintln!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
