mod fetch;
mod model;
mod query;
mod serve;
mod twitter;

use crate::fetch::{FetchSettings, RetryBudget, SessionPool};
use crate::serve::AppState;
use crate::twitter::web::WebClientFactory;
use crate::twitter::Authentication;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(version)]
struct Args {
    /// Path to the authentication details file (username, email and password)
    #[clap(short, long, env = "TWEET_FETCHER_AUTH", default_value = "./auth.json")]
    auth: PathBuf,
    /// Address to listen on
    #[clap(short, long, default_value = "0.0.0.0:5000")]
    socket: SocketAddr,
    /// Number of searches allowed to run against the account at once
    #[clap(long, default_value_t = 1)]
    sessions: usize,
    /// Give up on a search after this many consecutive failed requests
    #[clap(long)]
    max_attempts: Option<u32>,
    /// Give up on a search once it has been retrying for this many seconds
    #[clap(long)]
    max_elapsed: Option<u64>,
}

#[actix_rt::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = main2().await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn main2() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    let auth = Authentication::load(&args.auth).await?;
    log::info!("Loaded credentials for {}", auth.username);

    let settings = FetchSettings {
        retry: RetryBudget {
            max_attempts: args.max_attempts,
            max_elapsed: args.max_elapsed.map(Duration::from_secs),
        },
        ..FetchSettings::default()
    };
    let pool = SessionPool::new(args.sessions);
    log::info!("Allowing {} concurrent search session(s)", pool.size());
    let state = AppState {
        auth,
        pool,
        settings,
        clients: Arc::new(WebClientFactory::default()),
    };
    serve::serve(args.socket, state).await
}
