use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use cybr_credentials::{
    sso::HttpSsoClient, CredentialsCache, CredentialsProvider, SsoCredentialsProvider, SsoOptions,
};
use tokio::time;

#[derive(Debug, Parser)]
struct Opts {
    /// The base URL of the SSO service
    #[arg(short, long, env = "CYBR_SSO_URL")]
    sso_url: reqwest::Url,

    /// The start URL used when logging in
    #[arg(long, env = "CYBR_SSO_START_URL")]
    start_url: Option<String>,

    /// The user name to request credentials for
    #[arg(short, long, env = "CYBR_USER_NAME")]
    user_name: Option<String>,

    /// An explicit cached token file, overriding the start URL
    #[arg(short = 'f', long, env = "CYBR_SSO_CACHED_TOKEN_FILE")]
    cached_token_file: Option<PathBuf>,

    /// How often to ask for credentials, in seconds
    #[arg(short, long, default_value_t = 5)]
    interval: u64,

    /// Number of concurrent callers per tick
    #[arg(short, long, default_value_t = 4)]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let client = HttpSsoClient::new(reqwest::Client::builder().build()?, opts.sso_url);

    let mut options = SsoOptions::new();
    options.start_url = opts.start_url;
    options.user_name = opts.user_name;
    options.cached_token_filepath = opts.cached_token_file;

    let sso = SsoCredentialsProvider::new(client, options)?;
    tracing::info!(
        path = %sso.cached_token_filepath().display(),
        "using cached SSO token"
    );

    let provider = Arc::new(CredentialsCache::new(sso));

    let mut interval = time::interval(Duration::from_secs(opts.interval));
    loop {
        interval.tick().await;

        let callers: Vec<_> = (0..opts.concurrency)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.retrieve().await })
            })
            .collect();

        for caller in callers {
            match caller.await? {
                Ok(creds) => {
                    tracing::debug!(
                        source = creds.source(),
                        expires = creds.expires().0,
                        token = format_args!("{:?}", creds.bearer_token()),
                        "pulled credentials"
                    )
                }
                Err(error) if error.requires_login() => {
                    tracing::error!(
                        error = (&error as &dyn std::error::Error),
                        "no usable SSO login, log in again"
                    );
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!(
                        error = (&error as &dyn std::error::Error),
                        "unable to obtain credentials"
                    )
                }
            }
        }
    }
}
