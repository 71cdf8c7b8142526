use crate::cli::{
    actions::{server::Args, Action},
    commands::{self, backend},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);

    let supabase_url = matches
        .get_one::<String>(backend::ARG_SUPABASE_URL)
        .cloned()
        .context("missing required argument: --supabase-url")?;

    let supabase_anon_key = matches
        .get_one::<String>(backend::ARG_SUPABASE_ANON_KEY)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --supabase-anon-key")?;

    let refresh_token = matches
        .get_one::<String>(backend::ARG_REFRESH_TOKEN)
        .cloned()
        .map(SecretString::from);

    let request_timeout = matches
        .get_one::<u64>(backend::ARG_REQUEST_TIMEOUT_SECONDS)
        .copied()
        .map_or(Duration::from_secs(10), Duration::from_secs);

    let audit_capacity = matches
        .get_one::<usize>(commands::ARG_AUDIT_CAPACITY)
        .copied()
        .unwrap_or(256);

    Ok(Action::Server(Args {
        port,
        supabase_url,
        supabase_anon_key,
        refresh_token,
        request_timeout,
        audit_capacity,
    }))
}
