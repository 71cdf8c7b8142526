use crate::{backend::supabase::Supabase, cli::globals::GlobalArgs, noticeboard};
use anyhow::Result;
use secrecy::SecretString;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub supabase_url: String,
    pub supabase_anon_key: SecretString,
    pub refresh_token: Option<SecretString>,
    pub request_timeout: Duration,
    pub audit_capacity: usize,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the backend client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let mut globals = GlobalArgs::new(args.supabase_url);
    globals.set_anon_key(args.supabase_anon_key);
    if let Some(token) = args.refresh_token {
        globals.set_refresh_token(token);
    }

    debug!("Global args: {:?}", globals);

    let backend = Supabase::new(&globals, args.request_timeout)?;
    let refresh = backend.spawn_refresh();

    let state = noticeboard::AppState::start(backend, args.audit_capacity);
    let result = noticeboard::new(args.port, state).await;

    refresh.abort();
    result
}
