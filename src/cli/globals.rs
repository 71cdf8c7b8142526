use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub supabase_url: String,
    pub supabase_anon_key: SecretString,
    /// Refresh token of a persisted session, restored on the first session check.
    pub refresh_token: Option<SecretString>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            supabase_url: url,
            supabase_anon_key: SecretString::default(),
            refresh_token: None,
        }
    }

    pub fn set_anon_key(&mut self, key: SecretString) {
        self.supabase_anon_key = key;
    }

    pub fn set_refresh_token(&mut self, token: SecretString) {
        self.refresh_token = Some(token);
    }
}
