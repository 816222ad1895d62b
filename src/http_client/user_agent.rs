//! Identification headers for outgoing requests.

/// Contact address sent in the `From` header when none is configured.
pub const DEFAULT_CONTACT: &str = "oafinder@localhost";

/// Real browser user agents for impersonate mode.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

/// The crate's own user agent, naming a contact address.
pub fn default_user_agent(contact: &str) -> String {
    format!(
        "oafinder/{} (open access discovery; mailto:{})",
        env!("CARGO_PKG_VERSION"),
        contact
    )
}

fn random_user_agent() -> &'static str {
    IMPERSONATE_USER_AGENTS[uuid::Uuid::new_v4().as_bytes()[0] as usize % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve user agent from config value.
/// - None => the crate's own user agent
/// - "impersonate" => random real browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>, contact: &str) -> String {
    match config {
        None => default_user_agent(contact),
        Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}
