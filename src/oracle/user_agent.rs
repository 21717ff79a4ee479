//! User agent handling for oracle requests.

/// Fixed identifying user agent sent with every request.
pub const USER_AGENT: &str = concat!("lexharvest/", env!("CARGO_PKG_VERSION"));

/// Resolve user agent from config value.
/// - None or empty => default lexharvest user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config.map(str::trim) {
        None | Some("") => USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}
