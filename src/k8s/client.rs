// Client creation with custom user-agent support for kube 2.x
use crate::error::Result as PmResult;
use hyper::http::{HeaderName, HeaderValue};
use kube::{Client, Config};
use tracing::warn;

/// Environment variable that overrides the user-agent sent to the API server
pub const USER_AGENT_ENV: &str = "PODMIRROR_USER_AGENT";

/// Resolve the user-agent to send: the environment override wins over `fallback`
#[must_use]
pub fn resolve_user_agent(fallback: Option<&str>) -> Option<String> {
    std::env::var(USER_AGENT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| fallback.map(str::to_string))
}

/// Push a `user-agent` header onto `config`.
///
/// Returns `false` and leaves `config` untouched when `user_agent` is not a
/// valid header value.
pub fn add_user_agent_header(config: &mut Config, user_agent: &str) -> bool {
    match HeaderValue::from_str(user_agent) {
        Ok(header_value) => {
            config
                .headers
                .push((HeaderName::from_static("user-agent"), header_value));
            true
        }
        Err(e) => {
            warn!("Ignoring invalid user-agent {:?}: {}", user_agent, e);
            false
        }
    }
}

/// Create a new k8s client to interact with k8s cluster api
///
/// # Errors
///
/// Will return `Err` if the kubeconfig cannot be inferred or the client cannot be built
pub async fn new(custom_user_agent: Option<&str>) -> PmResult<Client> {
    let mut config = Config::infer().await?;

    if let Some(user_agent) = resolve_user_agent(custom_user_agent) {
        add_user_agent_header(&mut config, &user_agent);
    }

    let client = Client::try_from(config)?;

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_user_agent_is_skipped() {
        let mut config = Config::new("http://127.0.0.1:6443".parse().unwrap());
        let before = config.headers.len();

        assert!(!add_user_agent_header(&mut config, "\u{007F}InvalidAgent"));
        assert_eq!(config.headers.len(), before);

        assert!(add_user_agent_header(&mut config, "podmirror/0.1.0"));
        assert_eq!(config.headers.len(), before + 1);
    }
}
