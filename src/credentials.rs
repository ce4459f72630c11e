//! Credential and API-settings resolution.
//!
//! Precedence is fixed: explicit flags beat environment variables, which
//! beat the selected profile, which beats the interactive prompt. The
//! resolver is a pure function of its inputs; the caller captures the
//! environment into [`Env`] and injects the prompt as a trait object, so
//! every combination is testable without touching process state.

use anyhow::Result;
use tracing::{debug, info};

use crate::config::Profile;
use crate::error::Error;

pub const DEFAULT_API_HOST: &str = "https://api.cloudsmith.io/v1";

/// Exactly one credential is active per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Login { user: String, password: String },
}

/// Credential and host overrides taken from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub api_host: Option<String>,
}

/// Snapshot of the CLOUDSMITH_* environment variables.
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub api_key: Option<String>,
    pub api_host: Option<String>,
    pub api_proxy: Option<String>,
    pub api_user_agent: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
}

impl Env {
    /// Capture the relevant environment variables. Empty values count as
    /// unset.
    pub fn capture() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }
        Env {
            api_key: var("CLOUDSMITH_API_KEY"),
            api_host: var("CLOUDSMITH_API_HOST"),
            api_proxy: var("CLOUDSMITH_API_PROXY"),
            api_user_agent: var("CLOUDSMITH_API_USER_AGENT"),
            login: var("CLOUDSMITH_LOGIN"),
            password: var("CLOUDSMITH_PASSWORD"),
        }
    }
}

/// Last-resort credential source, asked only when flags, environment and
/// profile all came up empty.
pub trait CredentialPrompt {
    fn ask(&self) -> Result<Credential>;
}

/// Interactive login/password prompt on the terminal.
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn ask(&self) -> Result<Credential> {
        let user: String = dialoguer::Input::new()
            .with_prompt("Login")
            .interact_text()?;
        let password = dialoguer::Password::new()
            .with_prompt("Password")
            .interact()?;
        Ok(Credential::Login { user, password })
    }
}

fn credential_from(api_key: &Option<String>, login: &Option<String>, password: &Option<String>) -> Option<Credential> {
    if let Some(key) = api_key {
        return Some(Credential::ApiKey(key.clone()));
    }
    match (login, password) {
        (Some(user), Some(password)) => Some(Credential::Login {
            user: user.clone(),
            password: password.clone(),
        }),
        _ => None,
    }
}

/// Resolve the active credential. Within one source an api key beats a
/// login/password pair. Fails with [`Error::Credential`] when no source
/// yields anything usable.
pub fn resolve_credential(
    flags: &Overrides,
    env: &Env,
    profile: Option<&Profile>,
    prompt: Option<&dyn CredentialPrompt>,
) -> Result<Credential, Error> {
    if let Some(cred) = credential_from(&flags.api_key, &None, &None) {
        debug!("Credential resolved from flags");
        return Ok(cred);
    }
    if let Some(cred) = credential_from(&env.api_key, &env.login, &env.password) {
        debug!("Credential resolved from environment");
        return Ok(cred);
    }
    if let Some(profile) = profile {
        if let Some(cred) = credential_from(&profile.api_key, &profile.login, &profile.password) {
            debug!("Credential resolved from profile");
            return Ok(cred);
        }
    }
    if let Some(prompt) = prompt {
        info!("No credential in flags, environment or profile, prompting");
        return prompt
            .ask()
            .map_err(|e| Error::Credential(format!("prompt failed: {e}")));
    }
    Err(Error::Credential(
        "no api key or login/password in flags, environment or profile".into(),
    ))
}

/// Non-secret API settings, resolved with the same precedence and built-in
/// defaults as the final fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub host: String,
    pub proxy: Option<String>,
    pub user_agent: String,
}

pub fn resolve_settings(flags: &Overrides, env: &Env, profile: Option<&Profile>) -> ApiSettings {
    let host = flags
        .api_host
        .clone()
        .or_else(|| env.api_host.clone())
        .or_else(|| profile.and_then(|p| p.api_host.clone()))
        .unwrap_or_else(|| DEFAULT_API_HOST.to_string());
    let proxy = env
        .api_proxy
        .clone()
        .or_else(|| profile.and_then(|p| p.api_proxy.clone()));
    let user_agent = env
        .api_user_agent
        .clone()
        .or_else(|| profile.and_then(|p| p.api_user_agent.clone()))
        .unwrap_or_else(|| format!("cloudsmith-cli/{}", env!("CARGO_PKG_VERSION")));
    ApiSettings {
        host,
        proxy,
        user_agent,
    }
}

/// Everything a command needs to talk to the service, passed explicitly
/// rather than held in process-wide state.
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub settings: ApiSettings,
    pub credential: Credential,
}
