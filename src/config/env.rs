use std::collections::HashMap;
use std::path::Path;

use crate::error::CrmError;

use super::types::ConfigFile;

pub const ENV_CLIENT_ID: &str = "CRM_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "CRM_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "CRM_REFRESH_TOKEN";
pub const ENV_AUTH_CODE: &str = "CRM_AUTH_CODE";
pub const ENV_REDIRECT_URI: &str = "CRM_REDIRECT_URI";
pub const ENV_USER_TYPE: &str = "CRM_USER_TYPE";
pub const ENV_TOKEN_URL: &str = "CRM_TOKEN_URL";
pub const ENV_EXPIRY_BUFFER: &str = "CRM_TOKEN_EXPIRY_BUFFER_SECONDS";
pub const ENV_API_BASE_URL: &str = "CRM_API_BASE_URL";
pub const ENV_COMPANY_ID: &str = "CRM_COMPANY_ID";
pub const ENV_API_VERSION: &str = "CRM_API_VERSION";
pub const ENV_REQUEST_TIMEOUT: &str = "CRM_REQUEST_TIMEOUT_SECS";

/// Developer env files read from the working directory, highest precedence first.
pub const ENV_FILES: [&str; 2] = [".env.local", ".env"];

/// Variable lookup layering the process environment over developer env files.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    process: HashMap<String, String>,
    files: HashMap<String, String>,
}

impl EnvSource {
    /// Snapshot the process environment plus any env files in `dir`.
    pub fn load(dir: &Path) -> Result<Self, CrmError> {
        let mut files = HashMap::new();
        for name in ENV_FILES {
            let path = dir.join(name);
            if !path.exists() {
                continue;
            }
            for (k, v) in read_env_file(&path)? {
                files.entry(k).or_insert(v);
            }
            tracing::debug!(path = %path.display(), "loaded developer env file");
        }
        Ok(Self {
            process: std::env::vars().collect(),
            files,
        })
    }

    pub fn from_pairs(process: &[(&str, &str)], files: &[(&str, &str)]) -> Self {
        let collect = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>()
        };
        Self {
            process: collect(process),
            files: collect(files),
        }
    }

    /// Non-empty value for `key`; the process environment wins over env files.
    pub fn get(&self, key: &str) -> Option<String> {
        self.process
            .get(key)
            .filter(|v| !v.is_empty())
            .or_else(|| self.files.get(key).filter(|v| !v.is_empty()))
            .cloned()
    }
}

/// Read a developer env file. Syntax follows dotenv: `#` comments (also
/// trailing ones after whitespace), `export ` prefixes, single and double
/// quotes with escapes, and multi-line quoted values.
pub fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, CrmError> {
    let config_error = |e: dotenvy::Error| CrmError::Config {
        path: path.to_path_buf(),
        detail: format!("Invalid env file: {e}"),
    };
    dotenvy::from_path_iter(path)
        .map_err(config_error)?
        .map(|item| item.map_err(config_error))
        .collect()
}

/// Expand environment variable references in a string.
///
/// Supported syntaxes:
/// - `${VAR}` - replaced with the value; error if unset
/// - `${VAR:-fallback}` - replaced with the value, or fallback if unset or empty
/// - `$env:VAR` - same as `${VAR}`
pub fn expand_env_vars(input: &str, env: &EnvSource) -> Result<String, CrmError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];

        if let Some(body) = rest.strip_prefix('{') {
            let close = body.find('}').ok_or_else(|| {
                CrmError::config(format!("Unclosed variable reference: ${{{body}"))
            })?;
            let expr = &body[..close];
            rest = &body[close + 1..];
            match expr.split_once(":-") {
                Some((name, fallback)) => {
                    result.push_str(&env.get(name).unwrap_or_else(|| fallback.to_string()))
                }
                None => result.push_str(&require(env, expr)?),
            }
        } else if let Some(body) = rest.strip_prefix("env:") {
            let end = body
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(body.len());
            if end == 0 {
                return Err(CrmError::config("Empty variable name in $env: reference"));
            }
            result.push_str(&require(env, &body[..end])?);
            rest = &body[end..];
        } else {
            result.push('$');
        }
    }
    result.push_str(rest);
    Ok(result)
}

fn require(env: &EnvSource, name: &str) -> Result<String, CrmError> {
    env.get(name)
        .ok_or_else(|| CrmError::config(format!("Environment variable '{name}' is not set")))
}

/// Expand variable references in every string field of a config file.
pub fn expand_config_file(file: &mut ConfigFile, env: &EnvSource) -> Result<(), CrmError> {
    let fields = [
        &mut file.client_id,
        &mut file.client_secret,
        &mut file.refresh_token,
        &mut file.authorization_code,
        &mut file.redirect_uri,
        &mut file.user_type,
        &mut file.token_endpoint,
        &mut file.api_base_url,
        &mut file.api_version,
        &mut file.company_id,
    ];
    for field in fields {
        if let Some(value) = field {
            *value = expand_env_vars(value, env)?;
        }
    }
    if let Some(hosts) = &mut file.canonical_hosts {
        for host in hosts {
            *host = expand_env_vars(host, env)?;
        }
    }
    Ok(())
}

/// Build a config layer from `CRM_*` variables.
pub fn env_overrides(env: &EnvSource) -> Result<ConfigFile, CrmError> {
    Ok(ConfigFile {
        client_id: env.get(ENV_CLIENT_ID),
        client_secret: env.get(ENV_CLIENT_SECRET),
        refresh_token: env.get(ENV_REFRESH_TOKEN),
        authorization_code: env.get(ENV_AUTH_CODE),
        redirect_uri: env.get(ENV_REDIRECT_URI),
        user_type: env.get(ENV_USER_TYPE),
        token_endpoint: env.get(ENV_TOKEN_URL),
        expiry_buffer_secs: parse_number(env, ENV_EXPIRY_BUFFER)?,
        api_base_url: env.get(ENV_API_BASE_URL),
        canonical_hosts: None,
        api_version: env.get(ENV_API_VERSION),
        company_id: env.get(ENV_COMPANY_ID),
        request_timeout_secs: parse_number(env, ENV_REQUEST_TIMEOUT)?,
    })
}

fn parse_number<T: std::str::FromStr>(env: &EnvSource, key: &str) -> Result<Option<T>, CrmError> {
    env.get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| CrmError::config(format!("{key} must be a whole number, got '{raw}'")))
        })
        .transpose()
}
