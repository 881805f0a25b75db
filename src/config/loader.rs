use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CrmError;

use super::env::{env_overrides, expand_config_file, EnvSource};
use super::types::{
    ConfigFile, CrmConfig, DEFAULT_API_VERSION, DEFAULT_EXPIRY_BUFFER_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TOKEN_ENDPOINT, DEFAULT_USER_TYPE, LEGACY_API_HOST,
    PRIMARY_API_HOST,
};

/// Strip JSONC comments (`//` line comments and `/* */` block comments).
/// Newlines inside comments are kept so parse errors report the right line.
pub fn strip_jsonc_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if in_string {
            result.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        let next = chars.peek().copied();
        match (ch, next) {
            ('"', _) => {
                in_string = true;
                result.push(ch);
            }
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    if c == '\n' {
                        result.push('\n');
                    }
                    prev = c;
                }
            }
            _ => result.push(ch),
        }
    }

    result
}

/// Discover config files in precedence order (highest first).
///
/// 1. `--config` CLI flag
/// 2. `CRMLOOKUP_CONFIG` env var
/// 3. `./config/crmlookup.json`
/// 4. `~/.crmlookup/crmlookup.json` or `~/.crmlookup/crmlookup.jsonc`
pub fn discover_config_files(cli_config: Option<&str>) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(path) = cli_config {
        candidates.push(PathBuf::from(path));
    }
    if let Ok(env_path) = std::env::var("CRMLOOKUP_CONFIG") {
        candidates.push(PathBuf::from(env_path));
    }
    candidates.push(PathBuf::from("./config/crmlookup.json"));
    if let Some(home) = dirs::home_dir() {
        let dir = home.join(".crmlookup");
        let json = dir.join("crmlookup.json");
        candidates.push(if json.exists() {
            json
        } else {
            dir.join("crmlookup.jsonc")
        });
    }

    let mut files = Vec::new();
    for path in candidates {
        if path.exists() && !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

/// Load a single config file, stripping JSONC comments before parsing.
pub fn load_config_file(path: &Path) -> Result<ConfigFile, CrmError> {
    let content = std::fs::read_to_string(path).map_err(|e| CrmError::Config {
        path: path.to_path_buf(),
        detail: format!("Cannot read file: {e}"),
    })?;

    serde_json::from_str::<ConfigFile>(&strip_jsonc_comments(&content)).map_err(|e| {
        CrmError::Config {
            path: path.to_path_buf(),
            detail: format!("Invalid JSON: {e}"),
        }
    })
}

/// Load, layer and validate all configuration.
///
/// Environment variables (process first, then `.env.local` / `.env` in the
/// working directory) override config files; earlier config files override
/// later ones field by field.
pub fn load_config(cli_config: Option<&str>) -> Result<CrmConfig, CrmError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env = EnvSource::load(&cwd)?;
    let files = discover_config_files(cli_config);
    if let Some(path) = cli_config {
        if !files.iter().any(|f| f == Path::new(path)) {
            return Err(CrmError::Config {
                path: PathBuf::from(path),
                detail: "File does not exist".to_string(),
            });
        }
    }
    load_layers(&files, &env)
}

/// Layer the given files under the environment and resolve the result.
pub fn load_layers(files: &[PathBuf], env: &EnvSource) -> Result<CrmConfig, CrmError> {
    let mut merged = env_overrides(env)?;
    for path in files {
        let mut file = load_config_file(path)?;
        expand_config_file(&mut file, env).map_err(|e| match e {
            CrmError::Config { detail, .. } => CrmError::Config {
                path: path.clone(),
                detail,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        merged.fill_from(file);
    }
    resolve(merged)
}

/// Apply defaults and check that enough credentials exist to mint a token.
pub fn resolve(file: ConfigFile) -> Result<CrmConfig, CrmError> {
    let client_id = file
        .client_id
        .ok_or_else(|| CrmError::config("Missing OAuth client id (set CRM_CLIENT_ID)"))?;
    let client_secret = file
        .client_secret
        .ok_or_else(|| CrmError::config("Missing OAuth client secret (set CRM_CLIENT_SECRET)"))?;

    if file.refresh_token.is_none() && file.authorization_code.is_none() {
        return Err(CrmError::config(
            "Neither a refresh token (CRM_REFRESH_TOKEN) nor an authorization code (CRM_AUTH_CODE) is configured",
        ));
    }

    let canonical_hosts = match file.canonical_hosts {
        None => [PRIMARY_API_HOST.to_string(), LEGACY_API_HOST.to_string()],
        Some(hosts) => hosts.try_into().map_err(|v: Vec<String>| {
            CrmError::config(format!(
                "canonicalHosts must list exactly two hosts, got {}",
                v.len()
            ))
        })?,
    };

    let expiry_buffer_secs = file.expiry_buffer_secs.unwrap_or(DEFAULT_EXPIRY_BUFFER_SECS);
    if expiry_buffer_secs < 0 {
        return Err(CrmError::config("Token expiry buffer cannot be negative"));
    }

    let request_timeout_secs = file
        .request_timeout_secs
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if request_timeout_secs == 0 {
        return Err(CrmError::config("Request timeout must be at least one second"));
    }

    Ok(CrmConfig {
        client_id,
        client_secret,
        refresh_token: file.refresh_token,
        authorization_code: file.authorization_code,
        redirect_uri: file.redirect_uri,
        user_type: file.user_type.unwrap_or_else(|| DEFAULT_USER_TYPE.to_string()),
        token_endpoint: file
            .token_endpoint
            .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string()),
        expiry_buffer_secs,
        api_base_url: file
            .api_base_url
            .unwrap_or_else(|| canonical_hosts[0].clone()),
        canonical_hosts,
        api_version: file
            .api_version
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        company_id: file.company_id,
        request_timeout: Duration::from_secs(request_timeout_secs),
    })
}
