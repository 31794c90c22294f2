//! Controller configuration from environment variables.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_IPAM_NAME: &str = "ipam";
const DEFAULT_RETRY_DELAY_SECS: u64 = 30;
const DEFAULT_POST_QUEUE_CAPACITY: usize = 16;
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub bigip_url: String,
    pub bigip_username: String,
    pub bigip_password: String,
    /// Label distinguishing this device in logs and device keys
    pub bigip_label: Option<String>,
    /// Accept invalid device certificates
    pub bigip_insecure: bool,
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Namespace of the IPAM resource; IPAM cleanup is disabled when unset
    pub ipam_namespace: Option<String>,
    pub ipam_name: String,
    pub retry_delay: Duration,
    pub post_queue_capacity: usize,
    pub metrics_addr: SocketAddr,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).filter(|v| !v.is_empty()).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("{} environment variable is required", name))
            })
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let bigip_url = required("BIGIP_URL")?.trim_end_matches('/').to_string();
        if !bigip_url.starts_with("https://") && !bigip_url.starts_with("http://") {
            return Err(ControllerError::InvalidConfig(format!(
                "BIGIP_URL must be an http(s) URL, got {}",
                bigip_url
            )));
        }

        Ok(Self {
            bigip_url,
            bigip_username: required("BIGIP_USERNAME")?,
            bigip_password: required("BIGIP_PASSWORD")?,
            bigip_label: optional("BIGIP_LABEL"),
            bigip_insecure: parse_or("BIGIP_INSECURE", optional("BIGIP_INSECURE"), false)?,
            watch_namespace: optional("WATCH_NAMESPACE"),
            ipam_namespace: optional("IPAM_NAMESPACE"),
            ipam_name: optional("IPAM_NAME").unwrap_or_else(|| DEFAULT_IPAM_NAME.to_string()),
            retry_delay: Duration::from_secs(parse_or(
                "RETRY_DELAY_SECS",
                optional("RETRY_DELAY_SECS"),
                DEFAULT_RETRY_DELAY_SECS,
            )?),
            post_queue_capacity: match parse_or(
                "POST_QUEUE_CAPACITY",
                optional("POST_QUEUE_CAPACITY"),
                DEFAULT_POST_QUEUE_CAPACITY,
            )? {
                0 => {
                    return Err(ControllerError::InvalidConfig(
                        "POST_QUEUE_CAPACITY must be at least 1".to_string(),
                    ))
                }
                n => n,
            },
            metrics_addr: parse_or(
                "METRICS_ADDR",
                optional("METRICS_ADDR"),
                DEFAULT_METRICS_ADDR.parse().map_err(|e| {
                    ControllerError::InvalidConfig(format!("default metrics address: {}", e))
                })?,
            )?,
        })
    }
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{}={:?}: {}", name, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("BIGIP_URL", "https://10.1.1.4/"),
        ("BIGIP_USERNAME", "admin"),
        ("BIGIP_PASSWORD", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.bigip_url, "https://10.1.1.4");
        assert!(!config.bigip_insecure);
        assert_eq!(config.bigip_label, None);
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.ipam_namespace, None);
        assert_eq!(config.ipam_name, "ipam");
        assert_eq!(config.retry_delay, Duration::from_secs(30));
        assert_eq!(config.post_queue_capacity, 16);
        assert_eq!(config.metrics_addr, "0.0.0.0:8080".parse().unwrap());
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("BIGIP_INSECURE", "true"),
            ("IPAM_NAMESPACE", "kube-system"),
            ("RETRY_DELAY_SECS", "5"),
            ("POST_QUEUE_CAPACITY", "2"),
        ]);
        let config = ControllerConfig::from_lookup(lookup(&vars)).unwrap();

        assert!(config.bigip_insecure);
        assert_eq!(config.ipam_namespace.as_deref(), Some("kube-system"));
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.post_queue_capacity, 2);
    }

    #[test]
    fn test_missing_password() {
        let err = ControllerConfig::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(err.to_string().contains("BIGIP_PASSWORD"));
    }

    #[test]
    fn test_invalid_values() {
        for (name, value) in [
            ("RETRY_DELAY_SECS", "soon"),
            ("POST_QUEUE_CAPACITY", "0"),
            ("BIGIP_INSECURE", "yes"),
            ("BIGIP_URL", "10.1.1.4"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.retain(|(k, _)| *k != name);
            vars.push((name, value));
            let result = ControllerConfig::from_lookup(lookup(&vars));
            assert!(
                matches!(result, Err(ControllerError::InvalidConfig(_))),
                "{}={} should be rejected",
                name,
                value
            );
        }
    }
}
