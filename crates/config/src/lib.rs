#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! App framework configuration
//!
//! The reconciler deserializes the app framework section of the custom
//! resource spec into [`AppFrameworkSpec`] and hands it to the pipeline.
//! This crate owns the schema, the per-source default resolution, and the
//! validation that turns a dangling reference into a `ConfigError` before
//! any worker is scheduled.

use appfw_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};

/// Default remote repository poll cadence.
pub const DEFAULT_APPS_REPO_POLL_INTERVAL_SECONDS: u64 = 60;

/// Default download-phase concurrency when the spec leaves it unset.
pub const DEFAULT_MAX_CONCURRENT_APP_DOWNLOADS: u64 = 5;

/// Staging scope of an app source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Installed per pod.
    Local,
    /// Distributed via a cluster-wide bundle push.
    Cluster,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Local => f.write_str("local"),
            Scope::Cluster => f.write_str("cluster"),
        }
    }
}

/// Remote object store binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    pub name: String,
    pub endpoint: String,
    pub path: String,
    #[serde(default)]
    pub secret_ref: String,
    pub provider: String,
}

/// Defaults applied to app sources that do not override them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSourceDefaultSpec {
    #[serde(default)]
    pub vol_name: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
}

/// A named group of apps sharing a remote volume and scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSourceSpec {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub vol_name: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
}

/// The app framework section of a custom resource spec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppFrameworkSpec {
    #[serde(default)]
    pub defaults: AppSourceDefaultSpec,
    #[serde(default)]
    pub apps_repo_poll_interval_seconds: u64,
    #[serde(default)]
    pub max_concurrent_app_downloads: u64,
    #[serde(default)]
    pub vol_list: Vec<VolumeSpec>,
    #[serde(default)]
    pub app_sources: Vec<AppSourceSpec>,
}

impl AppFrameworkSpec {
    /// Effective poll cadence, substituting the default for zero.
    #[must_use]
    pub fn poll_interval_seconds(&self) -> u64 {
        if self.apps_repo_poll_interval_seconds == 0 {
            DEFAULT_APPS_REPO_POLL_INTERVAL_SECONDS
        } else {
            self.apps_repo_poll_interval_seconds
        }
    }

    /// Effective download concurrency, substituting the default for zero.
    #[must_use]
    pub fn max_concurrent_app_downloads(&self) -> u64 {
        if self.max_concurrent_app_downloads == 0 {
            DEFAULT_MAX_CONCURRENT_APP_DOWNLOADS
        } else {
            self.max_concurrent_app_downloads
        }
    }

    #[must_use]
    pub fn app_source(&self, name: &str) -> Option<&AppSourceSpec> {
        self.app_sources.iter().find(|src| src.name == name)
    }

    #[must_use]
    pub fn volume(&self, name: &str) -> Option<&VolumeSpec> {
        self.vol_list.iter().find(|vol| vol.name == name)
    }

    /// Scope of an app source, falling back to the framework defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the app source does not exist or neither the
    /// source nor the defaults specify a scope.
    pub fn scope_for_app_source(&self, name: &str) -> Result<Scope, Error> {
        let src = self.app_source(name).ok_or_else(|| ConfigError::AppSourceNotFound {
            app_src: name.to_string(),
        })?;

        src.scope
            .or(self.defaults.scope)
            .ok_or_else(|| {
                ConfigError::InvalidValue {
                    field: format!("appSources[{name}].scope"),
                    message: "no scope set and no default scope configured".to_string(),
                }
                .into()
            })
    }

    /// Volume backing an app source, falling back to the framework
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the app source does not exist, no volume name
    /// resolves, or the resolved name references no volume.
    pub fn volume_for_app_source(&self, name: &str) -> Result<&VolumeSpec, Error> {
        let src = self.app_source(name).ok_or_else(|| ConfigError::AppSourceNotFound {
            app_src: name.to_string(),
        })?;

        let vol_name = src
            .vol_name
            .as_deref()
            .or(self.defaults.vol_name.as_deref())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: format!("appSources[{name}].volName"),
                message: "no volume set and no default volume configured".to_string(),
            })?;

        self.volume(vol_name).ok_or_else(|| {
            ConfigError::DanglingVolumeRef {
                app_src: name.to_string(),
                volume: vol_name.to_string(),
            }
            .into()
        })
    }

    /// Validate the whole spec before the pipeline schedules any worker.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found: duplicate names,
    /// dangling volume references, unresolvable scopes, or empty
    /// endpoints.
    pub fn validate(&self) -> Result<(), Error> {
        for (i, vol) in self.vol_list.iter().enumerate() {
            if self.vol_list[..i].iter().any(|other| other.name == vol.name) {
                return Err(ConfigError::DuplicateVolume {
                    volume: vol.name.clone(),
                }
                .into());
            }
            if vol.endpoint.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("volList[{}].endpoint", vol.name),
                    message: "endpoint must not be empty".to_string(),
                }
                .into());
            }
            if vol.provider.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("volList[{}].provider", vol.name),
                    message: "provider must not be empty".to_string(),
                }
                .into());
            }
        }

        for (i, src) in self.app_sources.iter().enumerate() {
            if self.app_sources[..i].iter().any(|other| other.name == src.name) {
                return Err(ConfigError::DuplicateAppSource {
                    app_src: src.name.clone(),
                }
                .into());
            }
            self.volume_for_app_source(&src.name)?;
            self.scope_for_app_source(&src.name)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> AppFrameworkSpec {
        AppFrameworkSpec {
            apps_repo_poll_interval_seconds: 60,
            max_concurrent_app_downloads: 5,
            vol_list: vec![VolumeSpec {
                name: "test_volume".to_string(),
                endpoint: "https://s3-eu-west-2.amazonaws.com".to_string(),
                path: "testbucket-rs-london".to_string(),
                secret_ref: "s3-secret".to_string(),
                provider: "aws".to_string(),
            }],
            app_sources: vec![AppSourceSpec {
                name: "appSrc1".to_string(),
                location: "adminAppsRepo".to_string(),
                vol_name: Some("test_volume".to_string()),
                scope: Some(Scope::Local),
            }],
            ..AppFrameworkSpec::default()
        }
    }

    #[test]
    fn valid_spec_passes() {
        spec().validate().unwrap();
    }

    #[test]
    fn dangling_volume_ref_is_rejected() {
        let mut spec = spec();
        spec.app_sources[0].vol_name = Some("missing_volume".to_string());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn duplicate_app_source_is_rejected() {
        let mut spec = spec();
        let dup = spec.app_sources[0].clone();
        spec.app_sources.push(dup);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn source_without_scope_falls_back_to_defaults() {
        let mut spec = spec();
        spec.app_sources[0].scope = None;
        spec.defaults.scope = Some(Scope::Cluster);
        assert_eq!(spec.scope_for_app_source("appSrc1").unwrap(), Scope::Cluster);
    }

    #[test]
    fn source_without_scope_or_default_is_rejected() {
        let mut spec = spec();
        spec.app_sources[0].scope = None;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn unknown_app_source_lookup_fails() {
        assert!(spec().volume_for_app_source("invalidAppSrcName").is_err());
        assert!(spec().scope_for_app_source("invalidAppSrcName").is_err());
    }

    #[test]
    fn zero_knobs_use_defaults() {
        let spec = AppFrameworkSpec::default();
        assert_eq!(
            spec.poll_interval_seconds(),
            DEFAULT_APPS_REPO_POLL_INTERVAL_SECONDS
        );
        assert_eq!(
            spec.max_concurrent_app_downloads(),
            DEFAULT_MAX_CONCURRENT_APP_DOWNLOADS
        );
    }
}
