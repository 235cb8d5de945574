//! Settings resolution and session construction shared by every subcommand.

use camino::{Utf8Path, Utf8PathBuf};
use osmfetch_data::{Session, Settings};

use crate::CliError;

/// Which service a subcommand talks to; selects what `--endpoint` overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Service {
    Overpass,
    Nominatim,
    Elevation,
}

/// Options every subcommand accepts, applied on top of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SessionOverrides {
    /// JSON settings file; defaults apply when absent.
    pub(crate) settings: Option<Utf8PathBuf>,
    pub(crate) cache_folder: Option<Utf8PathBuf>,
    pub(crate) no_cache: bool,
    pub(crate) endpoint: Option<String>,
}

impl SessionOverrides {
    /// Load the settings file, if any, and apply the overrides.
    pub(crate) fn resolve(&self, service: Service) -> Result<Settings, CliError> {
        let mut settings = match &self.settings {
            Some(path) => load_settings(path)?,
            None => Settings::default(),
        };
        if let Some(folder) = &self.cache_folder {
            settings.cache_folder = folder.clone();
        }
        if self.no_cache {
            settings.use_cache = false;
        }
        if let Some(endpoint) = &self.endpoint {
            match service {
                Service::Overpass => settings.overpass_endpoint = endpoint.clone(),
                Service::Nominatim => settings.nominatim_endpoint = endpoint.clone(),
                // Elevation requests carry their full URL.
                Service::Elevation => {}
            }
        }
        Ok(settings)
    }
}

/// Read [`Settings`] from a JSON file. Missing fields keep their defaults.
pub(crate) fn load_settings(path: &Utf8Path) -> Result<Settings, CliError> {
    let text = osmfetch_fs::read_to_string_if_exists(path)
        .map_err(|source| CliError::ReadSettings {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| CliError::MissingSourceFile {
            field: crate::ARG_SETTINGS,
            path: path.to_path_buf(),
        })?;
    serde_json::from_str(&text).map_err(|source| CliError::ParseSettings {
        path: path.to_path_buf(),
        source,
    })
}

/// Builds the session a subcommand sends its requests through.
pub(crate) trait SessionBuilder {
    fn build(&self, settings: &Settings) -> Result<Session, CliError>;
}

/// Connects to the configured services over HTTP.
pub(crate) struct HttpSessionBuilder;

impl SessionBuilder for HttpSessionBuilder {
    fn build(&self, settings: &Settings) -> Result<Session, CliError> {
        log::debug!(
            "connecting with cache {} at {}",
            if settings.use_cache { "enabled" } else { "disabled" },
            settings.cache_folder
        );
        Ok(Session::connect(settings)?)
    }
}
