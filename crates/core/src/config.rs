//! Runtime configuration for the hosted project.

use crate::constants::DEFAULT_PATIENTS_TABLE;
use crate::error::{PatientError, PatientResult};

/// Everything the clients need to reach one hosted project.
///
/// Resolved once at startup and passed down; nothing below this layer reads
/// the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreConfig {
    project_url: String,
    api_key: String,
    patients_table: String,
}

impl CoreConfig {
    /// Validates and normalizes the project settings.
    ///
    /// # Arguments
    ///
    /// * `project_url` - Project root URL, trailing slashes tolerated.
    /// * `api_key` - The project's anonymous API key.
    /// * `patients_table` - Table name override; blank or missing falls back
    ///   to [`DEFAULT_PATIENTS_TABLE`].
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] when the URL is blank or not
    /// HTTP, or the API key is blank.
    pub fn new(
        project_url: &str,
        api_key: &str,
        patients_table: Option<&str>,
    ) -> PatientResult<Self> {
        let project_url = project_url.trim().trim_end_matches('/');
        if project_url.is_empty() {
            return Err(PatientError::InvalidInput(
                "project url is not set".to_owned(),
            ));
        }
        if !project_url.starts_with("http://") && !project_url.starts_with("https://") {
            return Err(PatientError::InvalidInput(format!(
                "project url must be http or https: {project_url}"
            )));
        }

        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(PatientError::InvalidInput("api key is not set".to_owned()));
        }

        let patients_table = match patients_table.map(str::trim) {
            Some(table) if !table.is_empty() => table.to_owned(),
            _ => DEFAULT_PATIENTS_TABLE.to_owned(),
        };

        Ok(Self {
            project_url: project_url.to_owned(),
            api_key: api_key.to_owned(),
            patients_table,
        })
    }

    pub fn project_url(&self) -> &str {
        &self.project_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn patients_table(&self) -> &str {
        &self.patients_table
    }
}
