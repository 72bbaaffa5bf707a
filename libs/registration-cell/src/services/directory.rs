// libs/registration-cell/src/services/directory.rs
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::RegistrationError;

/// External source of truth for patient identities.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn patient_exists(&self, patient_id: i64) -> Result<bool, RegistrationError>;
}

/// Looks patients up in the hospital directory's `patients` table.
pub struct SupabasePatientDirectory {
    supabase: SupabaseClient,
}

impl SupabasePatientDirectory {
    pub fn new(config: &AppConfig) -> Result<Self, RegistrationError> {
        let supabase = SupabaseClient::new(config)
            .map_err(|e| RegistrationError::Directory(format!("Failed to build directory client: {}", e)))?;
        Ok(Self { supabase })
    }
}

#[async_trait]
impl PatientDirectory for SupabasePatientDirectory {
    async fn patient_exists(&self, patient_id: i64) -> Result<bool, RegistrationError> {
        let path = format!("/rest/v1/patients?patient_id=eq.{}&select=patient_id", patient_id);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| {
                error!("Patient lookup for {} failed: {}", patient_id, e);
                RegistrationError::Directory(e.to_string())
            })?;

        debug!("Directory returned {} rows for patient {}", rows.len(), patient_id);
        Ok(!rows.is_empty())
    }
}

/// Used when no directory is configured: any positive id is accepted.
pub struct UnverifiedPatientDirectory;

#[async_trait]
impl PatientDirectory for UnverifiedPatientDirectory {
    async fn patient_exists(&self, patient_id: i64) -> Result<bool, RegistrationError> {
        Ok(patient_id > 0)
    }
}
