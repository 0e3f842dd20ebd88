//! Cloud backends for depot
//!
//! Adapts [`object_store`] backends to the depot remote capability and
//! selects one from settings: in-memory for tests and local experiments,
//! Amazon S3, Google Cloud Storage or Azure Blob Storage.

pub mod store;

pub use store::ObjectStoreRemote;

use depot_core::remote::RemoteStore;
use depot_core::settings::{Provider, Settings};
use depot_core::storage::Storage;
use depot_core::{Error, Result};
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::debug;

/// Builds the remote capability named by the settings.
///
/// The settings credential (with its environment fallback) is applied to
/// the provider's builder; anything the builder picks up from the
/// environment on its own, such as profiles or instance roles, still
/// applies underneath.
pub fn connect(settings: &Settings) -> Result<Arc<dyn RemoteStore>> {
    let store: Arc<dyn ObjectStore> = match &settings.provider {
        Provider::Memory => {
            debug!("Using in-memory backend");
            Arc::new(InMemory::new())
        }
        Provider::S3 { bucket } => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(credential) = settings.credential() {
                let (key, secret) = credential.split_once(':').ok_or_else(|| {
                    Error::Settings(
                        "S3 credential must have the form ACCESS_KEY:SECRET_KEY".to_string(),
                    )
                })?;
                builder = builder
                    .with_access_key_id(key)
                    .with_secret_access_key(secret);
            }
            debug!("Using S3 bucket {}", bucket);
            Arc::new(builder.build().map_err(|e| Error::Settings(e.to_string()))?)
        }
        Provider::Gcs { bucket } => {
            let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
            if let Some(credential) = settings.credential() {
                builder = builder.with_service_account_key(credential);
            }
            debug!("Using GCS bucket {}", bucket);
            Arc::new(builder.build().map_err(|e| Error::Settings(e.to_string()))?)
        }
        Provider::Azure { container } => {
            let mut builder = MicrosoftAzureBuilder::from_env().with_container_name(container);
            if let Some(credential) = settings.credential() {
                builder = builder.with_access_key(credential);
            }
            debug!("Using Azure container {}", container);
            Arc::new(builder.build().map_err(|e| Error::Settings(e.to_string()))?)
        }
    };

    Ok(Arc::new(ObjectStoreRemote::new(store)))
}

/// Opens blocking storage over the backend named by the settings.
pub fn open(settings: Settings) -> Result<Storage> {
    let remote = connect(&settings)?;
    Ok(Storage::new(remote, settings))
}
