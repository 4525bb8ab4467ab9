//! The small Put/Get/Delete interface an external warm/cold object store
//! must satisfy (spec §1: "specified only by the small blob interface they
//! must satisfy"). `OpendalObjectStore` is a default local-disk
//! implementation; a real deployment swaps in one of the `opendal`
//! services (S3/GCS/Azure/...) the teacher already depends on.

use async_trait::async_trait;
use opendal::{services::Fs, Operator};
use std::path::Path;

use crate::error::FsError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
	async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), FsError>;
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FsError>;
	async fn delete(&self, key: &str) -> Result<(), FsError>;
}

/// Local-filesystem-backed object store via `opendal`'s `Fs` service.
pub struct OpendalObjectStore {
	op: Operator,
}

impl OpendalObjectStore {
	pub fn new_fs(root: &Path) -> Result<Self, FsError> {
		std::fs::create_dir_all(root)?;
		let builder = Fs::default().root(&root.to_string_lossy());
		let op = Operator::new(builder)
			.map_err(|e| FsError::ObjectStore(e.to_string()))?
			.finish();
		Ok(Self { op })
	}
}

#[async_trait]
impl ObjectStore for OpendalObjectStore {
	async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), FsError> {
		self.op
			.write(key, bytes)
			.await
			.map_err(|e| FsError::ObjectStore(e.to_string()))?;
		Ok(())
	}

	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FsError> {
		match self.op.read(key).await {
			Ok(buf) => Ok(Some(buf.to_vec())),
			Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(FsError::ObjectStore(e.to_string())),
		}
	}

	async fn delete(&self, key: &str) -> Result<(), FsError> {
		self.op
			.delete(key)
			.await
			.map_err(|e| FsError::ObjectStore(e.to_string()))?;
		Ok(())
	}
}
