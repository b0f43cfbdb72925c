use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("IO error: {0}")]
	Storage(#[from] std::io::Error),
	#[error("Storage corruption: {0}")]
	Corruption(String),
	#[error("Invalid record: {0}")]
	Validation(String),
}

impl StoreError {
	pub fn code(&self) -> &str {
		match self {
			Self::NotFound(_) => "STORE_NOT_FOUND",
			Self::Storage(_) => "STORE_IO",
			Self::Corruption(_) => "STORE_CORRUPT",
			Self::Validation(_) => "STORE_INVALID",
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound(_))
	}

	pub fn to_json_error(&self) -> serde_json::Value {
		serde_json::json!({
			"storeCode": self.code(),
			"message": self.to_string(),
		})
	}
}
