// ---------------------------------------------------------------------------
// RecordStore — one JSON file per key
// ---------------------------------------------------------------------------
//
// Each record is written as `<encoded key>.json` under the store directory:
//
// ```json
// { "key": "<original key>", "data": <document> }
// ```
//
// Keys are percent-encoded into file stems. The encoding is injective, so
// two distinct keys never share a file, and `decode_key` recovers the key
// from a stem. Uppercase ASCII letters are escaped too, which keeps `DPR`
// and `dpr` apart on case-insensitive filesystems (macOS, Windows).
//
// Stems longer than `MAX_ENCODED_KEY_LEN` are cut and suffixed with
// `~<sha256 of the key>`; `~` never appears in a plain stem. The original
// key is always stored in the envelope, so listing never depends on the file
// name and `get` detects a digest collision as `Corruption`.
// ---------------------------------------------------------------------------

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

pub const RECORD_EXTENSION: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";

/// Longest file stem we are willing to create. Keeps `<stem>.json.tmp`
/// under the 255-byte name limit of common filesystems.
pub const MAX_ENCODED_KEY_LEN: usize = 240;

const DIGEST_SEPARATOR: char = '~';

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
	key: String,
	data: Value,
}

/// Listing only needs the key; `data` is skipped without being materialized.
#[derive(Debug, Deserialize)]
struct KeyOnly {
	key: String,
}

// ---------------------------------------------------------------------------
// Key encoding
// ---------------------------------------------------------------------------

fn is_safe_byte(byte: u8, position: usize) -> bool {
	byte.is_ascii_lowercase()
		|| byte.is_ascii_digit()
		|| byte == b'-'
		|| byte == b'_'
		// A leading dot would make a hidden file (or `.`/`..`).
		|| (byte == b'.' && position > 0)
}

/// Percent-encode `key` into a filesystem-safe file stem.
///
/// Lowercase ASCII letters, digits, `-`, `_` and non-leading `.` pass
/// through; every other byte (including `%` and uppercase letters) becomes
/// `%XX` with uppercase hex.
pub fn encode_key(key: &str) -> String {
	let mut out = String::with_capacity(key.len());
	for (i, byte) in key.bytes().enumerate() {
		if is_safe_byte(byte, i) {
			out.push(byte as char);
		} else {
			out.push_str(&format!("%{:02X}", byte));
		}
	}
	out
}

/// Invert `encode_key`. Returns `None` for stems `encode_key` cannot produce.
pub fn decode_key(stem: &str) -> Option<String> {
	let bytes = stem.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			let hex = stem.get(i + 1..i + 3)?;
			out.push(u8::from_str_radix(hex, 16).ok()?);
			i += 3;
		} else if is_safe_byte(bytes[i], i) {
			out.push(bytes[i]);
			i += 1;
		} else {
			return None;
		}
	}
	String::from_utf8(out).ok()
}

/// File stem for `key`: the encoded key, or a cut of it plus the key digest
/// when the encoding is too long for one file name.
fn file_stem(key: &str) -> String {
	let encoded = encode_key(key);
	if encoded.len() <= MAX_ENCODED_KEY_LEN {
		return encoded;
	}
	let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
	let mut cut = MAX_ENCODED_KEY_LEN - DIGEST_SEPARATOR.len_utf8() - digest.len();
	// Never split a `%XX` escape.
	if let Some(pos) = encoded[..cut].rfind('%') {
		if pos + 3 > cut {
			cut = pos;
		}
	}
	format!("{}{}{}", &encoded[..cut], DIGEST_SEPARATOR, digest)
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Durable key → JSON document mapping rooted at one directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
	root: PathBuf,
}

impl RecordStore {
	/// The directory is created lazily on first save.
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Path of the file backing `key`.
	pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
		if key.is_empty() {
			return Err(StoreError::Validation("Record key must not be empty".into()));
		}
		Ok(self.root.join(format!("{}.{}", file_stem(key), RECORD_EXTENSION)))
	}

	/// Write `document` under `key`, replacing any previous record.
	///
	/// The envelope is written to a temp file and renamed into place so a
	/// crash mid-write never leaves a truncated record behind.
	pub fn save<T: Serialize + ?Sized>(&mut self, key: &str, document: &T) -> Result<(), StoreError> {
		let path = self.path_for(key)?;
		let data = serde_json::to_value(document).map_err(|e| {
			StoreError::Validation(format!("Document for '{}' is not JSON-serializable: {}", key, e))
		})?;
		let envelope = Envelope {
			key: key.to_string(),
			data,
		};
		let json = serde_json::to_vec_pretty(&envelope).map_err(|e| {
			StoreError::Validation(format!("Failed to serialize record '{}': {}", key, e))
		})?;

		fs::create_dir_all(&self.root)?;
		let mut temp = path.clone().into_os_string();
		temp.push(TEMP_SUFFIX);
		let temp = PathBuf::from(temp);
		if let Err(e) = fs::write(&temp, &json).and_then(|()| fs::rename(&temp, &path)) {
			let _ = fs::remove_file(&temp);
			return Err(StoreError::Storage(e));
		}

		tracing::debug!(key, path = %path.display(), "record saved");
		Ok(())
	}

	/// Read and deserialize the record for `key`.
	pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
		let path = self.path_for(key)?;
		let raw = match fs::read(&path) {
			Ok(raw) => raw,
			Err(e) if e.kind() == ErrorKind::NotFound => {
				return Err(StoreError::NotFound(format!("Key not found: {}", key)));
			}
			Err(e) => return Err(StoreError::Storage(e)),
		};

		let envelope: Envelope = serde_json::from_slice(&raw).map_err(|e| {
			StoreError::Corruption(format!("Invalid record file {}: {}", path.display(), e))
		})?;
		if envelope.key != key {
			return Err(StoreError::Corruption(format!(
				"Record file {} holds key '{}', expected '{}'",
				path.display(),
				envelope.key,
				key
			)));
		}

		serde_json::from_value(envelope.data).map_err(|e| {
			StoreError::Corruption(format!("Record '{}' does not match its schema: {}", key, e))
		})
	}

	/// Whether a record file exists for `key`. Errors other than "not
	/// found" (permissions, a file where a directory should be) propagate.
	pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
		match fs::metadata(self.path_for(key)?) {
			Ok(meta) => Ok(meta.is_file()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
			Err(e) => Err(StoreError::Storage(e)),
		}
	}

	/// Remove the record for `key`. Deleting an absent key is a no-op.
	pub fn delete(&mut self, key: &str) -> Result<(), StoreError> {
		let path = self.path_for(key)?;
		match fs::remove_file(&path) {
			Ok(()) => {
				tracing::debug!(key, "record deleted");
				Ok(())
			}
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StoreError::Storage(e)),
		}
	}

	/// Original keys of every stored record, in directory order.
	///
	/// Files without the `.json` extension are ignored. A `.json` file that
	/// cannot be parsed fails the listing with `Corruption`.
	pub fn list_keys(&self) -> Result<Vec<String>, StoreError> {
		let mut keys = Vec::new();
		for path in self.record_files()? {
			let raw = fs::read(&path)?;
			let record: KeyOnly = serde_json::from_slice(&raw).map_err(|e| {
				StoreError::Corruption(format!("Invalid record file {}: {}", path.display(), e))
			})?;
			keys.push(record.key);
		}
		Ok(keys)
	}

	/// Every record as `(key, document)`, reading each file once.
	///
	/// Same file selection and order as `list_keys`. A record whose data
	/// does not match `T` fails the listing with `Corruption`.
	pub fn list<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>, StoreError> {
		let mut records = Vec::new();
		for path in self.record_files()? {
			let raw = fs::read(&path)?;
			let envelope: Envelope = serde_json::from_slice(&raw).map_err(|e| {
				StoreError::Corruption(format!("Invalid record file {}: {}", path.display(), e))
			})?;
			let document = serde_json::from_value(envelope.data).map_err(|e| {
				StoreError::Corruption(format!(
					"Record '{}' does not match its schema: {}",
					envelope.key, e
				))
			})?;
			records.push((envelope.key, document));
		}
		Ok(records)
	}

	/// `.json` files directly under the root. A missing root has none.
	fn record_files(&self) -> Result<Vec<PathBuf>, StoreError> {
		let entries = match fs::read_dir(&self.root) {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StoreError::Storage(e)),
		};

		let mut files = Vec::new();
		for entry in entries {
			let path = entry?.path();
			if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
				continue;
			}
			if path.is_file() {
				files.push(path);
			}
		}
		Ok(files)
	}
}
