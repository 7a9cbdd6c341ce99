//! Bot verification records.
//!
//! A verification record is a small file describing one bot account: which
//! platform component handles it and whatever credentials that component
//! needs. Records are named `<name>.bot.<ext>`:
//!
//! ```json
//! {
//!     "component": "example.platform",
//!     "code": 123456,
//!     "token": "..."
//! }
//! ```
//!
//! The runtime does not interpret anything besides `component`; the whole
//! document is handed to [`BotRegistrar`](crate::bot::BotRegistrar)s as
//! [`BotVerifyInfo::data`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while reading or decoding verification records.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The file could not be read.
    #[error("Failed to read bot record {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not a valid record.
    #[error("Malformed bot record '{name}': {reason}")]
    Malformed { name: String, reason: String },

    /// The document has no `component` string.
    #[error("Bot record '{0}' has no 'component' field")]
    MissingComponent(String),
}

impl VerifyError {
    fn malformed(name: &str, reason: impl fmt::Display) -> Self {
        Self::Malformed {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for verification record operations.
pub type VerifyResult<T> = Result<T, VerifyError>;

// =============================================================================
// BotVerifyInfo
// =============================================================================

/// A decoded verification record.
#[derive(Debug, Clone, PartialEq)]
pub struct BotVerifyInfo {
    name: String,
    component: String,
    data: Map<String, Value>,
}

impl BotVerifyInfo {
    /// Builds a record from a decoded document.
    ///
    /// Fails with [`VerifyError::MissingComponent`] if `data` has no string
    /// `component` entry.
    pub fn new(name: impl Into<String>, data: Map<String, Value>) -> VerifyResult<Self> {
        let name = name.into();
        let component = match data.get("component") {
            Some(Value::String(component)) if !component.trim().is_empty() => component.clone(),
            _ => return Err(VerifyError::MissingComponent(name)),
        };
        Ok(Self {
            name,
            component,
            data,
        })
    }

    /// Record name, usually the file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the component the bot belongs to.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// The whole decoded document.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Deserializes the document into a component-specific type.
    pub fn decode<T: DeserializeOwned>(&self) -> VerifyResult<T> {
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|e| VerifyError::malformed(&self.name, e))
    }
}

impl fmt::Display for BotVerifyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(component={})", self.name, self.component)
    }
}

// =============================================================================
// Decoders
// =============================================================================

/// Turns the raw bytes of a record file into a [`BotVerifyInfo`].
pub trait VerifyInfoDecoder: Send + Sync {
    /// Decoder name, for logs.
    fn name(&self) -> &str;

    /// Returns true if this decoder handles files named `file_name`.
    fn matches(&self, file_name: &str) -> bool;

    /// Decodes one record.
    fn decode(&self, name: &str, content: &[u8]) -> VerifyResult<BotVerifyInfo>;
}

/// Decodes `*.bot.json` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl VerifyInfoDecoder for JsonDecoder {
    fn name(&self) -> &str {
        "json"
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name.ends_with(".bot.json")
    }

    fn decode(&self, name: &str, content: &[u8]) -> VerifyResult<BotVerifyInfo> {
        let data: Map<String, Value> =
            serde_json::from_slice(content).map_err(|e| VerifyError::malformed(name, e))?;
        BotVerifyInfo::new(name, data)
    }
}

/// Decodes `*.bot.toml` records.
#[cfg(feature = "toml-config")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlDecoder;

#[cfg(feature = "toml-config")]
impl VerifyInfoDecoder for TomlDecoder {
    fn name(&self) -> &str {
        "toml"
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name.ends_with(".bot.toml")
    }

    fn decode(&self, name: &str, content: &[u8]) -> VerifyResult<BotVerifyInfo> {
        use figment::providers::{Format, Toml};

        let text = std::str::from_utf8(content).map_err(|e| VerifyError::malformed(name, e))?;
        let data: Map<String, Value> = figment::Figment::from(Toml::string(text))
            .extract()
            .map_err(|e| VerifyError::malformed(name, e))?;
        BotVerifyInfo::new(name, data)
    }
}

/// Decodes `*.bot.yaml` and `*.bot.yml` records.
#[cfg(feature = "yaml-config")]
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlDecoder;

#[cfg(feature = "yaml-config")]
impl VerifyInfoDecoder for YamlDecoder {
    fn name(&self) -> &str {
        "yaml"
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name.ends_with(".bot.yaml") || file_name.ends_with(".bot.yml")
    }

    fn decode(&self, name: &str, content: &[u8]) -> VerifyResult<BotVerifyInfo> {
        use figment::providers::{Format, Yaml};

        let text = std::str::from_utf8(content).map_err(|e| VerifyError::malformed(name, e))?;
        let data: Map<String, Value> = figment::Figment::from(Yaml::string(text))
            .extract()
            .map_err(|e| VerifyError::malformed(name, e))?;
        BotVerifyInfo::new(name, data)
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Finds and decodes verification records in directories.
///
/// Custom decoders are consulted before the standard ones.
#[derive(Clone)]
pub struct VerifyInfoLoader {
    decoders: Vec<Arc<dyn VerifyInfoDecoder>>,
}

impl Default for VerifyInfoLoader {
    fn default() -> Self {
        Self::standard()
    }
}

impl VerifyInfoLoader {
    /// A loader with the decoders enabled by cargo features.
    pub fn standard() -> Self {
        #[allow(unused_mut)]
        let mut decoders: Vec<Arc<dyn VerifyInfoDecoder>> = vec![Arc::new(JsonDecoder)];
        #[cfg(feature = "toml-config")]
        decoders.push(Arc::new(TomlDecoder));
        #[cfg(feature = "yaml-config")]
        decoders.push(Arc::new(YamlDecoder));
        Self { decoders }
    }

    /// Adds a decoder with precedence over the ones already present.
    pub fn with_decoder<D: VerifyInfoDecoder + 'static>(mut self, decoder: D) -> Self {
        self.decoders.insert(0, Arc::new(decoder));
        self
    }

    /// Returns the decoder for `file_name`, if any.
    pub fn decoder_for(&self, file_name: &str) -> Option<&dyn VerifyInfoDecoder> {
        self.decoders
            .iter()
            .find(|d| d.matches(file_name))
            .map(|d| d.as_ref())
    }

    /// Reads and decodes one file.
    ///
    /// Returns `Ok(None)` if no decoder matches its name.
    pub fn load_file(&self, path: &Path) -> VerifyResult<Option<BotVerifyInfo>> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some(decoder) = self.decoder_for(file_name) else {
            return Ok(None);
        };

        let content = std::fs::read(path).map_err(|source| VerifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), decoder = decoder.name(), "Decoding bot record");
        decoder.decode(file_name, &content).map(Some)
    }

    /// Decodes every matching file directly inside `dir`, sorted by file name.
    ///
    /// A missing directory yields no records.
    pub fn load_dir(&self, dir: &Path) -> VerifyResult<Vec<BotVerifyInfo>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %dir.display(), "Bot record directory not found, skipping");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(VerifyError::Io {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| VerifyError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::new();
        for path in paths {
            match self.load_file(&path)? {
                Some(info) => records.push(info),
                None => debug!(path = %path.display(), "No decoder matches file, skipping"),
            }
        }
        Ok(records)
    }
}

impl fmt::Debug for VerifyInfoLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.decoders.iter().map(|d| d.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct ExampleAccount {
        code: u64,
        token: String,
    }

    #[test]
    fn test_json_record() {
        let info = JsonDecoder
            .decode(
                "alice.bot.json",
                br#"{"component": "example", "code": 1, "token": "t"}"#,
            )
            .unwrap();
        assert_eq!(info.name(), "alice.bot.json");
        assert_eq!(info.component(), "example");
        assert_eq!(info.data()["code"], json!(1));
        assert_eq!(
            info.decode::<ExampleAccount>().unwrap(),
            ExampleAccount {
                code: 1,
                token: "t".to_string(),
            }
        );
        assert_eq!(info.to_string(), "alice.bot.json(component=example)");
    }

    #[test]
    fn test_invalid_records() {
        assert!(matches!(
            JsonDecoder.decode("a.bot.json", br#"{"code": 1}"#),
            Err(VerifyError::MissingComponent(name)) if name == "a.bot.json"
        ));
        assert!(matches!(
            JsonDecoder.decode("a.bot.json", br#"["component"]"#),
            Err(VerifyError::Malformed { .. })
        ));
        assert!(matches!(
            JsonDecoder.decode("a.bot.json", br#"{"component": 3}"#),
            Err(VerifyError::MissingComponent(_))
        ));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_toml_record() {
        let info = TomlDecoder
            .decode("bob.bot.toml", b"component = \"example\"\ncode = 2\n")
            .unwrap();
        assert_eq!(info.component(), "example");
        assert_eq!(info.data()["code"], json!(2));
    }

    #[test]
    fn test_load_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("b.bot.json"),
            r#"{"component": "second"}"#,
        )
        .unwrap();
        std::fs::write(temp.path().join("a.bot.json"), r#"{"component": "first"}"#).unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(temp.path().join("nested.bot.json")).unwrap();

        let records = VerifyInfoLoader::standard().load_dir(temp.path()).unwrap();
        let components: Vec<&str> = records.iter().map(|r| r.component()).collect();
        assert_eq!(components, vec!["first", "second"]);

        let missing = VerifyInfoLoader::standard()
            .load_dir(&temp.path().join("absent"))
            .unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_custom_decoder_takes_precedence() {
        struct Fixed;

        impl VerifyInfoDecoder for Fixed {
            fn name(&self) -> &str {
                "fixed"
            }

            fn matches(&self, file_name: &str) -> bool {
                file_name.ends_with(".bot.json")
            }

            fn decode(&self, name: &str, _content: &[u8]) -> VerifyResult<BotVerifyInfo> {
                let mut data = Map::new();
                data.insert("component".to_string(), json!("fixed"));
                BotVerifyInfo::new(name, data)
            }
        }

        let loader = VerifyInfoLoader::standard().with_decoder(Fixed);
        assert_eq!(loader.decoder_for("x.bot.json").unwrap().name(), "fixed");
        assert!(loader.decoder_for("x.json").is_none());
    }
}
