//! OCR engine implementations
//!
//! This module contains implementations of the Recognizer trait for different
//! Tesseract backends. The linked engine is compiled only with its feature flag.

pub mod tesseract_cli;

#[cfg(feature = "engine-leptess")]
pub mod leptess;

use crate::config::Config;
use crate::engine::Recognizer;
use crate::error::OcrError;
use std::sync::Arc;

/// Information about an available engine
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Registry of available OCR engines
pub struct EngineRegistry {
    engines: Vec<Arc<dyn Recognizer>>,
    default_engine: String,
}

impl EngineRegistry {
    /// Create a new engine registry with all available engines initialized.
    ///
    /// An engine that fails to initialize is skipped with a warning; the
    /// registry only fails when no engine is left.
    pub fn new(config: &Config) -> Result<Self, OcrError> {
        let mut engines: Vec<Arc<dyn Recognizer>> = Vec::new();

        tracing::info!("Initializing tesseract engine...");
        match tesseract_cli::TesseractCli::new(config) {
            Ok(engine) => engines.push(Arc::new(engine)),
            Err(e) => tracing::warn!("Tesseract CLI engine unavailable: {}", e),
        }

        #[cfg(feature = "engine-leptess")]
        {
            tracing::info!("Initializing leptess engine...");
            match leptess::LeptessEngine::new(config) {
                Ok(engine) => engines.push(Arc::new(engine)),
                Err(e) => tracing::warn!("Leptess engine unavailable: {}", e),
            }
        }

        Self::from_engines(engines)
    }

    /// Build a registry from already initialized engines; the first is the default
    pub fn from_engines(engines: Vec<Arc<dyn Recognizer>>) -> Result<Self, OcrError> {
        let default_engine = match engines.first() {
            Some(engine) => engine.name().to_string(),
            None => {
                return Err(OcrError::InitializationError(
                    "No OCR engines available. Install tesseract or build with --features engine-leptess".to_string(),
                ))
            }
        };

        Ok(Self {
            engines,
            default_engine,
        })
    }

    /// Get an engine by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Recognizer>> {
        self.engines.iter().find(|e| e.name() == name).cloned()
    }

    /// Get the default engine
    pub fn default(&self) -> Option<Arc<dyn Recognizer>> {
        self.get(&self.default_engine)
    }

    /// Resolve the engine requested on the command line, or the default
    pub fn select(&self, name: Option<&str>) -> Result<Arc<dyn Recognizer>, OcrError> {
        match name {
            Some(name) => self.get(name).ok_or_else(|| {
                OcrError::InitializationError(format!(
                    "Unknown engine '{}'. Available: {}",
                    name,
                    self.list().join(", ")
                ))
            }),
            None => self.default().ok_or_else(|| {
                OcrError::Internal(format!("Default engine '{}' missing", self.default_engine))
            }),
        }
    }

    /// List all available engine names
    pub fn list(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Get info about all available engines
    pub fn info(&self) -> Vec<EngineInfo> {
        self.engines
            .iter()
            .map(|e| EngineInfo {
                name: e.name(),
                description: e.description(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RecognitionConfig;
    use image::GrayImage;

    struct Named(&'static str);

    impl Recognizer for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "test engine"
        }

        fn recognize(&self, _: &GrayImage, _: &RecognitionConfig) -> Result<String, OcrError> {
            Ok(String::new())
        }
    }

    fn engines(names: &[&'static str]) -> Vec<Arc<dyn Recognizer>> {
        names
            .iter()
            .map(|name| Arc::new(Named(*name)) as Arc<dyn Recognizer>)
            .collect()
    }

    #[test]
    fn test_first_engine_is_default() {
        let registry = EngineRegistry::from_engines(engines(&["a", "b"])).unwrap();

        assert_eq!(registry.select(None).unwrap().name(), "a");
        assert_eq!(registry.select(Some("b")).unwrap().name(), "b");
        assert_eq!(registry.list(), vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_engine_is_an_error() {
        let registry = EngineRegistry::from_engines(engines(&["a"])).unwrap();
        let err = registry.select(Some("zzz")).err().unwrap();
        assert!(err.to_string().contains("Available: a"));
    }

    #[test]
    fn test_empty_registry_is_an_error() {
        assert!(EngineRegistry::from_engines(Vec::new()).is_err());
    }
}
