//! Name-keyed reconstructor construction.
//!
//! The registry is built explicitly at startup; there is no implicit
//! global registration.

use std::collections::HashMap;

use showerpipe_core::error::ConfigError;

use crate::hillas::{HillasReconstructor, ReconstructorConfig};
use crate::Reconstructor;

type Factory = fn(&str, &ReconstructorConfig) -> showerpipe_core::Result<Box<dyn Reconstructor>>;

/// Maps reconstructor names to factories.
pub struct ReconstructorRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl Default for ReconstructorRegistry {
    fn default() -> Self {
        let mut factories: HashMap<&'static str, Factory> = HashMap::new();
        factories.insert("HillasReconstructor", |name, config| {
            Ok(Box::new(HillasReconstructor::new(name, config)?))
        });
        Self { factories }
    }
}

impl ReconstructorRegistry {
    /// Construct a reconstructor by name.
    ///
    /// # Errors
    /// `ConfigError::UnknownName` for unregistered names; construction
    /// errors (e.g. a bad image query) pass through.
    pub fn build(
        &self,
        name: &str,
        config: &ReconstructorConfig,
    ) -> showerpipe_core::Result<Box<dyn Reconstructor>> {
        let factory = self.factories.get(name).ok_or_else(|| ConfigError::UnknownName {
            kind: "reconstructor",
            name: name.to_string(),
        })?;
        factory(name, config)
    }

    /// Registered names, for diagnostics.
    #[must_use]
    pub fn known_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_reconstructor_builds() {
        let registry = ReconstructorRegistry::default();
        let reconstructor = registry
            .build("HillasReconstructor", &ReconstructorConfig::default())
            .unwrap();
        assert_eq!(reconstructor.name(), "HillasReconstructor");
    }

    #[test]
    fn test_unknown_name_rejected() {
        let registry = ReconstructorRegistry::default();
        let err = registry
            .build("DispReconstructor", &ReconstructorConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            showerpipe_core::Error::Config(ConfigError::UnknownName { .. })
        ));
    }

    #[test]
    fn test_bad_query_propagates() {
        let registry = ReconstructorRegistry::default();
        let config = ReconstructorConfig {
            image_query: "nonsense_field > 1".to_string(),
            use_fake_hillas: false,
        };
        let err = registry.build("HillasReconstructor", &config).unwrap_err();
        assert!(matches!(
            err,
            showerpipe_core::Error::Config(ConfigError::Query(_))
        ));
    }
}
