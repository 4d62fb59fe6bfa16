use crate::cluster::{Cluster, ClusterBuilder};
use crate::error::{self, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// A platform that can build new clusters and attach to existing ones.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Return a builder pre-named for `env_name`. Local platforms whose
    /// provisioning is handled by an embedded default builder return
    /// `Ok(None)`, which callers treat as "no override".
    fn builder(&self, env_name: &str) -> Result<Option<Box<dyn ClusterBuilder>>>;

    /// Reconstruct an authenticated handle to an existing cluster without
    /// mutating anything.
    async fn attach(&self, env_name: &str) -> Result<Box<dyn Cluster>>;
}

/// The process-wide mapping from platform name to provider.
///
/// Populate the registry once at program start (see [`default_registry`]) and
/// treat it as read-only afterward; tests build their own.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn ClusterProvider>>,
    names: Vec<String>,
}

impl ProviderRegistry {
    pub fn register<S: Into<String>>(&mut self, name: S, provider: Box<dyn ClusterProvider>) {
        let name = name.into();
        self.names.push(name.clone());
        self.providers.insert(name, provider);
    }

    /// The supported platform names, in registration order.
    pub fn supported_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.providers.contains_key(platform)
    }

    pub fn builder(
        &self,
        platform: &str,
        env_name: &str,
    ) -> Result<Option<Box<dyn ClusterBuilder>>> {
        self.provider(platform)?.builder(env_name)
    }

    pub async fn attach(&self, platform: &str, env_name: &str) -> Result<Box<dyn Cluster>> {
        self.provider(platform)?.attach(env_name).await
    }

    fn provider(&self, platform: &str) -> Result<&dyn ClusterProvider> {
        self.providers
            .get(platform)
            .map(AsRef::as_ref)
            .ok_or_else(|| {
                error::UnsupportedPlatformSnafu {
                    platform,
                    known: self.names.clone(),
                }
                .build()
            })
    }
}

/// Build the registry of all platforms this crate ships providers for.
pub fn default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::default();
    registry.register("eks", Box::new(crate::eks::EksProvider));
    registry.register("kind", Box::new(crate::kind::KindProvider));
    registry
}

#[cfg(test)]
mod test {
    use super::*;

    struct NilBuilderProvider;

    #[async_trait]
    impl ClusterProvider for NilBuilderProvider {
        fn builder(&self, _env_name: &str) -> Result<Option<Box<dyn ClusterBuilder>>> {
            Ok(None)
        }

        async fn attach(&self, env_name: &str) -> Result<Box<dyn Cluster>> {
            error::AddonNotFoundSnafu { addon: env_name }.fail()
        }
    }

    #[test]
    fn unknown_platform_error_is_exact() {
        let registry = ProviderRegistry::default();
        let err = registry.builder("xyz", "env").unwrap_err();
        assert_eq!(err.to_string(), "environment platform not supported: xyz");
    }

    #[test]
    fn unknown_platform_error_names_the_known_set() {
        let mut registry = ProviderRegistry::default();
        registry.register("local", Box::new(NilBuilderProvider));
        match registry.builder("xyz", "env").unwrap_err() {
            crate::Error::UnsupportedPlatform { known, .. } => {
                assert_eq!(known, vec!["local".to_string()])
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn nil_builder_means_no_override() {
        let mut registry = ProviderRegistry::default();
        registry.register("local", Box::new(NilBuilderProvider));
        assert!(registry.builder("local", "env").unwrap().is_none());
    }

    #[test]
    fn names_keep_registration_order() {
        let registry = default_registry();
        assert_eq!(registry.supported_names(), ["eks", "kind"]);
        assert!(registry.contains("eks"));
        assert!(!registry.contains("gke"));
    }
}
