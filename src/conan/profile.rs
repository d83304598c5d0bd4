use crate::Result;
use crate::conan::Conan;
use std::collections::BTreeMap;

const LOG_TARGET: &str = "  profile";

/// The build-profile settings consulted when resolving platform-conditional download URLs.
pub const PROFILE_SETTINGS: [&str; 8] = [
    "os",
    "os_build",
    "arch",
    "arch_build",
    "compiler",
    "compiler.runtime",
    "compiler.version",
    "build_type",
];

/// Flat, immutable view of a Conan build profile.
///
/// Resolved once at the start of a run and passed by reference to every stage that needs to
/// disambiguate platform-keyed URLs.
#[derive(Debug, Clone, Default)]
pub struct BuildProfile {
    settings: BTreeMap<String, String>,
}

impl BuildProfile {
    /// Query the package manager for the fixed setting set of the configured profile.
    ///
    /// Fails when the profile itself does not exist; individual settings that are not defined
    /// resolve to empty values.
    pub async fn resolve(conan: &Conan) -> Result<Self> {
        conan.assert_profile_exists().await?;

        let mut settings = BTreeMap::new();
        for key in PROFILE_SETTINGS {
            let value = conan.profile_setting(key).await;
            let _ = settings.insert(key.to_owned(), value);
        }

        log::debug!(target: LOG_TARGET, "Resolved build profile: {settings:?}");
        Ok(Self { settings })
    }

    /// Build a profile from explicit settings.
    pub fn from_settings<K: Into<String>, V: Into<String>>(settings: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            settings: settings.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// A setting value; empty values read as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn os_build(&self) -> Option<&str> {
        self.get("os_build")
    }

    #[must_use]
    pub fn arch_build(&self) -> Option<&str> {
        self.get("arch_build")
    }
}
