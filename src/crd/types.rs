//! Supporting types for the ImageBuild CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Source repository the worker clones before building
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    /// Git URL passed to `git clone`
    #[serde(default)]
    pub url: String,

    /// Ref to check out into a local `build` branch after cloning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout: Option<String>,
}

impl RepositorySpec {
    /// The checkout ref, treating an empty string as absent
    pub fn checkout_ref(&self) -> Option<&str> {
        self.checkout.as_deref().filter(|c| !c.is_empty())
    }
}

/// Registry credentials used to log in and push the built image
///
/// Credentials come either from a Secret (`fromSecret`) holding the keys
/// `registryUsername`, `registryPassword` and `registryUri`, or from the
/// literal `username`/`password`/`registry` fields.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredentials {
    /// Log in before the build and push the image afterwards
    #[serde(default)]
    pub enabled: bool,

    /// Registry URI (e.g. quay.io)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Registry username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Registry password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Name of a Secret in the build's namespace holding the credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_secret: Option<String>,
}

impl RegistryCredentials {
    /// The referenced Secret name, treating an empty string as absent
    pub fn secret_name(&self) -> Option<&str> {
        self.from_secret.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_checkout_means_default_branch() {
        let repo = RepositorySpec {
            url: "https://github.com/mudler/img-controller".to_string(),
            checkout: Some(String::new()),
        };
        assert_eq!(repo.checkout_ref(), None);

        let repo = RepositorySpec {
            checkout: Some("v2".to_string()),
            ..repo
        };
        assert_eq!(repo.checkout_ref(), Some("v2"));
    }

    #[test]
    fn empty_secret_name_falls_back_to_literals() {
        let creds = RegistryCredentials {
            enabled: true,
            from_secret: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(creds.secret_name(), None);
    }

    #[test]
    fn registry_uses_camel_case_field_names() {
        let creds: RegistryCredentials = serde_json::from_value(serde_json::json!({
            "enabled": true,
            "fromSecret": "quay-creds"
        }))
        .unwrap();
        assert!(creds.enabled);
        assert_eq!(creds.secret_name(), Some("quay-creds"));

        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["fromSecret"], "quay-creds");
        assert!(json.get("username").is_none());
    }
}
