use crate::constants::API_VERSION;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The `apiVersion` and `kind` of a stored object.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// An object that can be kept in a pharmer store. Stores use `KIND` for error messages and for
/// the `kind` field they stamp on every object they write.
pub trait Object: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn type_meta_mut(&mut self) -> &mut TypeMeta;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn assign_type_kind(&mut self) {
        let type_meta = self.type_meta_mut();
        type_meta.api_version = API_VERSION.to_string();
        type_meta.kind = Self::KIND.to_string();
    }

    /// Replace the status of `self` with the status of `other`. Objects without a status leave
    /// `self` untouched.
    fn copy_status_from(&mut self, _other: &Self) {}
}

/// Implements [`Object`] for a struct with `type_meta` and `metadata` fields.
macro_rules! impl_object {
    ($i:ident, $kind:literal) => {
        impl $crate::meta::Object for $i {
            const KIND: &'static str = $kind;

            fn metadata(&self) -> &$crate::meta::ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.metadata
            }

            fn type_meta_mut(&mut self) -> &mut $crate::meta::TypeMeta {
                &mut self.type_meta
            }
        }
    };
    ($i:ident, $kind:literal, status) => {
        impl $crate::meta::Object for $i {
            const KIND: &'static str = $kind;

            fn metadata(&self) -> &$crate::meta::ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.metadata
            }

            fn type_meta_mut(&mut self) -> &mut $crate::meta::TypeMeta {
                &mut self.type_meta
            }

            fn copy_status_from(&mut self, other: &Self) {
                self.status = other.status.clone();
            }
        }
    };
}
