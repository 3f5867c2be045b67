//! # Request Envelopes
//!
//! One envelope per operation. Each carries the target `cluster`, the
//! resource descriptor, a namespace and operation-specific parameters.

use serde::{Deserialize, Serialize};

use crate::descriptor::ResourceDescriptor;
use crate::object::{Object, Options};

/// Envelopes that name the cluster they are meant for.
pub trait ClusterScoped {
    /// The `cluster` tag carried by the envelope.
    fn cluster(&self) -> &str;
}

/// Fetch one object by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRequest {
    pub cluster: String,
    #[serde(rename = "groupVersionResource", alias = "descriptor")]
    pub descriptor: ResourceDescriptor,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(rename = "getOptions", default, deserialize_with = "crate::null_as_default")]
    pub options: Options,
    /// Path segments appended after the name, in order.
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub subresources: Vec<String>,
}

/// List objects of one type in a namespace (empty namespace: all namespaces).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub cluster: String,
    #[serde(rename = "groupVersionResource", alias = "descriptor")]
    pub descriptor: ResourceDescriptor,
    #[serde(default)]
    pub namespace: String,
    #[serde(rename = "listOptions", default, deserialize_with = "crate::null_as_default")]
    pub options: Options,
}

/// Create a caller-supplied object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub cluster: String,
    #[serde(rename = "groupVersionResource", alias = "descriptor")]
    pub descriptor: ResourceDescriptor,
    #[serde(default)]
    pub namespace: String,
    /// The object to create. Not validated by the gateway.
    #[serde(rename = "resource", alias = "object", default, deserialize_with = "crate::null_as_default")]
    pub object: Object,
    #[serde(rename = "createOptions", default, deserialize_with = "crate::null_as_default")]
    pub options: Options,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub subresources: Vec<String>,
}

/// Delete one object by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub cluster: String,
    #[serde(rename = "groupVersionResource", alias = "descriptor")]
    pub descriptor: ResourceDescriptor,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    /// Absent or `null` means store defaults.
    #[serde(rename = "deleteOptions", default)]
    pub options: Option<Options>,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub subresources: Vec<String>,
}

macro_rules! impl_cluster_scoped {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ClusterScoped for $ty {
                fn cluster(&self) -> &str {
                    &self.cluster
                }
            }
        )+
    };
}

impl_cluster_scoped!(GetRequest, ListRequest, CreateRequest, DeleteRequest);
