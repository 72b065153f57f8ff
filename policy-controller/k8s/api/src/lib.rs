#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod policy;

pub use k8s_gateway_api as gateway;
pub use k8s_openapi::{
    api,
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
};
pub use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, ResourceExt},
    Client, Error, Resource,
};
