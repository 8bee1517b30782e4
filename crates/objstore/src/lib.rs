#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Remote object store access for the app framework pipeline
//!
//! The pipeline never speaks a storage protocol itself. Providers plug in
//! through the [`ObjectStoreClient`] trait and a tag-keyed
//! [`ProviderRegistry`]; the reconciler (or a test) registers the
//! constructors it wants available. The [`ObjectStoreManager`] binds a
//! client to one volume and app source location.

mod client;
mod manager;
pub mod mock;
mod registry;

pub use client::{ObjectStoreClient, ObjectStream, RemoteObject, RemoteVolumeCredentials};
pub use manager::ObjectStoreManager;
pub use registry::{ClientFactory, ProviderRegistry};
