//! Compile Gateway API resources into proxy IR.
//!
//! A [Translator] takes a [Resources] snapshot of Gateways, Routes, policies
//! and the objects they reference, and produces:
//!
//! - one [ir::Xds] per Gateway describing listeners, routes and
//!   destinations for a proxy,
//! - one [ir::Infra] per Gateway describing the proxy fleet to deploy,
//! - copies of the input objects with status conditions written back.
//!
//! Translation is a pure function of the snapshot and config. Problems with
//! user configuration are reported in status and never abort a translation.
//!
//! ```no_run
//! use switchyard_core::{Resources, Translator, TranslatorConfig};
//!
//! let config = TranslatorConfig::from_yaml_str("gatewayClassName: eg").unwrap();
//! let yaml = std::fs::read_to_string("gateway.yaml").unwrap();
//! let resources = Resources::from_yaml_str(&yaml, &config).unwrap();
//!
//! let result = Translator::new(config).translate(&resources);
//! for (key, xds) in &result.xds {
//!     println!("{key}: {} http listeners", xds.http.len());
//! }
//! ```

mod config;
mod error;
pub use config::{GroupKind, TranslatorConfig, DEFAULT_CONTROLLER_NAME};
pub use error::{Error, Result};

mod resources;
pub use resources::Resources;

mod translator;
pub use translator::{TranslateResult, Translator};

pub mod hostname;
pub mod ir;
pub mod policy;
pub mod status;

mod contexts;
mod listener;
mod refs;
mod route;
mod sort;
mod tls;

#[cfg(test)]
mod test_util;
