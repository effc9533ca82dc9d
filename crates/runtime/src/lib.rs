//! Chromium runtime for verifyd.
//!
//! Provides a [`ChromiumProvider`] that launches one headless browser per
//! session and a [`CdpPageVerifier`] that answers availability checks by
//! loading a service's lookup page over the DevTools HTTP endpoint.

pub mod browser_finder;
pub mod cdp;
pub mod error;
pub mod launcher;
pub mod page_verifier;
pub mod process;

pub use cdp::{CdpClient, CdpTarget, CdpVersionInfo};
pub use error::{Result, RuntimeError};
pub use launcher::{ChromiumConfig, ChromiumProvider, ChromiumSession, chrome_args};
pub use page_verifier::{CdpPageVerifier, IDENTIFIER_PLACEHOLDER, PageCheck};
