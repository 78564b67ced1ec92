// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Process-wide TLS setup.
//!
//! The GitHub client and the S3 SDK pull in two rustls crypto backends. With
//! both compiled in, rustls refuses to pick one on its own, so the process
//! default is installed explicitly before any client is built.

use std::sync::Once;

use tracing::debug;

static INSTALL: Once = Once::new();

/// Installs the ring crypto provider as the process default.
///
/// Safe to call any number of times. A provider installed earlier by someone
/// else is left in place.
pub fn install_crypto_provider()
{
    INSTALL.call_once(|| {
        if rustls::crypto::ring::default_provider().install_default().is_err() {
            debug!("Process crypto provider already installed");
        }
    },);
}

#[cfg(test)]
mod tests
{
    use super::install_crypto_provider;

    #[test]
    fn provider_is_available_after_install()
    {
        install_crypto_provider();
        install_crypto_provider();
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }
}
