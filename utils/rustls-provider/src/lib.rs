use std::sync::Once;

/// Installs `ring` as the process-wide rustls crypto provider, once.
///
/// Must run before the first `wss://` connect or HTTPS upload: rustls refuses
/// to pick a provider on its own when more than one is compiled in.
pub fn ensure_rustls_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
