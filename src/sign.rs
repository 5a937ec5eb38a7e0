use crate::app_info::AppInfo;
use apple_codesign::{SigningSettings, UnifiedSigner};
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;

/// Result of one signing attempt. Signing never aborts an installation;
/// the outcome travels back to the pipeline out-of-band.
pub struct SignOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl SignOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Makes an installed bundle executable under the host's code-integrity
/// policy, reporting its own fractional progress.
pub trait CodeSigner {
    fn sign(&self, app: &AppInfo, force_sign: bool, progress: &mut dyn FnMut(f64)) -> SignOutcome;
}

/// Ad-hoc signer for the bundle's main executable (no certificate, no
/// entitlements).
pub struct AdHocSigner;

impl CodeSigner for AdHocSigner {
    fn sign(
        &self,
        app: &AppInfo,
        _force_sign: bool,
        progress: &mut dyn FnMut(f64),
    ) -> SignOutcome {
        progress(0.0);

        let Some(exec_name) = app.executable_name() else {
            return SignOutcome::failed("no CFBundleExecutable in manifest");
        };
        let exec_path = app.bundle_path().join(exec_name);
        if !exec_path.exists() {
            return SignOutcome::failed(format!("main executable missing: {}", exec_name));
        }

        let outcome = match sign_macho_in_place(&exec_path) {
            Ok(()) => SignOutcome::ok(),
            Err(message) => SignOutcome::failed(message),
        };

        progress(1.0);
        outcome
    }
}

fn sign_macho_in_place(path: &Path) -> Result<(), String> {
    let signer = UnifiedSigner::new(SigningSettings::default());

    let temp_file = NamedTempFile::new().map_err(|e| e.to_string())?;
    let temp_path = temp_file.path();

    signer
        .sign_macho(path, temp_path)
        .map_err(|e| format!("Failed to sign: {}", e))?;

    fs::copy(temp_path, path).map_err(|e| e.to_string())?;

    Ok(())
}
