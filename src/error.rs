use thiserror::Error;

#[derive(Error, Debug)]
pub enum LcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Installation errors
    #[error("Failed to extract IPA archive{}", .cause.as_deref().map(|c| format!(": {}", c)).unwrap_or_default())]
    ExtractionFailed { cause: Option<String> },

    #[error("Invalid or corrupted IPA file")]
    InvalidArchive,

    #[error("App bundle not found in archive")]
    BundleNotFound,

    #[error("Cannot read app Info.plist")]
    InfoPlistUnreadable,

    #[error("Failed to initialize app information")]
    AppInfoInitFailed,

    #[error("Invalid URL")]
    InvalidUrl,

    #[error("File is not an IPA")]
    NotAnIpa,

    #[error("Insufficient storage space")]
    StorageFull,

    #[error("App is already installed")]
    DuplicateApp,

    #[error("Another installation is already in progress")]
    InstallationInProgress,

    // Signing errors
    #[error("Signing certificate has expired")]
    CertificateExpired,

    #[error("No signing certificate found")]
    CertificateNotFound,

    #[error("Certificate password not available")]
    CertificatePasswordMissing,

    #[error("Code signing failed: {reason}")]
    SigningFailed { reason: String },

    #[error("32-bit apps are not supported")]
    Bit32NotSupported,

    // Launch errors
    #[error("App data container not found")]
    ContainerNotFound,

    #[error("JIT is not enabled")]
    JitNotEnabled,

    #[error("Failed to enable JIT")]
    JitEnablementFailed,

    #[error("App is already running")]
    AppAlreadyRunning,

    // Multitask errors
    #[error("Multitasking is not available")]
    MultitaskNotAvailable,

    #[error("App must be in the shared library for multitasking")]
    SharedAppRequired,

    #[error("{message}")]
    Unknown { message: String },
}

impl LcError {
    pub fn failure_reason(&self) -> Option<&'static str> {
        match self {
            LcError::ExtractionFailed { .. } => {
                Some("The archive may be corrupted or use unsupported compression")
            }
            LcError::InvalidArchive => Some("The file is not a valid iOS application archive"),
            LcError::StorageFull => Some("Not enough free space to install this app"),
            LcError::CertificateExpired => Some("Your development certificate is no longer valid"),
            LcError::CertificateNotFound => Some("Import a certificate to enable JIT-less signing"),
            LcError::JitNotEnabled => Some("This app requires JIT compilation to run"),
            LcError::Bit32NotSupported => {
                Some("This device or OS version cannot run 32-bit applications")
            }
            _ => None,
        }
    }

    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            LcError::StorageFull => {
                Some("Free up storage space by deleting unused apps or data, then try again")
            }
            LcError::CertificateExpired
            | LcError::CertificateNotFound
            | LcError::CertificatePasswordMissing => {
                Some("Import or refresh your signing certificate, then try again")
            }
            LcError::JitNotEnabled | LcError::JitEnablementFailed => {
                Some("Configure a JIT enabler, or set up JIT-less signing instead")
            }
            LcError::InvalidArchive | LcError::ExtractionFailed { .. } => {
                Some("Try downloading the IPA again, or use a different source")
            }
            LcError::InfoPlistUnreadable | LcError::BundleNotFound => {
                Some("The app may be corrupted. Try reinstalling it")
            }
            LcError::MultitaskNotAvailable => {
                Some("Enable multitasking in settings, or use a compatible device")
            }
            LcError::SharedAppRequired => {
                Some("Move this app to the shared library to use multitasking features")
            }
            _ => None,
        }
    }

    /// Best-effort bridge from free-text signer messages to typed kinds.
    /// The substring rules are deliberately not exhaustive; anything
    /// unrecognized falls through to `SigningFailed`.
    pub fn from_signer_message(message: Option<&str>) -> LcError {
        let Some(message) = message else {
            return LcError::SigningFailed {
                reason: "Unknown signing error".to_string(),
            };
        };

        let lower = message.to_lowercase();
        if lower.contains("no certificate") || lower.contains("certificate not found") {
            LcError::CertificateNotFound
        } else if lower.contains("certificate")
            && (lower.contains("expired") || lower.contains("invalid"))
        {
            LcError::CertificateExpired
        } else if lower.contains("32-bit") {
            LcError::Bit32NotSupported
        } else {
            LcError::SigningFailed {
                reason: message.to_string(),
            }
        }
    }

    /// Bridge for legacy string-keyed errors from lower-level collaborators.
    pub fn from_legacy_string(message: &str) -> LcError {
        if message.contains("bundle not found") {
            LcError::BundleNotFound
        } else if message.contains("cannot read Info.plist") {
            LcError::InfoPlistUnreadable
        } else if message.contains("app info init") {
            LcError::AppInfoInitFailed
        } else if message.contains("invalid url") {
            LcError::InvalidUrl
        } else if message.contains("not an ipa") {
            LcError::NotAnIpa
        } else if message.contains("no certificate") {
            LcError::CertificateNotFound
        } else if message.contains("32-bit") {
            LcError::Bit32NotSupported
        } else if message.contains("extraction failed") {
            LcError::ExtractionFailed { cause: None }
        } else {
            LcError::Unknown {
                message: message.to_string(),
            }
        }
    }

    /// Re-interpret filesystem errors that mean the disk is full.
    pub fn from_fs_error(err: std::io::Error) -> LcError {
        // ENOSPC
        if err.raw_os_error() == Some(28) {
            LcError::StorageFull
        } else {
            LcError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, LcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_message_maps_missing_certificate() {
        let err = LcError::from_signer_message(Some("no certificate found in keychain"));
        assert!(matches!(err, LcError::CertificateNotFound));
    }

    #[test]
    fn signer_message_maps_expired_certificate() {
        let err = LcError::from_signer_message(Some("the certificate has expired"));
        assert!(matches!(err, LcError::CertificateExpired));

        let err = LcError::from_signer_message(Some("certificate is invalid for signing"));
        assert!(matches!(err, LcError::CertificateExpired));
    }

    #[test]
    fn signer_message_maps_32bit() {
        let err = LcError::from_signer_message(Some("32-bit app is NOT supported"));
        assert!(matches!(err, LcError::Bit32NotSupported));
    }

    #[test]
    fn unrecognized_signer_message_falls_through() {
        let err = LcError::from_signer_message(Some("entitlement mismatch"));
        match err {
            LcError::SigningFailed { reason } => assert_eq!(reason, "entitlement mismatch"),
            other => panic!("expected SigningFailed, got {:?}", other),
        }
    }

    #[test]
    fn absent_signer_message_falls_through() {
        let err = LcError::from_signer_message(None);
        assert!(matches!(err, LcError::SigningFailed { .. }));
    }

    #[test]
    fn legacy_string_falls_through_to_unknown() {
        let err = LcError::from_legacy_string("something nobody has seen before");
        match err {
            LcError::Unknown { message } => {
                assert_eq!(message, "something nobody has seen before")
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn recovery_suggestions_cover_certificate_errors() {
        assert!(LcError::CertificateNotFound.recovery_suggestion().is_some());
        assert!(LcError::CertificateExpired.recovery_suggestion().is_some());
        assert!(LcError::StorageFull.failure_reason().is_some());
        assert!(LcError::BundleNotFound.failure_reason().is_none());
    }
}
