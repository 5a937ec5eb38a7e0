pub mod app_info;
pub mod error;
pub mod install;
pub mod ipa;
pub mod plist_ext;
pub mod progress;
pub mod registry;
pub mod settings;
pub mod sign;

pub use app_info::{AppIdentity, AppInfo};
pub use error::{LcError, Result};
pub use install::{
    AppInstallationService, AppReplaceOption, InstallOutcome, InstallRequest, InstallationResult,
    ReplacementDecider,
};
pub use ipa::{ArchiveExtractor, ZipExtractor};
pub use plist_ext::PlistFile;
pub use progress::InstallProgress;
pub use registry::{AlwaysAllow, AppRegistry, Authenticator, DuplicatesProvider, StoragePaths};
pub use settings::Settings;
pub use sign::{AdHocSigner, CodeSigner, SignOutcome};
