use crate::app_info::{AppIdentity, AppInfo};
use crate::error::{LcError, Result};
use crate::ipa::{find_app_in_payload, move_bundle, ArchiveExtractor, ZipExtractor};
use crate::progress::InstallProgress;
use crate::registry::{DuplicatesProvider, StoragePaths};
use crate::sign::{AdHocSigner, CodeSigner};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// One choice presented during duplicate resolution. The first option in a
/// choice list is always "install as new"; replace options reference the
/// install they would supersede.
#[derive(Debug, Clone)]
pub struct AppReplaceOption<'a> {
    pub is_replace: bool,
    pub folder_to_install: String,
    pub app_to_replace: Option<&'a AppInfo>,
}

impl AppReplaceOption<'_> {
    pub fn identity(&self) -> Option<AppIdentity> {
        self.app_to_replace.map(|app| app.identity())
    }

    pub fn label(&self) -> String {
        match self.app_to_replace {
            Some(app) => format!(
                "Replace {} ({})",
                app.display_name(),
                app.relative_bundle_path()
            ),
            None => "Install as new".to_string(),
        }
    }
}

/// Presents the replace-or-install-as-new choice. `None` means the user
/// cancelled the installation.
pub trait ReplacementDecider {
    fn decide<'a>(
        &self,
        options: &'a [AppReplaceOption<'a>],
    ) -> Option<&'a AppReplaceOption<'a>>;
}

#[derive(Debug)]
pub struct InstallationResult {
    pub app: AppInfo,
    pub replaced: Option<AppIdentity>,
    pub signing_error: Option<LcError>,
}

/// A cancelled install is a distinct outcome, not a failure.
#[derive(Debug)]
pub enum InstallOutcome {
    Installed(InstallationResult),
    Cancelled,
}

#[derive(Debug)]
pub struct InstallRequest {
    pub source: PathBuf,
    pub delete_source: bool,
    pub force_sign: bool,
}

impl InstallRequest {
    pub fn new<P: AsRef<Path>>(source: P) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            delete_source: false,
            force_sign: false,
        }
    }
}

/// The installation pipeline: extract, locate the bundle, resolve
/// duplicates, relocate, sign, migrate configuration.
pub struct AppInstallationService {
    paths: StoragePaths,
    extractor: Box<dyn ArchiveExtractor>,
    signer: Box<dyn CodeSigner>,
    scratch_root: Option<PathBuf>,
    in_flight: AtomicBool,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AppInstallationService {
    pub fn new(paths: StoragePaths) -> Self {
        Self::with_collaborators(paths, Box::new(ZipExtractor), Box::new(AdHocSigner))
    }

    pub fn with_collaborators(
        paths: StoragePaths,
        extractor: Box<dyn ArchiveExtractor>,
        signer: Box<dyn CodeSigner>,
    ) -> Self {
        Self {
            paths,
            extractor,
            signer,
            scratch_root: None,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Overrides where extraction scratch directories are created.
    pub fn with_scratch_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.scratch_root = Some(root.as_ref().to_path_buf());
        self
    }

    /// Runs one installation end to end. Exactly one install may be in
    /// flight at a time; concurrent calls fail with
    /// `InstallationInProgress`. The progress handler receives
    /// monotonically non-decreasing values in [0, 1] and always ends on
    /// 1.0, whatever the outcome.
    pub fn install_ipa(
        &self,
        request: &InstallRequest,
        duplicates_provider: &mut dyn DuplicatesProvider,
        decider: &dyn ReplacementDecider,
        should_skip_signing: &dyn Fn(Option<&AppReplaceOption>) -> bool,
        progress_handler: &dyn Fn(f64),
    ) -> Result<InstallOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(LcError::InstallationInProgress);
        }
        let _guard = FlightGuard(&self.in_flight);

        let progress = InstallProgress::new(progress_handler);
        let result = self.run_pipeline(
            request,
            duplicates_provider,
            decider,
            should_skip_signing,
            &progress,
        );
        progress.finish();
        result
    }

    fn run_pipeline(
        &self,
        request: &InstallRequest,
        duplicates_provider: &mut dyn DuplicatesProvider,
        decider: &dyn ReplacementDecider,
        should_skip_signing: &dyn Fn(Option<&AppReplaceOption>) -> bool,
        progress: &InstallProgress,
    ) -> Result<InstallOutcome> {
        let source = &request.source;
        log::info!("starting installation from {}", source.display());

        if !source.exists() {
            return Err(LcError::InvalidUrl);
        }
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        if !matches!(ext.as_deref(), Some("ipa") | Some("tipa")) {
            return Err(LcError::NotAnIpa);
        }

        // The scratch dir owns the extracted payload; it is removed on
        // every exit path, including cancellation and panics.
        let scratch = match &self.scratch_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                tempfile::TempDir::new_in(root)?
            }
            None => tempfile::TempDir::new()?,
        };

        self.extractor
            .extract(source, scratch.path(), &mut |f| progress.extraction(f))
            .map_err(|e| match e {
                LcError::InvalidArchive | LcError::StorageFull => e,
                other => LcError::ExtractionFailed {
                    cause: Some(other.to_string()),
                },
            })?;

        let payload = scratch.path().join("Payload");
        let app_folder = find_app_in_payload(&payload).map_err(|e| {
            log::error!("bundle not found inside payload of {}", source.display());
            e
        })?;

        let new_app = AppInfo::new(&app_folder)?;
        let bundle_id = new_app.bundle_identifier().to_string();

        let mut relative_path = format!("{}.app", bundle_id);
        let mut output_folder = self.paths.private_root.join(&relative_path);

        let duplicates = duplicates_provider.duplicates(&bundle_id)?;

        let mut replaced: Option<&AppInfo> = None;
        let mut chosen: Option<&AppReplaceOption> = None;

        let options: Vec<AppReplaceOption>;
        if output_folder.exists() || !duplicates.is_empty() {
            let alternate = self.unique_relative_path(&bundle_id);

            let mut opts = vec![AppReplaceOption {
                is_replace: false,
                folder_to_install: alternate,
                app_to_replace: None,
            }];
            for app in &duplicates {
                opts.push(AppReplaceOption {
                    is_replace: true,
                    folder_to_install: app.relative_bundle_path().to_string(),
                    app_to_replace: Some(app),
                });
            }
            options = opts;

            let Some(option) = decider.decide(&options) else {
                log::info!("installation cancelled by user for {}", bundle_id);
                return Ok(InstallOutcome::Cancelled);
            };

            replaced = option.app_to_replace;
            relative_path = option.folder_to_install.clone();
            let shared = replaced.map(|app| app.is_shared()).unwrap_or(false);
            output_folder = self.paths.root_for(shared).join(&relative_path);
            if option.is_replace && output_folder.exists() {
                fs::remove_dir_all(&output_folder)?;
            }
            chosen = Some(option);
        }

        self.paths.ensure_exist()?;
        move_bundle(&app_folder, &output_folder)?;

        let mut final_app = AppInfo::new(&output_folder)?;
        final_app.set_relative_bundle_path(&relative_path);

        if should_skip_signing(chosen) {
            final_app.set_dont_sign(true);
        }

        // Never abort on a signing failure: the app stays installed,
        // unsigned if necessary, and the error rides in the result.
        let signing_error = if final_app.dont_sign() && !request.force_sign {
            progress.signing(1.0);
            None
        } else {
            let outcome = self.signer.sign(&final_app, request.force_sign, &mut |f| {
                progress.signing(f)
            });
            if outcome.success {
                None
            } else {
                let err = LcError::from_signer_message(outcome.message.as_deref());
                log::error!("signing failed for {}: {}", bundle_id, err);
                Some(err)
            }
        };

        if let Some(old) = replaced {
            final_app.copy_configuration_from(old)?;
        } else {
            // New installs spoof the SDK version by default and get a
            // fresh data container.
            final_app.set_auto_save_disabled(true);
            final_app.set_spoof_sdk_version(true);
            final_app.ensure_data_uuid();
            final_app.set_auto_save_disabled(false);
        }
        final_app.set_installation_date(SystemTime::now());
        final_app.save()?;

        if request.delete_source {
            let _ = fs::remove_file(source);
        }

        log::info!("installation finished for {}", final_app.display_name());

        Ok(InstallOutcome::Installed(InstallationResult {
            replaced: replaced.map(|app| app.identity()),
            app: final_app,
            signing_error,
        }))
    }

    /// Computes a non-colliding relative path for an install-as-new,
    /// suffixing the bundle identifier with the current time and bumping
    /// until no directory under either root claims it.
    fn unique_relative_path(&self, bundle_id: &str) -> String {
        let mut stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        loop {
            let candidate = format!("{}_{}.app", bundle_id, stamp);
            if !self.paths.private_root.join(&candidate).exists()
                && !self.paths.shared_root.join(&candidate).exists()
            {
                return candidate;
            }
            stamp += 1;
        }
    }
}
