use crate::error::{LcError, Result};
use crate::plist_ext::PlistFile;
use plist::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

// Library-specific configuration keys, stored alongside the app's own
// metadata in Info.plist.
const KEY_IS_SHARED: &str = "LCIsShared";
const KEY_IS_HIDDEN: &str = "LCIsHidden";
const KEY_IS_LOCKED: &str = "LCIsLocked";
const KEY_IS_JIT_NEEDED: &str = "LCIsJITNeeded";
const KEY_DONT_SIGN: &str = "LCDontSign";
const KEY_SPOOF_SDK_VERSION: &str = "LCSpoofSDKVersion";
const KEY_DO_SYMLINK_INBOX: &str = "LCDoSymlinkInbox";
const KEY_ORIENTATION_LOCK: &str = "LCOrientationLock";
const KEY_DONT_INJECT_TWEAK_LOADER: &str = "LCDontInjectTweakLoader";
const KEY_HIDE_LIVE_CONTAINER: &str = "LCHideLiveContainer";
const KEY_DONT_LOAD_TWEAK_LOADER: &str = "LCDontLoadTweakLoader";
const KEY_USE_LC_BUNDLE_ID: &str = "LCUseLCBundleId";
const KEY_FIX_FILE_PICKER: &str = "LCFixFilePicker";
const KEY_FIX_LOCAL_NOTIFICATION: &str = "LCFixLocalNotification";
const KEY_SELECTED_LANGUAGE: &str = "LCSelectedLanguage";
const KEY_DATA_UUID: &str = "LCDataUUID";
const KEY_CONTAINER_INFO: &str = "LCContainers";
const KEY_TWEAK_FOLDER: &str = "LCTweakFolder";
const KEY_INSTALLATION_DATE: &str = "LCInstallationDate";
const KEY_LAST_LAUNCHED: &str = "LCLastLaunched";

/// Mutable user configuration carried over when one install replaces
/// another. Excludes `LCDontSign` (decided per install by the skip-signing
/// policy) and `LCInstallationDate` (always re-stamped).
const MIGRATED_KEYS: &[&str] = &[
    KEY_IS_LOCKED,
    KEY_IS_HIDDEN,
    KEY_IS_JIT_NEEDED,
    KEY_IS_SHARED,
    KEY_SPOOF_SDK_VERSION,
    KEY_DO_SYMLINK_INBOX,
    KEY_CONTAINER_INFO,
    KEY_TWEAK_FOLDER,
    KEY_SELECTED_LANGUAGE,
    KEY_DATA_UUID,
    KEY_ORIENTATION_LOCK,
    KEY_DONT_INJECT_TWEAK_LOADER,
    KEY_HIDE_LIVE_CONTAINER,
    KEY_DONT_LOAD_TWEAK_LOADER,
    KEY_USE_LC_BUNDLE_ID,
    KEY_FIX_FILE_PICKER,
    KEY_FIX_LOCAL_NOTIFICATION,
    KEY_LAST_LAUNCHED,
];

/// Compound identity of one installed instance. Bundle identifiers are not
/// unique across installs, so equality needs both components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppIdentity {
    pub bundle_identifier: String,
    pub relative_bundle_path: String,
}

/// One installed or in-flight application, anchored at its bundle
/// directory. Configuration setters write through to Info.plist unless
/// auto-save is suspended.
#[derive(Debug)]
pub struct AppInfo {
    bundle_path: PathBuf,
    relative_bundle_path: String,
    plist: PlistFile,
    auto_save_disabled: bool,
}

impl AppInfo {
    pub fn new<P: AsRef<Path>>(bundle_path: P) -> Result<Self> {
        let bundle_path = bundle_path.as_ref().to_path_buf();
        let plist =
            PlistFile::open(bundle_path.join("Info.plist")).map_err(|e| match e {
                LcError::Io(_) => LcError::AppInfoInitFailed,
                LcError::Plist(_) => LcError::AppInfoInitFailed,
                other => other,
            })?;

        if plist.get_string("CFBundleIdentifier").is_none() {
            return Err(LcError::AppInfoInitFailed);
        }

        let relative_bundle_path = bundle_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            bundle_path,
            relative_bundle_path,
            plist,
            auto_save_disabled: false,
        })
    }

    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    pub fn bundle_identifier(&self) -> &str {
        // Checked at construction.
        self.plist.get_string("CFBundleIdentifier").unwrap_or("")
    }

    pub fn display_name(&self) -> String {
        self.plist
            .get_string("CFBundleDisplayName")
            .or_else(|| self.plist.get_string("CFBundleName"))
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                self.bundle_path
                    .file_stem()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
    }

    pub fn executable_name(&self) -> Option<&str> {
        self.plist.get_string("CFBundleExecutable")
    }

    pub fn version(&self) -> Option<&str> {
        self.plist
            .get_string("CFBundleShortVersionString")
            .or_else(|| self.plist.get_string("CFBundleVersion"))
    }

    pub fn relative_bundle_path(&self) -> &str {
        &self.relative_bundle_path
    }

    pub fn set_relative_bundle_path(&mut self, path: &str) {
        self.relative_bundle_path = path.to_string();
    }

    pub fn identity(&self) -> AppIdentity {
        AppIdentity {
            bundle_identifier: self.bundle_identifier().to_string(),
            relative_bundle_path: self.relative_bundle_path.clone(),
        }
    }

    pub fn set_auto_save_disabled(&mut self, disabled: bool) {
        self.auto_save_disabled = disabled;
    }

    pub fn save(&self) -> Result<()> {
        self.plist.save()
    }

    fn autosave(&self) {
        if !self.auto_save_disabled {
            if let Err(e) = self.plist.save() {
                log::warn!("failed to persist config for {}: {}", self.relative_bundle_path, e);
            }
        }
    }

    fn get_flag(&self, key: &str) -> bool {
        self.plist.get_bool(key).unwrap_or(false)
    }

    fn set_flag(&mut self, key: &str, value: bool) {
        self.plist.set_bool(key, value);
        self.autosave();
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.plist.get_string(key)
    }

    fn set_str(&mut self, key: &str, value: &str) {
        self.plist.set_string(key, value);
        self.autosave();
    }

    pub fn is_shared(&self) -> bool {
        self.get_flag(KEY_IS_SHARED)
    }

    pub fn set_is_shared(&mut self, value: bool) {
        self.set_flag(KEY_IS_SHARED, value)
    }

    pub fn is_hidden(&self) -> bool {
        self.get_flag(KEY_IS_HIDDEN)
    }

    pub fn set_is_hidden(&mut self, value: bool) {
        self.set_flag(KEY_IS_HIDDEN, value)
    }

    pub fn is_locked(&self) -> bool {
        self.get_flag(KEY_IS_LOCKED)
    }

    pub fn set_is_locked(&mut self, value: bool) {
        self.set_flag(KEY_IS_LOCKED, value)
    }

    pub fn is_jit_needed(&self) -> bool {
        self.get_flag(KEY_IS_JIT_NEEDED)
    }

    pub fn set_is_jit_needed(&mut self, value: bool) {
        self.set_flag(KEY_IS_JIT_NEEDED, value)
    }

    pub fn dont_sign(&self) -> bool {
        self.get_flag(KEY_DONT_SIGN)
    }

    pub fn set_dont_sign(&mut self, value: bool) {
        self.set_flag(KEY_DONT_SIGN, value)
    }

    pub fn spoof_sdk_version(&self) -> bool {
        self.get_flag(KEY_SPOOF_SDK_VERSION)
    }

    pub fn set_spoof_sdk_version(&mut self, value: bool) {
        self.set_flag(KEY_SPOOF_SDK_VERSION, value)
    }

    pub fn do_symlink_inbox(&self) -> bool {
        self.get_flag(KEY_DO_SYMLINK_INBOX)
    }

    pub fn set_do_symlink_inbox(&mut self, value: bool) {
        self.set_flag(KEY_DO_SYMLINK_INBOX, value)
    }

    pub fn orientation_lock(&self) -> i64 {
        self.plist.get_integer(KEY_ORIENTATION_LOCK).unwrap_or(0)
    }

    pub fn set_orientation_lock(&mut self, value: i64) {
        self.plist.set_integer(KEY_ORIENTATION_LOCK, value);
        self.autosave();
    }

    pub fn dont_inject_tweak_loader(&self) -> bool {
        self.get_flag(KEY_DONT_INJECT_TWEAK_LOADER)
    }

    pub fn set_dont_inject_tweak_loader(&mut self, value: bool) {
        self.set_flag(KEY_DONT_INJECT_TWEAK_LOADER, value)
    }

    pub fn hide_live_container(&self) -> bool {
        self.get_flag(KEY_HIDE_LIVE_CONTAINER)
    }

    pub fn set_hide_live_container(&mut self, value: bool) {
        self.set_flag(KEY_HIDE_LIVE_CONTAINER, value)
    }

    pub fn dont_load_tweak_loader(&self) -> bool {
        self.get_flag(KEY_DONT_LOAD_TWEAK_LOADER)
    }

    pub fn set_dont_load_tweak_loader(&mut self, value: bool) {
        self.set_flag(KEY_DONT_LOAD_TWEAK_LOADER, value)
    }

    pub fn use_lc_bundle_id(&self) -> bool {
        self.get_flag(KEY_USE_LC_BUNDLE_ID)
    }

    pub fn set_use_lc_bundle_id(&mut self, value: bool) {
        self.set_flag(KEY_USE_LC_BUNDLE_ID, value)
    }

    pub fn fix_file_picker(&self) -> bool {
        self.get_flag(KEY_FIX_FILE_PICKER)
    }

    pub fn set_fix_file_picker(&mut self, value: bool) {
        self.set_flag(KEY_FIX_FILE_PICKER, value)
    }

    pub fn fix_local_notification(&self) -> bool {
        self.get_flag(KEY_FIX_LOCAL_NOTIFICATION)
    }

    pub fn set_fix_local_notification(&mut self, value: bool) {
        self.set_flag(KEY_FIX_LOCAL_NOTIFICATION, value)
    }

    pub fn selected_language(&self) -> Option<&str> {
        self.get_str(KEY_SELECTED_LANGUAGE)
    }

    pub fn set_selected_language(&mut self, value: &str) {
        self.set_str(KEY_SELECTED_LANGUAGE, value)
    }

    pub fn data_uuid(&self) -> Option<&str> {
        self.get_str(KEY_DATA_UUID)
    }

    pub fn set_data_uuid(&mut self, value: &str) {
        self.set_str(KEY_DATA_UUID, value)
    }

    /// Returns the data-container binding, creating a fresh one on first use.
    pub fn ensure_data_uuid(&mut self) -> String {
        if let Some(uuid) = self.data_uuid() {
            return uuid.to_string();
        }
        let uuid = uuid::Uuid::new_v4().to_string();
        self.set_data_uuid(&uuid);
        uuid
    }

    pub fn container_info(&self) -> Option<&Value> {
        self.plist.get(KEY_CONTAINER_INFO)
    }

    pub fn set_container_info(&mut self, value: Value) {
        self.plist.set(KEY_CONTAINER_INFO, value);
        self.autosave();
    }

    pub fn tweak_folder(&self) -> Option<&str> {
        self.get_str(KEY_TWEAK_FOLDER)
    }

    pub fn set_tweak_folder(&mut self, value: &str) {
        self.set_str(KEY_TWEAK_FOLDER, value)
    }

    pub fn installation_date(&self) -> Option<plist::Date> {
        self.plist.get_date(KEY_INSTALLATION_DATE)
    }

    pub fn set_installation_date(&mut self, value: SystemTime) {
        self.plist.set_date(KEY_INSTALLATION_DATE, value.into());
        self.autosave();
    }

    pub fn last_launched(&self) -> Option<plist::Date> {
        self.plist.get_date(KEY_LAST_LAUNCHED)
    }

    pub fn set_last_launched(&mut self, value: SystemTime) {
        self.plist.set_date(KEY_LAST_LAUNCHED, value.into());
        self.autosave();
    }

    /// Copies every user-configured field from a replaced install onto this
    /// one. Auto-save is suspended for the multi-field copy so only the
    /// trailing `save` hits the disk.
    pub fn copy_configuration_from(&mut self, source: &AppInfo) -> Result<()> {
        self.auto_save_disabled = true;
        for key in MIGRATED_KEYS {
            match source.plist.get(key) {
                Some(value) => self.plist.set(key, value.clone()),
                None => {
                    self.plist.remove(key);
                }
            }
        }
        self.auto_save_disabled = false;
        self.save()
    }
}
