use crate::app_info::AppInfo;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// The two storage tiers an app can live under.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub private_root: PathBuf,
    pub shared_root: PathBuf,
}

impl StoragePaths {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(private_root: P, shared_root: Q) -> Self {
        Self {
            private_root: private_root.as_ref().to_path_buf(),
            shared_root: shared_root.as_ref().to_path_buf(),
        }
    }

    pub fn root_for(&self, shared: bool) -> &Path {
        if shared {
            &self.shared_root
        } else {
            &self.private_root
        }
    }

    pub fn ensure_exist(&self) -> Result<()> {
        fs::create_dir_all(&self.private_root)?;
        fs::create_dir_all(&self.shared_root)?;
        Ok(())
    }
}

/// Gate for the hidden tier. Implementations ask the user for biometrics,
/// a passcode, or a console confirmation; `false` means declined or failed.
pub trait Authenticator {
    fn authenticate(&self) -> bool;
}

pub struct AlwaysAllow;

impl Authenticator for AlwaysAllow {
    fn authenticate(&self) -> bool {
        true
    }
}

/// Queries the live registry for installs matching a bundle identifier,
/// performing the hidden-tier authentication gate when needed.
pub trait DuplicatesProvider {
    fn duplicates(&mut self, bundle_identifier: &str) -> Result<Vec<AppInfo>>;
}

/// The installed-applications registry: every `*.app` directory under the
/// two storage roots, partitioned into visible and hidden lists.
pub struct AppRegistry {
    paths: StoragePaths,
    authenticator: Box<dyn Authenticator>,
    secure_hidden: bool,
    hidden_unlocked: bool,
    apps: Vec<AppInfo>,
    hidden_apps: Vec<AppInfo>,
}

impl AppRegistry {
    pub fn open(
        paths: StoragePaths,
        secure_hidden: bool,
        authenticator: Box<dyn Authenticator>,
    ) -> Result<Self> {
        let mut registry = Self {
            paths,
            authenticator,
            secure_hidden,
            hidden_unlocked: false,
            apps: Vec::new(),
            hidden_apps: Vec::new(),
        };
        registry.reload()?;
        Ok(registry)
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn reload(&mut self) -> Result<()> {
        self.apps.clear();
        self.hidden_apps.clear();

        for root in [&self.paths.private_root, &self.paths.shared_root] {
            if !root.exists() {
                continue;
            }
            for entry in fs::read_dir(root)? {
                let entry = entry?;
                let path = entry.path();
                if !path.is_dir() || path.extension().map(|e| e != "app").unwrap_or(true) {
                    continue;
                }
                match AppInfo::new(&path) {
                    Ok(app) => {
                        if app.is_hidden() {
                            self.hidden_apps.push(app);
                        } else {
                            self.apps.push(app);
                        }
                    }
                    Err(e) => {
                        log::warn!("skipping unreadable bundle {}: {}", path.display(), e);
                    }
                }
            }
        }

        Ok(())
    }

    pub fn apps(&self) -> &[AppInfo] {
        &self.apps
    }

    pub fn hidden_apps(&self) -> &[AppInfo] {
        &self.hidden_apps
    }

    pub fn is_hidden_unlocked(&self) -> bool {
        self.hidden_unlocked || !self.secure_hidden
    }

    /// Unlocks the hidden tier for this session. Returns whether the tier
    /// is now accessible.
    pub fn unlock_hidden(&mut self) -> bool {
        if self.is_hidden_unlocked() {
            return true;
        }
        if self.authenticator.authenticate() {
            self.hidden_unlocked = true;
        }
        self.hidden_unlocked
    }

    /// Finds one install by relative bundle path, across both tiers. The
    /// hidden tier is only consulted once unlocked.
    pub fn find(&self, relative_bundle_path: &str) -> Option<&AppInfo> {
        self.apps
            .iter()
            .find(|a| a.relative_bundle_path() == relative_bundle_path)
            .or_else(|| {
                if self.is_hidden_unlocked() {
                    self.hidden_apps
                        .iter()
                        .find(|a| a.relative_bundle_path() == relative_bundle_path)
                } else {
                    None
                }
            })
    }
}

impl DuplicatesProvider for AppRegistry {
    fn duplicates(&mut self, bundle_identifier: &str) -> Result<Vec<AppInfo>> {
        let visible: Vec<&AppInfo> = self
            .apps
            .iter()
            .filter(|a| a.bundle_identifier() == bundle_identifier)
            .collect();

        let matches: Vec<PathBuf> = if !visible.is_empty() {
            visible.iter().map(|a| a.bundle_path().to_path_buf()).collect()
        } else {
            let hidden: Vec<PathBuf> = self
                .hidden_apps
                .iter()
                .filter(|a| a.bundle_identifier() == bundle_identifier)
                .map(|a| a.bundle_path().to_path_buf())
                .collect();

            // A hidden match behind a locked tier needs authentication
            // before it may be treated as a duplicate candidate. Declined
            // or failed auth means "install as new", not an error.
            if !hidden.is_empty() && !self.is_hidden_unlocked() && !self.unlock_hidden() {
                log::info!(
                    "hidden duplicate for {} ignored: authentication declined",
                    bundle_identifier
                );
                return Ok(Vec::new());
            }
            hidden
        };

        // Fresh descriptors so the caller owns them independently of the
        // registry's lists.
        matches.into_iter().map(AppInfo::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plist::Value;

    struct AlwaysDeny;

    impl Authenticator for AlwaysDeny {
        fn authenticate(&self) -> bool {
            false
        }
    }

    fn make_bundle(root: &Path, name: &str, bundle_id: &str, hidden: bool) {
        let bundle = root.join(name);
        fs::create_dir_all(&bundle).unwrap();
        let mut data = plist::Dictionary::new();
        data.insert(
            "CFBundleIdentifier".to_string(),
            Value::String(bundle_id.to_string()),
        );
        if hidden {
            data.insert("LCIsHidden".to_string(), Value::Boolean(true));
        }
        plist::to_file_xml(bundle.join("Info.plist"), &data).unwrap();
    }

    fn paths(tmp: &Path) -> StoragePaths {
        let paths = StoragePaths::new(tmp.join("apps"), tmp.join("shared"));
        paths.ensure_exist().unwrap();
        paths
    }

    #[test]
    fn scan_partitions_visible_and_hidden() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = paths(tmp.path());
        make_bundle(&paths.private_root, "a.app", "com.example.a", false);
        make_bundle(&paths.private_root, "b.app", "com.example.b", true);
        make_bundle(&paths.shared_root, "c.app", "com.example.c", false);

        let registry = AppRegistry::open(paths, true, Box::new(AlwaysAllow)).unwrap();
        assert_eq!(registry.apps().len(), 2);
        assert_eq!(registry.hidden_apps().len(), 1);
    }

    #[test]
    fn unreadable_bundles_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = paths(tmp.path());
        make_bundle(&paths.private_root, "good.app", "com.example.good", false);
        fs::create_dir_all(paths.private_root.join("broken.app")).unwrap();

        let registry = AppRegistry::open(paths, true, Box::new(AlwaysAllow)).unwrap();
        assert_eq!(registry.apps().len(), 1);
    }

    #[test]
    fn visible_duplicates_found_without_authentication() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = paths(tmp.path());
        make_bundle(&paths.private_root, "a.app", "com.example.a", false);

        let mut registry = AppRegistry::open(paths, true, Box::new(AlwaysDeny)).unwrap();
        let dups = registry.duplicates("com.example.a").unwrap();
        assert_eq!(dups.len(), 1);
    }

    #[test]
    fn locked_hidden_duplicate_needs_authentication() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = paths(tmp.path());
        make_bundle(&paths.private_root, "a.app", "com.example.a", true);

        let mut denied =
            AppRegistry::open(paths.clone(), true, Box::new(AlwaysDeny)).unwrap();
        assert!(denied.duplicates("com.example.a").unwrap().is_empty());

        let mut allowed = AppRegistry::open(paths, true, Box::new(AlwaysAllow)).unwrap();
        assert_eq!(allowed.duplicates("com.example.a").unwrap().len(), 1);
        // session stays unlocked afterwards
        assert!(allowed.is_hidden_unlocked());
    }

    #[test]
    fn insecure_hidden_tier_skips_the_gate() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = paths(tmp.path());
        make_bundle(&paths.private_root, "a.app", "com.example.a", true);

        let mut registry = AppRegistry::open(paths, false, Box::new(AlwaysDeny)).unwrap();
        assert_eq!(registry.duplicates("com.example.a").unwrap().len(), 1);
    }
}
