use clap::{Parser, Subcommand};
use lcinstall::{
    AppInstallationService, AppRegistry, AppReplaceOption, Authenticator, InstallOutcome,
    InstallRequest, LcError, ReplacementDecider, Result, Settings, StoragePaths,
};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lcinstall")]
#[command(about = "LiveContainer-style IPA library manager")]
#[command(version)]
struct Cli {
    /// Private app library root
    #[arg(long, default_value = "apps")]
    library: PathBuf,

    /// Shared app library root
    #[arg(long, default_value = "shared-apps")]
    shared_library: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install an IPA into the library
    Install {
        /// The .ipa/.tipa to install
        input: PathBuf,

        /// Delete the source archive after a successful install
        #[arg(long)]
        delete: bool,

        /// On a bundle-id collision, install as a new copy without asking
        #[arg(long, conflicts_with = "replace")]
        as_new: bool,

        /// On a bundle-id collision, replace the install at this relative path
        #[arg(long)]
        replace: Option<String>,

        /// Skip code signing for this install
        #[arg(long)]
        skip_sign: bool,
    },

    /// List installed apps
    List {
        /// Include the hidden tier (may require authentication)
        #[arg(long)]
        hidden: bool,
    },

    /// Show one installed app, including its configuration
    Info {
        /// Relative bundle path, e.g. com.example.app.app
        path: String,
    },

    /// Delete one installed app from the library
    Remove {
        /// Relative bundle path, e.g. com.example.app.app
        path: String,
    },
}

/// Console authentication stand-in for the biometric gate.
struct ConsoleAuthenticator;

impl Authenticator for ConsoleAuthenticator {
    fn authenticate(&self) -> bool {
        print!("[<] hidden apps are locked. unlock them? [y/N] ");
        let _ = std::io::stdout().flush();

        let mut response = String::new();
        if std::io::stdin().read_line(&mut response).is_err() {
            return false;
        }
        matches!(response.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Resolves duplicate collisions from the command line: an explicit flag
/// when given, an interactive prompt otherwise.
struct ConsoleDecider {
    as_new: bool,
    replace: Option<String>,
}

impl ReplacementDecider for ConsoleDecider {
    fn decide<'a>(
        &self,
        options: &'a [AppReplaceOption<'a>],
    ) -> Option<&'a AppReplaceOption<'a>> {
        if self.as_new {
            return options.first();
        }
        if let Some(ref path) = self.replace {
            let found = options
                .iter()
                .find(|o| o.is_replace && o.folder_to_install == *path);
            if found.is_none() {
                eprintln!("[!] no replaceable install at {}", path);
            }
            return found;
        }

        println!("[?] this app is already installed:");
        for (i, option) in options.iter().enumerate() {
            println!("    [{}] {}", i, option.label());
        }
        print!("[<] choose an option, or press enter to cancel: ");
        let _ = std::io::stdout().flush();

        let mut response = String::new();
        if std::io::stdin().read_line(&mut response).is_err() {
            return None;
        }
        let response = response.trim();
        if response.is_empty() {
            return None;
        }
        response.parse::<usize>().ok().and_then(|i| options.get(i))
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("[!] {}", e);
        if let Some(reason) = e.failure_reason() {
            eprintln!("    {}", reason);
        }
        if let Some(suggestion) = e.recovery_suggestion() {
            eprintln!("    {}", suggestion);
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let paths = StoragePaths::new(&cli.library, &cli.shared_library);
    let settings = Settings::load(&cli.library.join("settings.json"))?;

    match cli.command {
        Commands::Install {
            input,
            delete,
            as_new,
            replace,
            skip_sign,
        } => run_install(paths, settings, input, delete, as_new, replace, skip_sign),
        Commands::List { hidden } => run_list(paths, settings, hidden),
        Commands::Info { path } => run_info(paths, settings, &path),
        Commands::Remove { path } => run_remove(paths, settings, &path),
    }
}

fn no_such_app(path: &str) -> LcError {
    LcError::Unknown {
        message: format!("no installed app at {}", path),
    }
}

fn open_registry(paths: StoragePaths, settings: &Settings) -> Result<AppRegistry> {
    paths.ensure_exist()?;
    AppRegistry::open(
        paths,
        settings.secure_hidden_apps,
        Box::new(ConsoleAuthenticator),
    )
}

#[allow(clippy::too_many_arguments)]
fn run_install(
    paths: StoragePaths,
    settings: Settings,
    input: PathBuf,
    delete: bool,
    as_new: bool,
    replace: Option<String>,
    skip_sign: bool,
) -> Result<()> {
    let mut registry = open_registry(paths.clone(), &settings)?;
    let service = AppInstallationService::new(paths);

    let mut request = InstallRequest::new(&input);
    request.delete_source = delete;

    let decider = ConsoleDecider { as_new, replace };
    let dont_sign_app = settings.dont_sign_app;
    let skip_signing = move |option: Option<&AppReplaceOption>| -> bool {
        skip_sign
            || dont_sign_app
            || option
                .and_then(|o| o.app_to_replace)
                .map(|app| app.dont_sign())
                .unwrap_or(false)
    };

    println!("[*] installing {}...", input.display());
    let outcome = service.install_ipa(
        &request,
        &mut registry,
        &decider,
        &skip_signing,
        &|fraction| {
            print!("\r[*] progress: {:3.0}%", fraction * 100.0);
            let _ = std::io::stdout().flush();
        },
    )?;
    println!();

    match outcome {
        InstallOutcome::Cancelled => {
            println!("[>] installation cancelled.");
        }
        InstallOutcome::Installed(result) => {
            if let Some(replaced) = &result.replaced {
                println!("[*] replaced {}", replaced.relative_bundle_path);
            }
            println!(
                "[*] installed {} ({}) at {}",
                result.app.display_name(),
                result.app.bundle_identifier(),
                result.app.relative_bundle_path()
            );
            // Installed but unsigned is a success with a warning, never
            // a failure.
            if let Some(err) = &result.signing_error {
                println!("[?] app was installed but could not be signed: {}", err);
                if let Some(suggestion) = err.recovery_suggestion() {
                    println!("    {}", suggestion);
                }
            }
        }
    }

    Ok(())
}

fn run_list(paths: StoragePaths, settings: Settings, hidden: bool) -> Result<()> {
    let mut registry = open_registry(paths, &settings)?;

    for app in registry.apps() {
        println!(
            "{}  {}  {}",
            app.relative_bundle_path(),
            app.bundle_identifier(),
            app.version().unwrap_or("-"),
        );
    }

    if hidden {
        if !registry.unlock_hidden() {
            return Err(LcError::Unknown {
                message: "hidden apps remain locked".to_string(),
            });
        }
        for app in registry.hidden_apps() {
            println!(
                "{}  {}  {}  (hidden)",
                app.relative_bundle_path(),
                app.bundle_identifier(),
                app.version().unwrap_or("-"),
            );
        }
    }

    Ok(())
}

fn run_info(paths: StoragePaths, settings: Settings, path: &str) -> Result<()> {
    let registry = open_registry(paths, &settings)?;
    let app = registry.find(path).ok_or_else(|| no_such_app(path))?;

    println!("name:            {}", app.display_name());
    println!("bundle id:       {}", app.bundle_identifier());
    println!("version:         {}", app.version().unwrap_or("-"));
    println!("path:            {}", app.bundle_path().display());
    println!("shared:          {}", app.is_shared());
    println!("hidden:          {}", app.is_hidden());
    println!("locked:          {}", app.is_locked());
    println!("jit needed:      {}", app.is_jit_needed());
    println!("unsigned:        {}", app.dont_sign());
    println!("spoof sdk:       {}", app.spoof_sdk_version());
    println!("data container:  {}", app.data_uuid().unwrap_or("-"));
    println!(
        "language:        {}",
        app.selected_language().unwrap_or("default")
    );

    Ok(())
}

fn run_remove(paths: StoragePaths, settings: Settings, path: &str) -> Result<()> {
    let mut registry = open_registry(paths, &settings)?;

    if registry.find(path).is_none() {
        // It may be hidden; one unlock attempt before giving up.
        registry.unlock_hidden();
    }
    let app = registry.find(path).ok_or_else(|| no_such_app(path))?;
    let bundle_path = app.bundle_path().to_path_buf();
    let name = app.display_name();

    std::fs::remove_dir_all(&bundle_path)?;
    println!("[*] removed {} ({})", name, path);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_install_reports_the_requested_path() {
        let err = no_such_app("com.example.app.app");
        assert_eq!(err.to_string(), "no installed app at com.example.app.app");
    }
}
