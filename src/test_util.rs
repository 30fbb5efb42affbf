use std::fs;
use std::path::Path;
use std::sync::Mutex;

static HOME_LOCK: Mutex<()> = Mutex::new(());

/// Points `HOME` at a throwaway directory for the duration of `check`. When
/// `local` is given it is written as `.layout-annotator/settings.local.toml`
/// before `check` runs.
pub(crate) fn with_annotator_home<R>(local: Option<&str>, check: impl FnOnce(&Path) -> R) -> R {
    let _guard = HOME_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let home = tempfile::tempdir().expect("temporary home");
    if let Some(local) = local {
        let dir = home.path().join(".layout-annotator");
        fs::create_dir_all(&dir).expect("settings directory");
        fs::write(dir.join("settings.local.toml"), local).expect("local settings");
    }
    let previous = std::env::var_os("HOME");
    // SAFETY: HOME is only written while HOME_LOCK is held.
    unsafe { std::env::set_var("HOME", home.path()) };
    let result = check(home.path());
    // SAFETY: as above.
    unsafe {
        match previous {
            Some(value) => std::env::set_var("HOME", value),
            None => std::env::remove_var("HOME"),
        }
    }
    result
}
