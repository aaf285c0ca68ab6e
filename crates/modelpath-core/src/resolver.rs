//! Resolution of 3D model file references against an ordered search path
//! list.
//!
//! A reference may be an absolute path, a path starting with an environment
//! variable token, a `:ALIAS:relative/path` short form, or a bare relative
//! path tried against the project directory and the configured search
//! paths in order. `shorten` performs the inverse mapping back to the
//! shortest alias form.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config;
use crate::envvar::{expand_env_tokens, leading_env_token, starts_with_env_token};
use crate::search_path::{PathKind, SearchPathEntry};
use crate::{
    DefaultFileSystem, EnvProvider, FileSystem, SystemEnv, CFG_FILENAME, CFG_VERSION,
    LEGACY_MODELS_VAR, PROJECT_VAR,
};

const WARN_ENVPATH: u32 = 1 << 0;
const WARN_RELPATH: u32 = 1 << 1;
const WARN_ALIAS: u32 = 1 << 2;

/// Mutable resolver state. Guarded by the single lock in
/// [`FilenameResolver`]; helpers named `*_locked` expect the lock to be
/// held by the calling public method.
struct ResolverState {
    config_dir: PathBuf,
    project_dir: PathBuf,
    paths: Vec<SearchPathEntry>,
    initialized: bool,
    warn_flags: u32,
}

/// Search path manager and filename resolver.
///
/// Safe to share across threads; every public method takes the internal
/// lock once. Lookup failures return `None`/`false` and log at most one
/// warning per failure class over the resolver's lifetime.
pub struct FilenameResolver {
    state: Mutex<ResolverState>,
    fs: Arc<dyn FileSystem>,
    env: Arc<dyn EnvProvider>,
}

/// Expansion environment layering the synthetic project variable over the
/// host provider. `${KIPRJMOD}` is owned by the resolver, not the process
/// environment.
struct ProjectEnv<'a> {
    project: &'a Path,
    inner: &'a dyn EnvProvider,
}

impl EnvProvider for ProjectEnv<'_> {
    fn get(&self, name: &str) -> Option<String> {
        if name == PROJECT_VAR && !self.project.as_os_str().is_empty() {
            return Some(self.project.to_string_lossy().into_owned());
        }
        self.inner.get(name)
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.inner.vars()
    }
}

impl FilenameResolver {
    pub fn new(fs: Arc<dyn FileSystem>, env: Arc<dyn EnvProvider>) -> Self {
        Self {
            state: Mutex::new(ResolverState {
                config_dir: PathBuf::new(),
                project_dir: PathBuf::new(),
                paths: Vec::new(),
                initialized: false,
                warn_flags: 0,
            }),
            fs,
            env,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the directory holding the persisted search path configuration.
    /// The directory may contain environment variable references and must
    /// exist. Builds the path list on first use; an already-built list is
    /// left untouched.
    pub fn set_config_dir(&self, dir: &str) -> bool {
        let mut st = self.lock();

        let expanded = self.expand_dir(&st, dir);
        if expanded.is_empty() {
            log::warn!("Invalid configuration directory: {dir}");
            return false;
        }

        st.config_dir = PathBuf::from(expanded);

        if !st.initialized {
            self.create_path_list_locked(&mut st);
        }

        true
    }

    pub fn config_dir(&self) -> PathBuf {
        self.lock().config_dir.clone()
    }

    /// Set the current project directory, backing the entry at the front
    /// of the path list. Returns `(ok, changed)`; redundant calls report
    /// `changed == false`.
    pub fn set_project_dir(&self, dir: &str) -> (bool, bool) {
        let mut st = self.lock();

        let expanded = self.expand_dir(&st, dir);
        if expanded.is_empty() {
            return (false, false);
        }

        st.project_dir = PathBuf::from(&expanded);

        let changed = if st.paths.is_empty() {
            st.paths.push(project_entry(&expanded));
            true
        } else if st.paths[0].path_expanded != expanded {
            st.paths[0].path_expanded = expanded;
            true
        } else {
            false
        };

        (true, changed)
    }

    pub fn project_dir(&self) -> PathBuf {
        self.lock().project_dir.clone()
    }

    /// Resolve a model file reference to an absolute path of an existing
    /// file, or `None`.
    ///
    /// The fallback order is user visible and deliberate: a plain absolute
    /// path is checked directly with no fallback; an environment token is
    /// expanded and either resolves or fails outright; a bare relative
    /// name is tried against the project directory, then the legacy system
    /// model directory; an aliased name is looked up among the configured
    /// aliases, first match wins.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }

        let mut st = self.lock();
        self.ensure_initialized_locked(&mut st);

        // Classified once, from the original text; expansion below must
        // not change which branch the input takes.
        let kind = PathKind::of(name);
        let mut work = self.normalize_separators(name);

        if kind == PathKind::EnvVar {
            work = self.expand_tokens(&st, &work);
        }

        match kind {
            PathKind::Absolute => {
                let path = Path::new(&work);
                if self.fs.is_file(path) {
                    return self.fs.canonicalize(path).ok();
                }
                return None;
            }
            PathKind::EnvVar | PathKind::Relative => {
                let path = Path::new(&work);
                if self.fs.is_file(path) {
                    let resolved = self.fs.canonicalize(path).ok();
                    if kind == PathKind::EnvVar {
                        // Remember the variable so shorten() can produce
                        // the token form later.
                        self.check_env_var_path_locked(&mut st, name);
                    }
                    if resolved.is_some() {
                        return resolved;
                    }
                }
            }
            PathKind::Aliased => {}
        }

        if kind == PathKind::EnvVar {
            self.warn_once(
                &mut st,
                WARN_ENVPATH,
                &format!("No such path; ensure the environment variable is defined: {name}"),
            );
            return None;
        }

        if kind == PathKind::Relative {
            // Project-local files override every configured alias.
            if let Some(found) = st
                .paths
                .first()
                .filter(|e| !e.path_expanded.is_empty())
                .and_then(|e| self.try_under(&e.path_expanded, &work))
            {
                return Some(found);
            }

            let legacy = format!("${{{LEGACY_MODELS_VAR}}}");
            if let Some(found) = st
                .paths
                .iter()
                .find(|e| e.alias == legacy)
                .filter(|e| !e.path_expanded.is_empty())
                .and_then(|e| self.try_under(&e.path_expanded, &work))
            {
                return Some(found);
            }
        }

        let Some((alias, relpath)) = split_alias(name) else {
            let msg = format!("No such path: {work}");
            self.warn_once(&mut st, WARN_RELPATH, &msg);
            return None;
        };

        let relpath = self.normalize_separators(&relpath);
        let mut alias_found = false;

        for entry in st.paths.iter().skip_while(|e| e.is_env_backed()) {
            if entry.alias != alias {
                continue;
            }

            alias_found = true;

            if entry.path_expanded.is_empty() {
                continue;
            }

            let mut candidate =
                format!("{}{}{}", entry.path_expanded, self.fs.separator(), relpath);
            if starts_with_env_token(&candidate) {
                candidate = self.expand_tokens(&st, &candidate);
            }

            let path = Path::new(&candidate);
            if self.fs.is_file(path) {
                if let Ok(full) = self.fs.canonicalize(path) {
                    return Some(full);
                }
            }
        }

        // An alias that exists but holds no such file is an expected
        // outcome, not a configuration problem.
        if !alias_found {
            let stripped = work.strip_prefix(':').unwrap_or(&work);
            let msg = format!("No such path; ensure the path alias is defined: {stripped}");
            self.warn_once(&mut st, WARN_ALIAS, &msg);
        }

        None
    }

    /// Map an absolute path back to its shortest alias form: `${VAR}/rest`
    /// for environment backed entries, `:ALIAS:rest` for user aliases.
    /// Environment backed entries are re-expanded on every call since
    /// their value may have changed since the list was built. Without a
    /// matching entry the input is returned with separators normalized
    /// to `/`.
    pub fn shorten(&self, full_path: &str) -> String {
        let mut st = self.lock();
        self.ensure_initialized_locked(&mut st);

        let sep = self.fs.separator();

        for entry in &st.paths {
            let dir = if entry.is_env_backed() {
                let expanded = self.expand_tokens(&st, &entry.path_var);
                if expanded.is_empty() {
                    continue;
                }
                self.strip_trailing_separator(&self.normalize_separators(&expanded))
            } else {
                entry.path_expanded.clone()
            };

            if dir.is_empty() {
                continue;
            }

            let prefix = format!("{dir}{sep}");
            if let Some(rest) = full_path.strip_prefix(&prefix) {
                let rest = self.to_slashes(rest);
                return if entry.is_env_backed() {
                    format!("{}/{}", entry.alias, rest)
                } else {
                    format!(":{}:{}", entry.alias, rest)
                };
            }
        }

        self.to_slashes(full_path)
    }

    /// Validated insertion of a search path entry. The configured path is
    /// expanded and checked; when the directory does not exist the entry
    /// is kept with an empty expanded path. Duplicate alias names are
    /// rejected and leave the list unchanged.
    pub fn add_path(&self, entry: &SearchPathEntry) -> bool {
        let mut st = self.lock();
        self.ensure_initialized_locked(&mut st);
        self.add_path_locked(&mut st, entry)
    }

    /// Replace every user alias with `entries`, keeping the regenerated
    /// environment backed run at the front, then persist the result.
    pub fn update_path_list(&self, entries: &[SearchPathEntry]) -> bool {
        let mut st = self.lock();
        self.ensure_initialized_locked(&mut st);

        let keep = st.paths.iter().take_while(|e| e.is_env_backed()).count();
        st.paths.truncate(keep);

        for entry in entries {
            if entry.is_env_backed() {
                continue;
            }
            self.add_path_locked(&mut st, entry);
        }

        self.write_config_locked(&st)
    }

    /// Snapshot of the ordered search path list.
    pub fn paths(&self) -> Vec<SearchPathEntry> {
        let mut st = self.lock();
        self.ensure_initialized_locked(&mut st);
        st.paths.clone()
    }

    fn ensure_initialized_locked(&self, st: &mut ResolverState) {
        if !st.initialized {
            self.create_path_list_locked(st);
        }
    }

    /// Seed the path list: the project entry first, then the environment
    /// variables known to the host, then the user aliases from the
    /// configuration file.
    fn create_path_list_locked(&self, st: &mut ResolverState) {
        if st.paths.is_empty() {
            let dir = st.project_dir.to_string_lossy().into_owned();
            st.paths.push(project_entry(&dir));
        }

        for (name, _) in self.env.vars() {
            if name == PROJECT_VAR {
                continue;
            }

            let token = format!("${{{name}}}");
            let mut entry = SearchPathEntry::new(token.clone(), token, "");
            entry.path_expanded = self.expand_dir(st, &entry.path_var);
            st.paths.push(entry);
        }

        if !st.config_dir.as_os_str().is_empty() {
            self.read_config_locked(st);
        }

        st.initialized = true;
        log::debug!("Search path list built with {} entries", st.paths.len());
    }

    fn read_config_locked(&self, st: &mut ResolverState) {
        let cfg_path = st.config_dir.join(CFG_FILENAME);

        if !self.fs.is_file(&cfg_path) {
            log::debug!("No search path configuration at {}", cfg_path.display());
            return;
        }

        match config::read_path_list(&cfg_path) {
            Ok((version, entries)) => {
                for entry in &entries {
                    self.add_path_locked(st, entry);
                }

                if version < CFG_VERSION {
                    // One-time migration: re-serialize in the current
                    // format, data unchanged.
                    if let Err(e) = config::write_path_list(&cfg_path, &st.paths) {
                        log::warn!("{e:#}");
                    }
                }
            }
            Err(e) => log::warn!("{e:#}"),
        }
    }

    fn add_path_locked(&self, st: &mut ResolverState, entry: &SearchPathEntry) -> bool {
        if entry.alias.is_empty() || entry.path_var.is_empty() {
            return false;
        }

        if st.paths.iter().any(|e| e.alias == entry.alias) {
            log::warn!("Alias {} is already defined", entry.alias);
            return false;
        }

        let mut new_entry = entry.clone();
        new_entry.path_var = self.strip_trailing_separator(&entry.path_var);
        new_entry.path_expanded = self.expand_dir(st, &new_entry.path_var);

        if new_entry.path_expanded.is_empty() {
            log::debug!(
                "No such directory for alias {}: {}",
                new_entry.alias,
                new_entry.path_var
            );
        }

        if new_entry.is_env_backed() {
            let run = st.paths.iter().take_while(|e| e.is_env_backed()).count();
            st.paths.insert(run, new_entry);
        } else {
            st.paths.push(new_entry);
        }

        true
    }

    /// Register the leading environment variable token of a resolved name
    /// as a search path entry, so it becomes available to `shorten`. Only
    /// tokens expanding to an existing directory are added.
    fn check_env_var_path_locked(&self, st: &mut ResolverState, name: &str) {
        let Some((token, _)) = leading_env_token(name) else {
            return;
        };

        if st.paths.iter().any(|e| e.alias == token) {
            return;
        }

        let mut entry = SearchPathEntry::new(token, token, "");
        entry.path_expanded = self.expand_dir(st, token);

        if entry.path_expanded.is_empty() {
            return;
        }

        let run = st.paths.iter().take_while(|e| e.is_env_backed()).count();
        st.paths.insert(run, entry);
    }

    fn write_config_locked(&self, st: &ResolverState) -> bool {
        if st.config_dir.as_os_str().is_empty() {
            log::warn!("Configuration directory is not set; search paths not saved");
            return false;
        }

        let cfg_path = st.config_dir.join(CFG_FILENAME);
        match config::write_path_list(&cfg_path, &st.paths) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{e:#}");
                false
            }
        }
    }

    fn expand_tokens(&self, st: &ResolverState, s: &str) -> String {
        let env = ProjectEnv {
            project: &st.project_dir,
            inner: self.env.as_ref(),
        };
        expand_env_tokens(s, &env)
    }

    /// Expand and normalize a directory expression. Returns the canonical
    /// absolute directory with no trailing separator, or an empty string
    /// when the directory does not exist.
    fn expand_dir(&self, st: &ResolverState, path_var: &str) -> String {
        let expanded = self.expand_tokens(st, path_var);
        if expanded.is_empty() {
            return String::new();
        }

        let expanded = self.normalize_separators(&expanded);
        match self.fs.canonicalize(Path::new(&expanded)) {
            Ok(full) if self.fs.is_dir(&full) => {
                self.strip_trailing_separator(&full.to_string_lossy())
            }
            _ => String::new(),
        }
    }

    fn try_under(&self, dir: &str, rest: &str) -> Option<PathBuf> {
        let candidate = format!("{}{}{}", dir, self.fs.separator(), rest);
        let path = Path::new(&candidate);

        if self.fs.is_file(path) {
            self.fs.canonicalize(path).ok()
        } else {
            None
        }
    }

    fn warn_once(&self, st: &mut ResolverState, flag: u32, message: &str) {
        if st.warn_flags & flag == 0 {
            st.warn_flags |= flag;
            log::warn!("{message}");
        }
    }

    fn normalize_separators(&self, s: &str) -> String {
        if self.fs.separator() == '\\' {
            s.replace('/', "\\")
        } else {
            s.to_string()
        }
    }

    fn to_slashes(&self, s: &str) -> String {
        if self.fs.separator() == '\\' {
            s.replace('\\', "/")
        } else {
            s.to_string()
        }
    }

    fn strip_trailing_separator(&self, s: &str) -> String {
        let sep = self.fs.separator();
        let mut out = s.to_string();

        while out.len() > 1 && out.ends_with(sep) {
            out.pop();
        }

        out
    }
}

impl Default for FilenameResolver {
    fn default() -> Self {
        Self::new(Arc::new(DefaultFileSystem), Arc::new(SystemEnv::new()))
    }
}

fn project_entry(expanded: &str) -> SearchPathEntry {
    let token = format!("${{{PROJECT_VAR}}}");
    let mut entry = SearchPathEntry::new(token.clone(), token, "");
    entry.path_expanded = expanded.to_string();
    entry
}

/// Split a `:ALIAS:relative/path` reference into its alias and relative
/// parts. Both parts must be non-empty.
pub fn split_alias(name: &str) -> Option<(String, String)> {
    let rest = name.strip_prefix(':')?;
    let sep = rest.find(':')?;

    if sep == 0 || sep + 1 == rest.len() {
        return None;
    }

    Some((rest[..sep].to_string(), rest[sep + 1..].to_string()))
}

/// Check whether a candidate filename is a syntactically valid, possibly
/// aliased relative path. Returns `(valid, has_alias)`.
///
/// The segment before the first `:` is a candidate alias and must be
/// non-empty and free of the restricted character set shared with the
/// alias name editor. On backslash hosts a single letter before `:\` is a
/// drive designator, not an alias.
pub fn validate_filename(name: &str) -> (bool, bool) {
    const RESTRICTED: &[char] = &[
        '{', '}', '[', ']', '(', ')', '%', '~', '<', '>', '"', '=', '\'', '`', ';', ':', '.',
        ',', '&', '?', '/', '\\', '|', '$',
    ];

    if name.is_empty() {
        return (false, false);
    }

    if name.ends_with(':') {
        return (false, false);
    }

    let Some(colon) = name.find(':') else {
        return (true, false);
    };

    if cfg!(windows) && colon == 1 {
        let bytes = name.as_bytes();
        if bytes.len() > 2 && (bytes[2] == b'\\' || bytes[2] == b'/') {
            return (true, false);
        }
    }

    let alias = &name[..colon];
    if alias.is_empty() || alias.contains(RESTRICTED) {
        return (false, false);
    }

    (true, true)
}
