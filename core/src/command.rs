use std::{
    borrow::Borrow,
    collections::HashMap,
    env,
    ffi::{OsStr, OsString},
    fs,
    hash::Hash,
    io::Read,
    path::{Path, PathBuf},
};

use serde::Deserialize;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InterpError {
    #[error("Undefined variable '{0}' at {}", .1+1)]
    UndefinedVar(String, usize),

    #[error("Unclosed brace (found open brace at {})", .0+1)]
    UnclosedBrace(usize),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Invalid command template '{template}': {source}")]
    Template {
        template: String,
        #[source]
        source: InterpError,
    },

    #[error("Command template for '*.{0}' is empty")]
    EmptyTemplate(String),

    #[error("Program '{}' is not found", .0.to_string_lossy())]
    ProgramNotFound(PathBuf),

    #[error("Program '{}' is not found in PATH", .0.to_string_lossy())]
    NotInPath(PathBuf),
}

/// One `[[language]]` entry: files with any of `extensions` run with `run`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LanguageEntry {
    pub extensions: Vec<String>,
    pub run: Vec<String>,
}

/// Maps a program file to the argv that executes it.
///
/// Templates may reference `#{filePath}`, `#{fileName}`, `#{fileDir}`,
/// `#{fileStem}` and `#{fileExt}`; `##` is a literal `#`.
/// Files with no matching entry are executed directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTable {
    entries: Vec<LanguageEntry>,
    search_path: Option<OsString>,
}

impl CommandTable {
    pub fn new(entries: Vec<LanguageEntry>) -> Self {
        Self {
            entries,
            search_path: env::var_os("PATH"),
        }
    }

    pub fn find_entry(&self, program_file: &Path) -> Option<&LanguageEntry> {
        let ext = program_file.extension()?.to_str()?;
        self.entries
            .iter()
            .find(|entry| entry.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    pub fn resolve(&self, program_file: impl AsRef<Path>) -> Result<Vec<OsString>, ResolveError> {
        let program_file = program_file.as_ref();

        let entry = self.find_entry(program_file);
        let mut argv: Vec<OsString> = match entry {
            Some(entry) => {
                let vars = make_interp_vars(program_file);
                let argv = entry
                    .run
                    .iter()
                    .map(|tmpl| {
                        interp(tmpl, &vars).map(OsString::from).map_err(|source| {
                            ResolveError::Template {
                                template: tmpl.to_owned(),
                                source,
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if argv.is_empty() {
                    return Err(ResolveError::EmptyTemplate(entry.extensions.join("|")));
                }
                argv
            }
            None => vec![direct_exec_path(program_file).into_os_string()],
        };

        let program = self.locate_program(Path::new(&argv[0]))?;
        if entry.is_some() && is_wrapper_script(&program) {
            log::warn!(
                "Interpreter {:?} is a script (version manager shim?); it may start the real \
                 interpreter as a child process and every run would be flagged. \
                 Put the interpreter's real path in `[[language]] run`.",
                program
            );
        }
        argv[0] = program.into_os_string();

        log::debug!("Resolved {:?} to {:?}", program_file, argv);
        Ok(argv)
    }

    /// Paths must exist; bare names are looked up in `PATH` and replaced by the
    /// location found there.
    fn locate_program(&self, program: &Path) -> Result<PathBuf, ResolveError> {
        let is_bare_name = program.components().count() == 1 && !program.has_root();
        if !is_bare_name {
            return if program.is_file() {
                Ok(program.to_owned())
            } else {
                Err(ResolveError::ProgramNotFound(program.to_owned()))
            };
        }

        self.search_path
            .as_deref()
            .and_then(|p| {
                env::split_paths(p)
                    .map(|dir| dir.join(program))
                    .find(|path| is_executable_file(path))
            })
            .ok_or_else(|| ResolveError::NotInPath(program.to_owned()))
    }
}

/// Version manager shims (pyenv, asdf) are `#!` scripts that exec the real
/// interpreter from a child shell.
fn is_wrapper_script(path: &Path) -> bool {
    let mut magic = [0u8; 2];
    fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|()| &magic == b"#!")
        .unwrap_or(false)
}

/// `main` → `./main`, so that a bare file name is not looked up in `PATH`.
fn direct_exec_path(program_file: &Path) -> PathBuf {
    if program_file.components().count() == 1 && !program_file.has_root() {
        Path::new(".").join(program_file)
    } else {
        program_file.to_owned()
    }
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

fn make_interp_vars(filepath: &Path) -> HashMap<&'static str, &OsStr> {
    let mut m: HashMap<_, &OsStr> = HashMap::new();
    m.insert("filePath", filepath.as_os_str());
    m.insert("fileName", filepath.file_name().unwrap_or(filepath.as_os_str()));
    m.insert(
        "fileDir",
        match filepath.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.as_os_str(),
            _ => OsStr::new("."),
        },
    );
    m.insert("fileStem", filepath.file_stem().unwrap_or_default());
    m.insert("fileExt", filepath.extension().unwrap_or_default());
    m
}

/// Expands `#{name}` with `variables`; `##` yields `#`.
pub fn interp<K, V>(fmt: &str, variables: &HashMap<K, V>) -> Result<String, InterpError>
where
    K: Borrow<str> + Hash + Eq,
    V: AsRef<OsStr>,
{
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum State {
        Normal,
        HashMark,
        InsideBrace,
    }
    use State::*;

    let mut state = Normal;
    let mut open_at = 0;
    let mut res = String::with_capacity(fmt.len() * 2);
    let mut name = String::new();

    for (i, c) in fmt.chars().enumerate() {
        state = match (c, state) {
            ('#', Normal) => HashMark,
            ('#', HashMark) => {
                res.push('#');
                Normal
            }
            ('{', HashMark) => {
                open_at = i;
                name.clear();
                InsideBrace
            }
            ('}', InsideBrace) => {
                let Some(value) = variables.get(name.as_str()) else {
                    return Err(InterpError::UndefinedVar(name, open_at))
                };
                res += &value.as_ref().to_string_lossy();
                Normal
            }
            (_, InsideBrace) => {
                name.push(c);
                InsideBrace
            }
            (_, HashMark) => {
                res.push('#');
                res.push(c);
                Normal
            }
            (_, Normal) => {
                res.push(c);
                Normal
            }
        };
    }

    match state {
        InsideBrace => Err(InterpError::UnclosedBrace(open_at)),
        HashMark => {
            res.push('#');
            Ok(res)
        }
        Normal => Ok(res),
    }
}
