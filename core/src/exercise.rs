use std::{
    fs, io,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::testing::{Limits, TestCase};

pub type Result<T> = std::result::Result<T, ExerciseError>;

#[derive(Debug, thiserror::Error)]
pub enum ExerciseError {
    #[error("Cannot read '{}': {}", .0.to_string_lossy(), .1)]
    Io(PathBuf, #[source] io::Error),

    #[error("No such exercise '{0}' in '{}'", .1.to_string_lossy())]
    NotFound(String, PathBuf),

    #[error("Invalid exercise spec '{}': {}", .0.to_string_lossy(), .1)]
    InvalidSpec(PathBuf, #[source] toml::de::Error),

    #[error("Invalid {0} in '{}': must be positive", .1.to_string_lossy())]
    InvalidLimit(&'static str, PathBuf),

    #[error("Invalid testcase pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Contents of `exercise.toml`. Missing limits fall back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExerciseSpec {
    /// Seconds.
    pub time_limit: Option<f64>,
    /// Bytes.
    pub memory_limit: Option<u64>,
}

/// Pair of files making up one testcase. Contents are read on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsTestcase {
    pub name: String,
    pub input_path: PathBuf,
    pub expected_path: PathBuf,
}

impl FsTestcase {
    pub fn load(&self) -> Result<TestCase> {
        let input = read_to_string(&self.input_path)?;
        let expected = read_to_string(&self.expected_path)?;
        Ok(TestCase::from_text(&self.name, &input, &expected))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exercise {
    pub name: String,
    pub dir: PathBuf,
    pub spec: ExerciseSpec,
    pub testcases: Vec<FsTestcase>,
}

impl Exercise {
    pub fn limits(&self, defaults: Limits) -> Limits {
        Limits {
            time: self
                .spec
                .time_limit
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.time),
            memory: self.spec.memory_limit.unwrap_or(defaults.memory),
        }
    }

    /// Reads each testcase only when the iterator reaches it.
    pub fn testcases(&self) -> impl Iterator<Item = anyhow::Result<TestCase>> + '_ {
        self.testcases.iter().map(|t| t.load().map_err(Into::into))
    }
}

/// Directory holding one sub-directory per exercise:
///
/// ```text
/// <name>/exercise.toml
/// <name>/description.md
/// <name>/tests/<case>.in
/// <name>/tests/<case>.out
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseRepo {
    dir: PathBuf,
}

impl ExerciseRepo {
    pub const SPEC_FILENAME: &str = "exercise.toml";
    pub const DESCRIPTION_FILENAME: &str = "description.md";
    pub const TESTS_DIRNAME: &str = "tests";
    const INPUT_EXT: &str = "in";
    const OUTPUT_EXT: &str = "out";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let entries =
            fs::read_dir(&self.dir).map_err(|e| ExerciseError::Io(self.dir.clone(), e))?;

        let mut names: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().map_or(false, |ft| ft.is_dir()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        Ok(names)
    }

    fn exercise_dir(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        let is_plain_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        let dir = self.dir.join(name);
        if is_plain_name && dir.is_dir() {
            Ok(dir)
        } else {
            Err(ExerciseError::NotFound(name.to_owned(), self.dir.clone()))
        }
    }

    pub fn description(&self, name: &str) -> Result<String> {
        let dir = self.exercise_dir(name)?;
        read_to_string(dir.join(Self::DESCRIPTION_FILENAME))
    }

    pub fn load(&self, name: &str) -> Result<Exercise> {
        let dir = self.exercise_dir(name)?;

        let spec_path = dir.join(Self::SPEC_FILENAME);
        let spec = if spec_path.is_file() {
            let s = read_to_string(&spec_path)?;
            toml::from_str(&s).map_err(|e| ExerciseError::InvalidSpec(spec_path.clone(), e))?
        } else {
            ExerciseSpec::default()
        };
        validate_spec(&spec, &spec_path)?;

        let testcases = Self::enumerate_testcases(&dir.join(Self::TESTS_DIRNAME))?;
        log::debug!("Exercise '{}': {} testcases", name, testcases.len());

        Ok(Exercise {
            name: name.to_owned(),
            dir,
            spec,
            testcases,
        })
    }

    fn enumerate_testcases(tests_dir: &Path) -> Result<Vec<FsTestcase>> {
        let escaped = glob::Pattern::escape(&tests_dir.to_string_lossy());
        let pattern = format!("{}/*.{}", escaped, Self::INPUT_EXT);

        let mut res = Vec::new();
        for input_path in glob::glob(&pattern)?.filter_map(std::result::Result::ok) {
            let expected_path = input_path.with_extension(Self::OUTPUT_EXT);
            if !expected_path.is_file() {
                log::warn!(
                    "Skipping {:?}: no matching .{} file",
                    input_path,
                    Self::OUTPUT_EXT
                );
                continue;
            }
            let Some(name) = input_path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue
            };
            res.push(FsTestcase {
                name,
                input_path,
                expected_path,
            });
        }
        res.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(res)
    }
}

fn validate_spec(spec: &ExerciseSpec, path: &Path) -> Result<()> {
    if let Some(t) = spec.time_limit {
        if !(t.is_finite() && t > 0.0) {
            return Err(ExerciseError::InvalidLimit("time_limit", path.to_owned()));
        }
    }
    if spec.memory_limit == Some(0) {
        return Err(ExerciseError::InvalidLimit("memory_limit", path.to_owned()));
    }
    Ok(())
}

fn read_to_string(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|e| ExerciseError::Io(path.to_owned(), e))
}
