//! HPC job description
//!
//! Job settings come from the command line, then `hps_config.json`, then
//! defaults. A [`JobPlan`] lists the files to upload, the files to collect and
//! the command the cluster runs.

use crate::config::{
    APDL_OUTPUT_FILE, DEFAULT_JOB_CORES, DEFAULT_JOB_DISK_SPACE, DEFAULT_JOB_MEMORY,
    DEFAULT_PROJECT_NAME, DEFAULT_PYTHON,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const SHELL_WRAPPER: &str = "main.sh";
const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("The file '{}' must exist", .0.display())]
    MissingFile(PathBuf),
    #[error("Cannot tell how to run '{}', use --mode python, shell or apdl", .0.display())]
    UnknownMode(PathBuf),
    #[error("Unsupported mode '{0}', expected python, shell or apdl")]
    InvalidMode(String),
    #[error("A requirements file can only be used with a Python main file")]
    RequirementsWithoutPython,
    #[error("A shell main file cannot be combined with --shell-file")]
    ShellFileWithShellMode,
    #[error("Invalid job configuration '{}': {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How the cluster runs the main file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    Python,
    Shell,
    Apdl,
}

impl SubmitMode {
    /// `forced` wins; otherwise the extension decides (.py, .sh, .inp/.mac).
    pub fn detect(main_file: &Path, forced: Option<&str>) -> Result<Self, JobError> {
        if let Some(mode) = forced {
            return match mode.to_lowercase().as_str() {
                "python" => Ok(SubmitMode::Python),
                "shell" => Ok(SubmitMode::Shell),
                "apdl" => Ok(SubmitMode::Apdl),
                _ => Err(JobError::InvalidMode(mode.to_string())),
            };
        }

        let extension = main_file
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("py") => Ok(SubmitMode::Python),
            Some("sh") => Ok(SubmitMode::Shell),
            Some("inp") | Some("mac") => Ok(SubmitMode::Apdl),
            _ => Err(JobError::UnknownMode(main_file.to_path_buf())),
        }
    }

    pub fn job_name(&self) -> &'static str {
        match self {
            SubmitMode::Python => "My PyMAPDL job",
            SubmitMode::Shell => "My shell job",
            SubmitMode::Apdl => "My APDL job",
        }
    }

    fn task_name(&self) -> &'static str {
        match self {
            SubmitMode::Python => "Python Task",
            SubmitMode::Shell => "Shell Task",
            SubmitMode::Apdl => "APDL Task",
        }
    }

    fn software_requirements(&self, python: f64) -> Value {
        match self {
            SubmitMode::Python => json!([
                { "name": "Bash", "version": "0.1" },
                { "name": "Python", "version": python.to_string() },
            ]),
            SubmitMode::Shell => json!([{ "name": "Bash", "version": "0.1" }]),
            SubmitMode::Apdl => json!([{ "name": "Ansys Mechanical APDL", "version": "2024 R2" }]),
        }
    }
}

/// Contents of `hps_config.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HpsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_space: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_time: Option<u64>,
}

impl HpsConfig {
    /// A missing or empty file is an empty config.
    pub fn load(path: &Path) -> Result<Self, JobError> {
        match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(Self::default()),
            Ok(content) => serde_json::from_str(&content).map_err(|source| JobError::Config {
                path: path.to_path_buf(),
                source,
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(JobError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Field by field, values set here win over `fallback`.
    pub fn or(self, fallback: HpsConfig) -> HpsConfig {
        HpsConfig {
            url: self.url.or(fallback.url),
            user: self.user.or(fallback.user),
            password: self.password.or(fallback.password),
            python: self.python.or(fallback.python),
            name: self.name.or(fallback.name),
            num_cores: self.num_cores.or(fallback.num_cores),
            memory: self.memory.or(fallback.memory),
            disk_space: self.disk_space.or(fallback.disk_space),
            exclusive: self.exclusive.or(fallback.exclusive),
            max_execution_time: self.max_execution_time.or(fallback.max_execution_time),
        }
    }

    /// Every job setting filled in, credentials untouched.
    pub fn with_defaults(&self) -> HpsConfig {
        let settings = JobSettings::from(self);
        HpsConfig {
            url: self.url.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            python: Some(settings.python),
            name: Some(settings.name),
            num_cores: Some(settings.num_cores),
            memory: Some(settings.memory),
            disk_space: Some(settings.disk_space),
            exclusive: Some(settings.exclusive),
            max_execution_time: Some(settings.max_execution_time.unwrap_or(0)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), JobError> {
        let content = serde_json::to_string_pretty(self).map_err(|source| JobError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(|source| JobError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resources and naming of a job
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    /// Project name
    pub name: String,
    pub python: f64,
    pub num_cores: u32,
    /// MB
    pub memory: u64,
    /// MB
    pub disk_space: u64,
    pub exclusive: bool,
    /// Seconds; `None` is unlimited
    pub max_execution_time: Option<u64>,
}

impl From<&HpsConfig> for JobSettings {
    fn from(config: &HpsConfig) -> Self {
        Self {
            name: config
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string()),
            python: config.python.unwrap_or(DEFAULT_PYTHON),
            num_cores: config.num_cores.unwrap_or(DEFAULT_JOB_CORES).max(1),
            memory: config.memory.unwrap_or(DEFAULT_JOB_MEMORY),
            disk_space: config.disk_space.unwrap_or(DEFAULT_JOB_DISK_SPACE),
            exclusive: config.exclusive.unwrap_or(false),
            max_execution_time: config.max_execution_time.filter(|seconds| *seconds > 0),
        }
    }
}

/// Local files making up a job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSources {
    pub main_file: PathBuf,
    pub mode: Option<String>,
    pub shell_file: Option<PathBuf>,
    pub requirements_file: Option<PathBuf>,
    pub extra_files: Vec<PathBuf>,
    pub output_files: Vec<String>,
}

/// A file registered with the project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFile {
    pub name: String,
    /// Path relative to the job's working directory on the cluster
    pub evaluation_path: String,
    /// Local content to upload; `None` for files the job produces
    pub source: Option<PathBuf>,
}

impl JobFile {
    fn output(name: &str) -> Self {
        Self {
            name: name.to_string(),
            evaluation_path: name.to_string(),
            source: None,
        }
    }
}

#[derive(Debug)]
pub struct JobPlan {
    pub mode: SubmitMode,
    /// File name the execution command runs
    pub executable: String,
    pub input_files: Vec<JobFile>,
    pub output_files: Vec<JobFile>,
    staging_dir: Option<PathBuf>,
}

impl JobPlan {
    pub fn prepare(sources: &JobSources, python: f64) -> Result<Self, JobError> {
        let main_file = canonical(&sources.main_file)?;
        let mode = SubmitMode::detect(&main_file, sources.mode.as_deref())?;
        let work_dir = main_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        if sources.requirements_file.is_some() && mode != SubmitMode::Python {
            return Err(JobError::RequirementsWithoutPython);
        }
        if sources.shell_file.is_some() && mode == SubmitMode::Shell {
            return Err(JobError::ShellFileWithShellMode);
        }

        let mut plan = JobPlan {
            mode,
            executable: file_name(&main_file),
            input_files: vec![input_file(&main_file, &work_dir)],
            output_files: sources
                .output_files
                .iter()
                .map(|name| JobFile::output(name))
                .collect(),
            staging_dir: None,
        };

        if mode == SubmitMode::Python {
            let requirements = match &sources.requirements_file {
                Some(path) => {
                    let path = canonical(path)?;
                    plan.input_files.push(input_file(&path, &work_dir));
                    Some(file_name(&path))
                }
                None => None,
            };

            let shell_file = match &sources.shell_file {
                Some(path) => canonical(path)?,
                None => plan.write_shell_wrapper(python, &file_name(&main_file), requirements.as_deref())?,
            };
            plan.executable = file_name(&shell_file);
            plan.input_files.push(input_file(&shell_file, &work_dir));
        }

        for extra in &sources.extra_files {
            let extra = canonical(extra)?;
            plan.input_files.push(input_file(&extra, &work_dir));
        }

        if mode == SubmitMode::Apdl {
            plan.output_files.push(JobFile::output(APDL_OUTPUT_FILE));
        }

        debug!(
            mode = ?plan.mode,
            executable = %plan.executable,
            inputs = plan.input_files.len(),
            outputs = plan.output_files.len(),
            "job plan ready"
        );
        Ok(plan)
    }

    pub fn job_name(&self) -> &'static str {
        self.mode.job_name()
    }

    pub fn execution_command(&self) -> String {
        match self.mode {
            SubmitMode::Apdl => format!(
                "%executable% -b -i {} -o {}",
                self.executable, APDL_OUTPUT_FILE
            ),
            SubmitMode::Python | SubmitMode::Shell => {
                format!("%executable% %file:{}%", self.executable)
            }
        }
    }

    /// Task definition body for the job management API.
    pub fn task_definition(
        &self,
        settings: &JobSettings,
        input_file_ids: &[String],
        output_file_ids: &[String],
    ) -> Value {
        let mut task = json!({
            "name": self.mode.task_name(),
            "software_requirements": self.mode.software_requirements(settings.python),
            "execution_command": self.execution_command(),
            "resource_requirements": {
                "num_cores": settings.num_cores,
                "memory": settings.memory.saturating_mul(BYTES_PER_MB),
                "disk_space": settings.disk_space.saturating_mul(BYTES_PER_MB),
                "hpc_resources": { "exclusive": settings.exclusive },
            },
            "execution_level": 0,
            "num_trials": 1,
            "input_file_ids": input_file_ids,
            "output_file_ids": output_file_ids,
        });
        if let Some(seconds) = settings.max_execution_time {
            task["max_execution_time"] = json!(seconds);
        }
        task
    }

    /// Shell script creating a venv and running the Python main file
    fn write_shell_wrapper(
        &mut self,
        python: f64,
        main_file: &str,
        requirements: Option<&str>,
    ) -> Result<PathBuf, JobError> {
        let dir = std::env::temp_dir().join(format!("mapdl-warden-job-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).map_err(|source| JobError::Io {
            path: dir.clone(),
            source,
        })?;
        self.staging_dir = Some(dir.clone());

        let install = match requirements {
            Some(requirements) => format!("pip install -r {requirements}\n"),
            None => String::new(),
        };
        let script = format!(
            "echo \"Starting\"\n\n\
             python{python} -m venv .venv\n\
             source .venv/bin/activate\n\n\
             {install}\
             python {main_file}\n"
        );

        let path = dir.join(SHELL_WRAPPER);
        fs::write(&path, script).map_err(|source| JobError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl Drop for JobPlan {
    fn drop(&mut self) {
        if let Some(dir) = self.staging_dir.take() {
            if let Err(err) = fs::remove_dir_all(&dir) {
                warn!(path = %dir.display(), error = %err, "failed to remove job staging directory");
            }
        }
    }
}

fn canonical(path: &Path) -> Result<PathBuf, JobError> {
    if !path.is_file() {
        return Err(JobError::MissingFile(path.to_path_buf()));
    }
    fs::canonicalize(path).map_err(|source| JobError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Files below the main file's directory keep their relative layout.
fn input_file(path: &Path, work_dir: &Path) -> JobFile {
    let name = file_name(path);
    let evaluation_path = path
        .strip_prefix(work_dir)
        .ok()
        .map(|relative| {
            relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .filter(|relative| !relative.is_empty())
        .unwrap_or_else(|| name.clone());

    JobFile {
        name,
        evaluation_path,
        source: Some(path.to_path_buf()),
    }
}
