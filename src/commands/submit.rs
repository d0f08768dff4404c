//! `submit`: run a file as a job on an HPC cluster

use super::{print_error, print_success, SubmitArgs};
use crate::config::{HPS_CONFIG_FILE, JOB_POLL_INTERVAL};
use crate::error::WardenResult;
use crate::hpc::{self, CredentialStore, HpsClient, HpsConfig, JobPlan, JobSettings, JobSources};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

impl SubmitArgs {
    /// Values given on the command line, in config-file form
    pub fn overrides(&self) -> HpsConfig {
        HpsConfig {
            url: self.url.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            python: self.python,
            name: self.name.clone(),
            num_cores: self.num_cores,
            memory: self.memory,
            disk_space: self.disk_space,
            exclusive: self.exclusive,
            max_execution_time: self.max_execution_time,
        }
    }

    pub fn sources(&self) -> JobSources {
        JobSources {
            main_file: self.main_file.clone(),
            mode: self.mode.clone(),
            shell_file: self.shell_file.clone(),
            requirements_file: self.requirements_file.clone(),
            extra_files: self.extra_files.clone(),
            output_files: self.output_files.clone(),
        }
    }

    fn config_path(&self) -> WardenResult<PathBuf> {
        match &self.config_file {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_dir()?.join(HPS_CONFIG_FILE)),
        }
    }
}

pub async fn execute(args: &SubmitArgs, credentials_file: &Path) -> WardenResult<()> {
    let config_file = args.config_path()?;
    let config = args.overrides().or(HpsConfig::load(&config_file)?);
    let settings = JobSettings::from(&config);
    let plan = JobPlan::prepare(&args.sources(), settings.python)?;

    let mut store = CredentialStore::open(credentials_file)?;
    let credentials = store.access(
        config.url.as_deref(),
        config.user.as_deref(),
        config.password.as_deref(),
    )?;
    let token = hpc::login(&credentials.url, &credentials.user, &credentials.password).await?;

    let client = HpsClient::new(&credentials.url, token)?;
    let submitted = client.submit(&plan, &settings).await?;

    if args.save_config_file {
        config.with_defaults().save(&config_file)?;
        debug!(path = %config_file.display(), "job settings saved");
    }

    println!(
        "You can check your project by visiting: {}",
        submitted.project_url
    );

    if args.wait {
        println!(
            "Waiting for project {} (id: {}) evaluation to complete...",
            settings.name, submitted.project_id
        );
        let status = client
            .wait_for_completion(&submitted.project_id, &submitted.job_id, JOB_POLL_INTERVAL)
            .await?;
        info!(job_id = %submitted.job_id, status = %status, "job finished");
        if status == "evaluated" {
            print_success(format!("Job {} evaluated.", submitted.job_id));
        } else {
            print_error(format!("Job {} {status}.", submitted.job_id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JMS: &str = "/hps/jms/api/v1";

    async fn mount_cluster(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/hps/auth/realms/rep/protocol/openid-connect/token"))
            .and(body_string_contains("username=stored-user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t" })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{JMS}/projects")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "projects": [{ "id": "proj-1" }] })),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/hps/fs/api/v1/proj-1/"))
            .respond_with(ResponseTemplate::new(201))
            .mount(server)
            .await;
        for (route, key, id) in [
            ("files", "files", "file-1"),
            ("task_definitions", "task_definitions", "task-1"),
            ("job_definitions", "job_definitions", "jd-1"),
            ("jobs", "jobs", "job-1"),
        ] {
            Mock::given(method("POST"))
                .and(path(format!("{JMS}/projects/proj-1/{route}")))
                .respond_with(
                    ResponseTemplate::new(201).set_body_json(json!({ key: [{ "id": id }] })),
                )
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn submit_uses_stored_credentials_and_config_file() {
        let server = MockServer::start().await;
        mount_cluster(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("{JMS}/projects/proj-1/task_definitions")))
            .and(body_partial_json(json!({
                "task_definitions": [{ "resource_requirements": { "num_cores": 8 } }]
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({ "task_definitions": [{ "id": "task-8" }] })),
            )
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{JMS}/projects/proj-1/jobs")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "jobs": [{ "id": "job-1", "eval_status": "evaluated" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let url = format!("{}/hps", server.uri());
        let credentials_file = dir.path().join("credentials.json");
        CredentialStore::open(&credentials_file)
            .unwrap()
            .store(Some("stored-user"), Some("stored-secret"), Some(&url), false, None)
            .unwrap();

        let config_file = dir.path().join("hps_config.json");
        fs::write(&config_file, json!({ "url": url, "num_cores": 8 }).to_string()).unwrap();
        let main_file = dir.path().join("beam.inp");
        fs::write(&main_file, "/PREP7\n").unwrap();

        let args = SubmitArgs {
            main_file,
            config_file: Some(config_file.clone()),
            save_config_file: true,
            wait: true,
            ..SubmitArgs::default()
        };
        execute(&args, &credentials_file).await.unwrap();

        let saved = HpsConfig::load(&config_file).unwrap();
        assert_eq!(saved.num_cores, Some(8));
        assert_eq!(saved.memory, Some(crate::config::DEFAULT_JOB_MEMORY));
        // credentials came from the store and are not written to the config
        assert_eq!(saved.user, None);
    }

    #[tokio::test]
    async fn submit_without_credentials_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let main_file = dir.path().join("run.sh");
        fs::write(&main_file, "echo hi\n").unwrap();
        let args = SubmitArgs {
            main_file,
            url: Some(format!("{}/hps", server.uri())),
            config_file: Some(dir.path().join("hps_config.json")),
            ..SubmitArgs::default()
        };

        let err = execute(&args, &dir.path().join("credentials.json"))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    #[test]
    fn command_line_overrides_keep_unset_fields_empty() {
        let args = SubmitArgs {
            main_file: "run.py".into(),
            num_cores: Some(2),
            ..SubmitArgs::default()
        };

        let overrides = args.overrides();

        assert_eq!(overrides.num_cores, Some(2));
        assert_eq!(overrides.memory, None);
        assert_eq!(args.sources().main_file, PathBuf::from("run.py"));
    }
}
