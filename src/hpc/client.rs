//! Job management (JMS) and file storage REST client for an HPS cluster

use super::auth::http_client;
use super::jobs::{JobFile, JobPlan, JobSettings};
use crate::config::{FS_API_PATH, JMS_API_PATH};
use crate::error::{WardenError, WardenResult};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Where a submitted job lives on the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub project_id: String,
    pub job_id: String,
    /// Web page of the project's jobs
    pub project_url: String,
}

pub struct HpsClient {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl HpsClient {
    pub fn new(url: &str, token: impl Into<String>) -> WardenResult<Self> {
        Ok(Self {
            http: http_client()?,
            url: url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn jms(&self, path: &str) -> String {
        format!("{}/{}/{}", self.url, JMS_API_PATH, path)
    }

    pub async fn find_project(&self, name: &str) -> WardenResult<Option<String>> {
        let projects = self
            .get_objects("projects", "projects", &[("name", name)])
            .await?;
        Ok(projects.iter().find_map(object_id))
    }

    pub async fn create_project(&self, name: &str) -> WardenResult<String> {
        let created = self
            .post_objects(
                "projects",
                "projects",
                json!([{ "name": name, "priority": 1, "active": true }]),
            )
            .await?;
        first_id(&created, "project")
    }

    /// Upload input content, then register every file with the project.
    pub async fn create_files(
        &self,
        project_id: &str,
        files: &[JobFile],
    ) -> WardenResult<Vec<String>> {
        let mut metadata = Vec::with_capacity(files.len());
        for file in files {
            let mut entry = json!({
                "name": file.name,
                "evaluation_path": file.evaluation_path,
                "type": "text/plain",
            });
            match &file.source {
                Some(source) => {
                    let storage_id = Uuid::new_v4().to_string();
                    self.upload(project_id, &storage_id, source).await?;
                    entry["storage_id"] = json!(storage_id);
                }
                None => {
                    entry["collect"] = json!(true);
                    entry["monitor"] = json!(true);
                }
            }
            metadata.push(entry);
        }

        let created = self
            .post_objects(
                &format!("projects/{project_id}/files"),
                "files",
                Value::Array(metadata),
            )
            .await?;
        created
            .iter()
            .map(|file| object_id(file).ok_or_else(|| missing_id("file")))
            .collect()
    }

    async fn upload(&self, project_id: &str, storage_id: &str, path: &Path) -> WardenResult<()> {
        let content = fs::read(path).map_err(|err| WardenError::Filesystem {
            message: format!("failed to read job file: {err}"),
            path: path.display().to_string(),
            source: Some(Box::new(err)),
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let part = Part::bytes(content)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        debug!(file = %file_name, storage_id, "uploading job file");
        let response = self
            .http
            .post(format!(
                "{}/{}/{}/{}",
                self.url, FS_API_PATH, project_id, storage_id
            ))
            .header("Authorization", format!("Bearer {}", self.token))
            .multipart(form)
            .send()
            .await?;
        check(response, "upload file").await?;
        Ok(())
    }

    pub async fn create_task_definition(
        &self,
        project_id: &str,
        task_definition: Value,
    ) -> WardenResult<String> {
        let created = self
            .post_objects(
                &format!("projects/{project_id}/task_definitions"),
                "task_definitions",
                json!([task_definition]),
            )
            .await?;
        first_id(&created, "task definition")
    }

    pub async fn create_job_definition(
        &self,
        project_id: &str,
        task_definition_id: &str,
    ) -> WardenResult<String> {
        let created = self
            .post_objects(
                &format!("projects/{project_id}/job_definitions"),
                "job_definitions",
                json!([{
                    "name": "JobDefinition.1",
                    "active": true,
                    "task_definition_ids": [task_definition_id],
                }]),
            )
            .await?;
        first_id(&created, "job definition")
    }

    pub async fn create_job(
        &self,
        project_id: &str,
        name: &str,
        job_definition_id: &str,
    ) -> WardenResult<String> {
        let created = self
            .post_objects(
                &format!("projects/{project_id}/jobs"),
                "jobs",
                json!([{
                    "name": name,
                    "eval_status": "pending",
                    "job_definition_id": job_definition_id,
                    "values": {},
                }]),
            )
            .await?;
        first_id(&created, "job")
    }

    /// Current `eval_status` of a job.
    pub async fn job_status(&self, project_id: &str, job_id: &str) -> WardenResult<String> {
        let jobs = self
            .get_objects(&format!("projects/{project_id}/jobs"), "jobs", &[("id", job_id)])
            .await?;
        jobs.iter()
            .find_map(|job| job.get("eval_status").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| WardenError::Unknown {
                message: format!("the cluster returned no status for job {job_id}"),
                source: None,
            })
    }

    /// Poll until the job is evaluated or failed and return that status.
    pub async fn wait_for_completion(
        &self,
        project_id: &str,
        job_id: &str,
        interval: Duration,
    ) -> WardenResult<String> {
        loop {
            let status = self.job_status(project_id, job_id).await?;
            debug!(job_id, status = %status, "job status");
            if status == "evaluated" || status == "failed" {
                return Ok(status);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Create (or reuse) the project and register the job described by `plan`.
    pub async fn submit(&self, plan: &JobPlan, settings: &JobSettings) -> WardenResult<SubmittedJob> {
        let project_id = match self.find_project(&settings.name).await? {
            Some(id) => {
                info!(project = %settings.name, id = %id, "reusing existing project");
                id
            }
            None => self.create_project(&settings.name).await?,
        };

        let input_ids = self.create_files(&project_id, &plan.input_files).await?;
        let output_ids = if plan.output_files.is_empty() {
            Vec::new()
        } else {
            self.create_files(&project_id, &plan.output_files).await?
        };

        let task_definition_id = self
            .create_task_definition(
                &project_id,
                plan.task_definition(settings, &input_ids, &output_ids),
            )
            .await?;
        let job_definition_id = self
            .create_job_definition(&project_id, &task_definition_id)
            .await?;
        let job_id = self
            .create_job(&project_id, plan.job_name(), &job_definition_id)
            .await?;

        info!(project_id = %project_id, job_id = %job_id, "job submitted");
        Ok(SubmittedJob {
            project_url: format!("{}/projects#/projects/{}/jobs", self.url, project_id),
            project_id,
            job_id,
        })
    }

    async fn post_objects(&self, path: &str, key: &str, objects: Value) -> WardenResult<Vec<Value>> {
        let mut body = serde_json::Map::new();
        body.insert(key.to_string(), objects);

        let response = self
            .http
            .post(self.jms(path))
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await?;
        let response = check(response, &format!("create {key}")).await?;
        Ok(take_objects(response.json().await?, key))
    }

    async fn get_objects(
        &self,
        path: &str,
        key: &str,
        query: &[(&str, &str)],
    ) -> WardenResult<Vec<Value>> {
        let response = self
            .http
            .get(self.jms(path))
            .header("Authorization", format!("Bearer {}", self.token))
            .query(query)
            .send()
            .await?;
        let response = check(response, &format!("query {key}")).await?;
        Ok(take_objects(response.json().await?, key))
    }
}

async fn check(response: reqwest::Response, action: &str) -> WardenResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(WardenError::Network {
        message: format!("failed to {action}: {status} {body}"),
        url: Some(url),
        source: None,
    })
}

fn take_objects(mut body: Value, key: &str) -> Vec<Value> {
    match body.get_mut(key).map(Value::take) {
        Some(Value::Array(objects)) => objects,
        _ => Vec::new(),
    }
}

fn object_id(object: &Value) -> Option<String> {
    object.get("id").and_then(Value::as_str).map(str::to_string)
}

fn first_id(objects: &[Value], what: &str) -> WardenResult<String> {
    objects.iter().find_map(object_id).ok_or_else(|| missing_id(what))
}

fn missing_id(what: &str) -> WardenError {
    WardenError::Unknown {
        message: format!("the cluster returned no {what} id"),
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::hpc::jobs::{HpsConfig, JobSources};
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JMS: &str = "/hps/jms/api/v1";

    fn client(server: &MockServer) -> HpsClient {
        HpsClient::new(&format!("{}/hps/", server.uri()), "token-1").unwrap()
    }

    async fn mount_created(server: &MockServer, route: &str, key: &str, id: &str) {
        Mock::given(method("POST"))
            .and(path(format!("{JMS}/{route}")))
            .and(header("Authorization", "Bearer token-1"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ key: [{ "id": id }] })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn submit_creates_project_files_and_job() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{JMS}/projects")))
            .and(query_param("name", "Beam study"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "projects": [] })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{JMS}/projects")))
            .and(body_partial_json(json!({ "projects": [{ "name": "Beam study" }] })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "projects": [{ "id": "proj-1" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/hps/fs/api/v1/proj-1/[0-9a-f-]{36}$"))
            .and(header("Authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        mount_created(&server, "projects/proj-1/files", "files", "file-1").await;
        Mock::given(method("POST"))
            .and(path(format!("{JMS}/projects/proj-1/task_definitions")))
            .and(body_partial_json(json!({
                "task_definitions": [{
                    "execution_command": "%executable% -b -i beam.inp -o apdl_output.out"
                }]
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({ "task_definitions": [{ "id": "task-1" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_created(&server, "projects/proj-1/job_definitions", "job_definitions", "jd-1").await;
        Mock::given(method("POST"))
            .and(path(format!("{JMS}/projects/proj-1/jobs")))
            .and(body_partial_json(json!({
                "jobs": [{ "name": "My APDL job", "job_definition_id": "jd-1" }]
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "jobs": [{ "id": "job-1" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let main_file = dir.path().join("beam.inp");
        fs::write(&main_file, "/PREP7\n").unwrap();
        let plan = JobPlan::prepare(
            &JobSources {
                main_file,
                ..JobSources::default()
            },
            3.0,
        )
        .unwrap();
        let settings = JobSettings::from(&HpsConfig {
            name: Some("Beam study".to_string()),
            ..HpsConfig::default()
        });

        let submitted = client(&server).submit(&plan, &settings).await.unwrap();

        assert_eq!(submitted.project_id, "proj-1");
        assert_eq!(submitted.job_id, "job-1");
        assert_eq!(
            submitted.project_url,
            format!("{}/hps/projects#/projects/proj-1/jobs", server.uri())
        );
    }

    #[tokio::test]
    async fn existing_project_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{JMS}/projects")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "projects": [{ "id": "proj-7", "name": "Old" }] })),
            )
            .mount(&server)
            .await;

        let found = client(&server).find_project("Old").await.unwrap();

        assert_eq!(found.as_deref(), Some("proj-7"));
    }

    #[tokio::test]
    async fn wait_polls_until_the_job_finishes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{JMS}/projects/proj-1/jobs")))
            .and(query_param("id", "job-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "jobs": [{ "id": "job-1", "eval_status": "running" }] })),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{JMS}/projects/proj-1/jobs")))
            .and(query_param("id", "job-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "jobs": [{ "id": "job-1", "eval_status": "evaluated" }] })),
            )
            .mount(&server)
            .await;

        let status = client(&server)
            .wait_for_completion("proj-1", "job-1", Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(status, "evaluated");
    }

    #[tokio::test]
    async fn rejected_requests_are_network_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{JMS}/projects")))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = client(&server).create_project("Denied").await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.user_message().contains("403"));
    }

    #[tokio::test]
    async fn response_without_id_is_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{JMS}/projects")))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "projects": [{}] })))
            .mount(&server)
            .await;

        let err = client(&server).create_project("Empty").await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Unknown);
        assert!(err.user_message().contains("project id"));
    }
}
