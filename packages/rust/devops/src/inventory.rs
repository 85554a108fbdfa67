//! Inventory calls: projects, repositories, and build pipeline definitions.

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};

use projectmap_shared::{
    PipelineDefinition, ProjectInventory, ProjectMapError, ProjectRef, QueueStatus, Repository,
    Result,
};

use crate::client::{API_VERSION, DevOpsClient, decode_json};

/// Response header carrying the next-page cursor of the project listing.
const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Standard list envelope. A page without `value` is rejected.
#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionDto {
    id: u64,
    name: String,
    queue_status: QueueStatus,
    #[serde(default)]
    repository: Option<RepositoryRefDto>,
}

#[derive(Debug, Deserialize)]
struct RepositoryRefDto {
    #[serde(default)]
    name: Option<String>,
}

impl From<DefinitionDto> for PipelineDefinition {
    fn from(dto: DefinitionDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            queue_status: dto.queue_status,
            repository_name: dto
                .repository
                .and_then(|r| r.name)
                .filter(|n| !n.is_empty()),
        }
    }
}

// ---------------------------------------------------------------------------
// FetchOptions
// ---------------------------------------------------------------------------

/// Knobs for [`DevOpsClient::fetch_project_inventory`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Request repository info inline with the definition listing.
    pub expand_repository: bool,
    /// Maximum concurrent definition-detail requests.
    pub detail_concurrency: usize,
    /// Overall run deadline; outstanding detail requests are abandoned past it.
    pub deadline: Option<Instant>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            expand_repository: true,
            detail_concurrency: 4,
            deadline: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Inventory calls
// ---------------------------------------------------------------------------

impl DevOpsClient {
    /// List every project in the organization, following continuation tokens.
    #[instrument(skip_all, fields(organization = %self.organization()))]
    pub async fn list_projects(&self) -> Result<Vec<ProjectRef>> {
        let mut projects = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut token: Option<String> = None;

        loop {
            let mut query = vec![("api-version", API_VERSION)];
            if let Some(t) = token.as_deref() {
                query.push(("continuationToken", t));
            }
            let url = self.endpoint(None, &["_apis", "projects"], &query)?;
            let request = self.request(Method::GET, &url);
            let response = self.send_ok(Method::GET, &url, request).await?;

            let next = response
                .headers()
                .get(CONTINUATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);

            let page: ListResponse<ProjectRef> = decode_json(&url, response).await?;
            for project in page.value {
                info!(project = %project.name, "found project");
                projects.push(project);
            }

            match next {
                Some(t) => {
                    if !seen_tokens.insert(t.clone()) {
                        return Err(ProjectMapError::parse(format!(
                            "project listing repeated continuation token '{t}'"
                        )));
                    }
                    debug!(token = %t, "fetching next project page");
                    token = Some(t);
                }
                None => break,
            }
        }

        info!(count = projects.len(), "project listing complete");
        Ok(projects)
    }

    /// List a project's repositories in platform order.
    pub async fn list_repositories(&self, project: &str) -> Result<Vec<Repository>> {
        let url = self.endpoint(
            Some(project),
            &["_apis", "git", "repositories"],
            &[("api-version", API_VERSION)],
        )?;
        let page: ListResponse<Repository> = self.get_json(&url).await?;
        Ok(page.value)
    }

    /// List a project's build definitions (enabled or not).
    ///
    /// With `expand` set, the listing includes each definition's repository
    /// block so no per-definition lookup is needed.
    pub async fn list_build_definitions(
        &self,
        project: &str,
        expand: bool,
    ) -> Result<Vec<PipelineDefinition>> {
        let mut query = vec![("api-version", API_VERSION)];
        if expand {
            query.push(("includeAllProperties", "true"));
        }
        let url = self.endpoint(Some(project), &["_apis", "build", "definitions"], &query)?;
        let page: ListResponse<DefinitionDto> = self.get_json(&url).await?;
        Ok(page.value.into_iter().map(PipelineDefinition::from).collect())
    }

    /// Fetch a single build definition, including its repository.
    pub async fn get_build_definition(&self, project: &str, id: u64) -> Result<PipelineDefinition> {
        let id = id.to_string();
        let url = self.endpoint(
            Some(project),
            &["_apis", "build", "definitions", &id],
            &[("api-version", API_VERSION)],
        )?;
        let dto: DefinitionDto = self.get_json(&url).await?;
        Ok(dto.into())
    }

    /// Repositories plus enabled pipeline definitions for one project.
    ///
    /// Disabled definitions are dropped before anything else. Definitions
    /// whose repository is still unknown after the listing are looked up
    /// concurrently, at most `detail_concurrency` at a time.
    #[instrument(skip_all, fields(project = %project.name))]
    pub async fn fetch_project_inventory(
        &self,
        project: &ProjectRef,
        opts: &FetchOptions,
    ) -> Result<ProjectInventory> {
        let repositories = self.list_repositories(&project.name).await?;
        let definitions = self
            .list_build_definitions(&project.name, opts.expand_repository)
            .await?;

        let total = definitions.len();
        let mut pipelines: Vec<PipelineDefinition> = definitions
            .into_iter()
            .filter(|d| d.queue_status.is_enabled())
            .collect();

        debug!(
            repositories = repositories.len(),
            definitions = total,
            enabled = pipelines.len(),
            "listed project inventory"
        );

        let missing: Vec<(usize, u64)> = pipelines
            .iter()
            .enumerate()
            .filter(|(_, d)| d.repository_name.is_none())
            .map(|(i, d)| (i, d.id))
            .collect();

        if !missing.is_empty() {
            debug!(count = missing.len(), "looking up definition repositories");
            for (index, repository) in self.resolve_repositories(&project.name, &missing, opts).await? {
                pipelines[index].repository_name = Some(repository);
            }
        }

        Ok(ProjectInventory {
            project: project.clone(),
            repositories,
            pipelines,
        })
    }

    /// Look up the repository of each `(index, definition id)` pair.
    ///
    /// Results come back sorted by index. Dropping the join set on error or
    /// deadline aborts the remaining requests.
    async fn resolve_repositories(
        &self,
        project: &str,
        missing: &[(usize, u64)],
        opts: &FetchOptions,
    ) -> Result<Vec<(usize, String)>> {
        let semaphore = Arc::new(Semaphore::new(opts.detail_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for &(index, id) in missing {
            let client = self.clone();
            let project = project.to_string();
            let sem = semaphore.clone();

            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await.map_err(|e| {
                    ProjectMapError::Network(format!("detail fan-out closed: {e}"))
                })?;

                let detail = client.get_build_definition(&project, id).await?;
                match detail.repository_name {
                    Some(name) => Ok((index, name)),
                    None => {
                        error!(definition = id, %project, "pipeline definition has no repository name");
                        Err(ProjectMapError::validation(format!(
                            "pipeline definition {id} ('{}') in project '{project}' has no repository name",
                            detail.name
                        )))
                    }
                }
            });
        }

        let collect = async {
            let mut resolved = Vec::with_capacity(missing.len());
            while let Some(joined) = tasks.join_next().await {
                let pair = joined
                    .map_err(|e| ProjectMapError::Network(format!("detail task failed: {e}")))??;
                resolved.push(pair);
            }
            Ok::<_, ProjectMapError>(resolved)
        };

        let mut resolved = match opts.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, collect)
                .await
                .map_err(|_| {
                    ProjectMapError::Network(format!(
                        "run deadline expired while fetching pipeline details for '{project}'"
                    ))
                })??,
            None => collect.await?,
        };

        resolved.sort_by_key(|(index, _)| *index);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{client_for, fixture};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn list_projects_follows_continuation_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/Contoso/_apis/projects"))
            .and(query_param("continuationToken", "page-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"count":1,"value":[{"id":"c3","name":"Payroll"}]}"#),
            )
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/Contoso/_apis/projects"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(CONTINUATION_HEADER, "page-2")
                    .set_body_string(fixture("projects.json")),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let projects = client.list_projects().await.unwrap();

        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Billing", "Data Platform", "Payroll"]);
    }

    #[tokio::test]
    async fn list_projects_rejects_repeated_token() {
        let server = MockServer::start().await;

        Mock::given(path("/Contoso/_apis/projects"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(CONTINUATION_HEADER, "stuck")
                    .set_body_string(fixture("projects.json")),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).list_projects().await.unwrap_err();
        assert!(matches!(err, ProjectMapError::Parse { .. }));
        assert!(err.to_string().contains("stuck"));
    }

    #[tokio::test]
    async fn list_projects_rejects_malformed_page() {
        let server = MockServer::start().await;

        Mock::given(path("/Contoso/_apis/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"count":0}"#))
            .mount(&server)
            .await;

        let err = client_for(&server).list_projects().await.unwrap_err();
        assert!(matches!(err, ProjectMapError::Parse { .. }));
    }

    #[tokio::test]
    async fn inventory_filters_disabled_and_uses_inline_repositories() {
        let server = MockServer::start().await;

        Mock::given(path("/Contoso/Billing/_apis/git/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("repositories.json")))
            .mount(&server)
            .await;

        Mock::given(path("/Contoso/Billing/_apis/build/definitions"))
            .and(query_param("includeAllProperties", "true"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(fixture("definitions_expanded.json")),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let project = ProjectRef::new("b1", "Billing");
        let inventory = client
            .fetch_project_inventory(&project, &FetchOptions::default())
            .await
            .unwrap();

        let repos: Vec<&str> = inventory.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(repos, vec!["Billing.Api", "Billing.Web"]);

        assert_eq!(inventory.pipelines.len(), 2);
        assert!(inventory.pipelines.iter().all(|p| p.queue_status.is_enabled()));
        assert_eq!(inventory.pipelines[0].name, "Build-Api");
        assert_eq!(inventory.pipelines[0].repository_name.as_deref(), Some("Billing.Api"));
        assert_eq!(inventory.pipelines[1].name, "Release-Api");
    }

    #[tokio::test]
    async fn inventory_looks_up_details_when_listing_has_no_repository() {
        let server = MockServer::start().await;

        Mock::given(path("/Contoso/Billing/_apis/git/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("repositories.json")))
            .mount(&server)
            .await;

        Mock::given(path("/Contoso/Billing/_apis/build/definitions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("definitions.json")))
            .mount(&server)
            .await;

        Mock::given(path("/Contoso/Billing/_apis/build/definitions/1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(50))
                    .set_body_string(
                        r#"{"id":1,"name":"Build-Api","queueStatus":"enabled","repository":{"name":"Billing.Api"}}"#,
                    ),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(path("/Contoso/Billing/_apis/build/definitions/3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id":3,"name":"Build-Web","queueStatus":"enabled","repository":{"name":"Billing.Web"}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        // Disabled definition 2 must never be looked up.
        Mock::given(path("/Contoso/Billing/_apis/build/definitions/2"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let opts = FetchOptions {
            expand_repository: false,
            detail_concurrency: 2,
            deadline: None,
        };
        let inventory = client
            .fetch_project_inventory(&ProjectRef::new("b1", "Billing"), &opts)
            .await
            .unwrap();

        let pairs: Vec<(&str, Option<&str>)> = inventory
            .pipelines
            .iter()
            .map(|p| (p.name.as_str(), p.repository_name.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            vec![("Build-Api", Some("Billing.Api")), ("Build-Web", Some("Billing.Web"))]
        );
    }

    #[tokio::test]
    async fn detail_without_repository_is_a_validation_error() {
        let server = MockServer::start().await;

        Mock::given(path("/Contoso/Billing/_apis/git/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("repositories.json")))
            .mount(&server)
            .await;

        Mock::given(path("/Contoso/Billing/_apis/build/definitions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"value":[{"id":9,"name":"Orphan","queueStatus":"enabled"}]}"#,
            ))
            .mount(&server)
            .await;

        Mock::given(path("/Contoso/Billing/_apis/build/definitions/9"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id":9,"name":"Orphan","queueStatus":"enabled","repository":{}}"#,
            ))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_project_inventory(&ProjectRef::new("b1", "Billing"), &FetchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProjectMapError::Validation { .. }));
        assert!(err.to_string().contains("Orphan"));
    }

    #[tokio::test]
    async fn detail_lookups_stop_at_the_deadline() {
        let server = MockServer::start().await;

        Mock::given(path("/Contoso/Billing/_apis/git/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"value":[]}"#))
            .mount(&server)
            .await;

        Mock::given(path("/Contoso/Billing/_apis/build/definitions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"value":[{"id":5,"name":"Slow","queueStatus":"enabled"}]}"#,
            ))
            .mount(&server)
            .await;

        Mock::given(path("/Contoso/Billing/_apis/build/definitions/5"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_string(
                        r#"{"id":5,"name":"Slow","queueStatus":"enabled","repository":{"name":"x"}}"#,
                    ),
            )
            .mount(&server)
            .await;

        let opts = FetchOptions {
            expand_repository: false,
            detail_concurrency: 1,
            deadline: Some(Instant::now() + Duration::from_millis(100)),
        };
        let err = client_for(&server)
            .fetch_project_inventory(&ProjectRef::new("b1", "Billing"), &opts)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("deadline expired"));
    }
}
